//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (request id, tracing,
//!   trailing-slash normalization, panic recovery)
//! - Own the route registry and expose a registration handle
//! - Bind the loopback listener and serve until closed
//!
//! # States
//! ```text
//! Constructed --run()--> Running --close()--> Closed
//!      \________________close()________________/
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, OnceLock};

use axum::extract::Request;
use axum::{middleware, Router};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::introspection::ListRoutes;
use crate::http::normalize::trim_trailing_slash;
use crate::http::recovery::{self, recover};
use crate::http::request::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use crate::lifecycle::Shutdown;
use crate::routing::{Registry, RegistryError, RouteEntry, RouteRegistrar, RouteView};

/// The server only ever listens on loopback.
pub const DEFAULT_SERVER_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("serve failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server is closed")]
    Closed,
}

/// Lifecycle state of an [`ApiServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Constructed,
    Running,
    Closed,
}

/// HTTP server for dynamically registered control-plane APIs.
pub struct ApiServer {
    port: u16,
    registry: Arc<Registry>,
    router: Router,
    state: Mutex<ServerState>,
    shutdown: Shutdown,
    local_addr: OnceLock<SocketAddr>,
}

impl ApiServer {
    /// Create a server for `127.0.0.1:<port>`. Nothing is bound yet.
    pub fn new(port: u16) -> Self {
        recovery::install_panic_hook();

        let registry = Arc::new(Registry::new());
        registry
            .register(vec![ListRoutes::entry(&registry)])
            .expect("route listing must compile into an empty table");

        let router = Self::build_router(Arc::clone(&registry));
        Self {
            port,
            registry,
            router,
            state: Mutex::new(ServerState::Constructed),
            shutdown: Shutdown::new(),
            local_addr: OnceLock::new(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.port)
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The router has no routes of its own: everything falls through to the
    /// registry's published table, so the layers here run before matching.
    fn build_router(registry: Arc<Registry>) -> Router {
        let dispatch = tower::service_fn(move |request: Request| {
            let table = registry.router();
            async move { table.as_ref().clone().oneshot(request).await }
        });

        Router::new()
            .fallback_service(dispatch)
            .layer(middleware::from_fn(recover))
            .layer(middleware::map_request(trim_trailing_slash))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Register a batch of routes.
    pub fn register(&self, entries: Vec<RouteEntry>) -> Result<(), RegistryError> {
        self.registry.register(entries)
    }

    /// A handle other subsystems can register routes through.
    pub fn registrar(&self) -> RouteRegistrar {
        RouteRegistrar::new(Arc::clone(&self.registry))
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> Vec<RouteView> {
        self.registry.list()
    }

    /// The fully layered router, for in-process use.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// The bound address, once [`ApiServer::run`] has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Bind and serve until [`ApiServer::close`] is called.
    ///
    /// A close is a normal return. Bind and accept failures are returned as
    /// errors.
    pub async fn run(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Constructed => *state = ServerState::Running,
                ServerState::Running => return Err(ServerError::AlreadyStarted),
                ServerState::Closed => return Err(ServerError::Closed),
            }
        }

        let result = self.serve().await;
        *self.state.lock() = ServerState::Closed;
        result
    }

    async fn serve(&self) -> Result<(), ServerError> {
        let addr = SocketAddr::from((DEFAULT_SERVER_IP, self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::Serve)?;
        let _ = self.local_addr.set(local_addr);

        tracing::info!(address = %local_addr, "worker api server running");

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(self.shutdown.signal())
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!(address = %local_addr, "worker api server stopped");
        Ok(())
    }

    /// Run on a dedicated task. A fatal server error terminates the process.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!(error = %e, "run worker api server failed");
                std::process::exit(1);
            }
        })
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn close(&self) {
        *self.state.lock() = ServerState::Closed;
        self.shutdown.trigger();
        tracing::info!(port = self.port, "worker api server closing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorPayload;
    use crate::http::request::X_REQUEST_ID;
    use axum::body::Body;
    use crate::routing::Method;
    use axum::http::StatusCode;

    async fn send(server: &ApiServer, method: &str, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = server.app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_new_server_lists_itself() {
        let server = ApiServer::new(0);
        assert_eq!(server.state(), ServerState::Constructed);
        assert_eq!(server.local_addr(), None);

        let routes = server.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/");
    }

    #[tokio::test]
    async fn test_listing_over_router() {
        let server = ApiServer::new(0);
        server
            .registrar()
            .register(vec![
                RouteEntry::get("/ping", |_req: Request| async { "pong" }),
                RouteEntry::post("/ping", |_req: Request| async { "pong" }),
            ])
            .unwrap();

        let (status, body) = send(&server, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "- path: /\n  method: GET\n- path: /ping\n  method: GET\n- path: /ping\n  method: POST\n"
        );
    }

    #[tokio::test]
    async fn test_trailing_slash_dispatches_same_handler() {
        let server = ApiServer::new(0);
        server
            .register(vec![RouteEntry::get("/foo", |_req: Request| async { "foo" })])
            .unwrap();

        assert_eq!(send(&server, "GET", "/foo").await, (StatusCode::OK, "foo".into()));
        assert_eq!(send(&server, "GET", "/foo/").await, (StatusCode::OK, "foo".into()));
        assert_eq!(send(&server, "GET", "/foo//").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panicking_route_recovers() {
        let server = ApiServer::new(0);
        server
            .register(vec![
                RouteEntry::get("/boom", |_req: Request| async {
                    if true {
                        panic!("kaboom");
                    }
                    "unreachable"
                }),
                RouteEntry::get("/ok", |_req: Request| async { "ok" }),
            ])
            .unwrap();

        let (status, body) = send(&server, "GET", "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let payload: ErrorPayload = serde_yaml::from_str(&body).unwrap();
        assert_eq!(payload, ErrorPayload { code: 500, message: "kaboom".into() });

        assert_eq!(send(&server, "GET", "/ok").await, (StatusCode::OK, "ok".into()));
    }

    #[tokio::test]
    async fn test_get_route_does_not_answer_head() {
        let server = ApiServer::new(0);
        server
            .register(vec![
                RouteEntry::get("/only-get", |_req: Request| async { "get" }),
                RouteEntry::get("/both", |_req: Request| async { "get" }),
                RouteEntry::new("/both", Method::Head, |_req: Request| async { "" }),
            ])
            .unwrap();

        assert_eq!(send(&server, "GET", "/only-get").await.0, StatusCode::OK);
        assert_eq!(
            send(&server, "HEAD", "/only-get").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(send(&server, "HEAD", "/both").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = ApiServer::new(0);
        assert_eq!(send(&server, "GET", "/missing").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let server = ApiServer::new(0);
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = server.app().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let request = axum::http::Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = server.app().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_run_after_close_fails() {
        let server = ApiServer::new(0);
        server.close();
        assert!(matches!(server.run().await, Err(ServerError::Closed)));
        assert_eq!(server.state(), ServerState::Closed);
    }
}
