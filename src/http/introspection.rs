//! Built-in `GET /` listing every registered route.

use std::sync::{Arc, Weak};

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::http::error::{error_response, YAML_CONTENT_TYPE};
use crate::routing::{Registry, RouteEntry, RouteHandler};

/// Handler serving the route listing.
///
/// Holds the registry weakly: the registry owns this handler through its
/// entries.
pub struct ListRoutes {
    registry: Weak<Registry>,
}

impl ListRoutes {
    pub fn new(registry: &Arc<Registry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    /// The `GET /` entry for this handler.
    pub fn entry(registry: &Arc<Registry>) -> RouteEntry {
        RouteEntry::get("/", Self::new(registry))
    }

    fn render(&self) -> Response {
        let Some(registry) = self.registry.upgrade() else {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "route registry is gone");
        };

        let routes = registry.list();
        let body = serde_yaml::to_string(&routes)
            .unwrap_or_else(|e| panic!("marshal {routes:?} to yaml failed: {e}"));

        ([(header::CONTENT_TYPE, YAML_CONTENT_TYPE)], body).into_response()
    }
}

impl RouteHandler for ListRoutes {
    fn handle(&self, _request: Request) -> BoxFuture<'static, Response> {
        let response = self.render();
        Box::pin(async move { response })
    }

    fn name(&self) -> &str {
        "list_routes"
    }
}
