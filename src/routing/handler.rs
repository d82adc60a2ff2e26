//! The capability a route is served by.

use std::future::Future;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

/// Handles one request and produces one response.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = impl IntoResponse>`,
/// so plain async closures can be registered directly:
///
/// ```
/// use worker_api::routing::RouteEntry;
///
/// let entry = RouteEntry::get("/ping", |_req: axum::extract::Request| async { "pong" });
/// assert_eq!(entry.path(), "/ping");
/// ```
pub trait RouteHandler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> BoxFuture<'static, Response>;

    /// Identity used in logs. Defaults to the implementing type's name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F, Fut, R> RouteHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn handle(&self, request: Request) -> BoxFuture<'static, Response> {
        let fut = self(request);
        Box::pin(async move { fut.await.into_response() })
    }
}
