//! Thread-safe route registry.
//!
//! # Responsibilities
//! - Keep every registered entry in registration order
//! - Compile entries into the engine route table, once per batch
//! - Publish the compiled table for lock-free dispatch
//!
//! # Design Decisions
//! - One `RwLock` guards both the entry list and table publication
//! - A batch that fails to compile is discarded whole
//! - Later registrations of the same (path, method) shadow earlier ones;
//!   the listing keeps both

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use parking_lot::RwLock;
use thiserror::Error;

use crate::http::recovery::{self, RequestScope};
use crate::observability::metrics;
use crate::routing::entry::{Method, RouteEntry, RouteView};

/// Errors returned by route registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Method name outside the supported set.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Route path does not start with `/`.
    #[error("invalid route path {0:?}: must start with '/'")]
    InvalidPath(String),

    /// The engine refused to build a route table from the batch.
    #[error("route table conflict: {0}")]
    Conflict(String),
}

/// Ordered store of route entries plus the compiled table serving them.
pub struct Registry {
    entries: RwLock<Vec<RouteEntry>>,
    table: ArcSwap<Router>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            table: ArcSwap::from_pointee(Router::new()),
        }
    }

    /// Register a batch of entries.
    ///
    /// The batch becomes visible to [`Registry::list`] and to dispatch all at
    /// once, or not at all.
    pub fn register(&self, batch: Vec<RouteEntry>) -> Result<(), RegistryError> {
        if let Some(entry) = batch.iter().find(|e| !e.path().starts_with('/')) {
            return Err(RegistryError::InvalidPath(entry.path().to_string()));
        }

        let mut entries = self.entries.write();
        let router = compile(entries.iter().chain(batch.iter()))?;

        for entry in &batch {
            tracing::info!(
                method = %entry.method(),
                path = %entry.path(),
                handler = %entry.handler().name(),
                "api registered"
            );
            metrics::record_route_registered(entry.method());
        }

        entries.extend(batch);
        self.table.store(Arc::new(router));
        Ok(())
    }

    /// Snapshot of every committed entry, in registration order.
    pub fn list(&self) -> Vec<RouteView> {
        self.entries.read().iter().map(RouteEntry::view).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The currently published route table.
    pub fn router(&self) -> Arc<Router> {
        self.table.load_full()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration capability handed to subsystems outside the server.
#[derive(Clone)]
pub struct RouteRegistrar {
    registry: Arc<Registry>,
}

impl RouteRegistrar {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn register(&self, entries: Vec<RouteEntry>) -> Result<(), RegistryError> {
        self.registry.register(entries)
    }
}

/// Build a route table from `entries`.
///
/// The engine panics on patterns it cannot accept; that panic is turned into
/// [`RegistryError::Conflict`].
fn compile<'a>(entries: impl Iterator<Item = &'a RouteEntry>) -> Result<Router, RegistryError> {
    let mut by_path: BTreeMap<&str, HashMap<Method, &RouteEntry>> = BTreeMap::new();
    for entry in entries {
        by_path
            .entry(entry.path())
            .or_default()
            .insert(entry.method(), entry);
    }

    recovery::catch(|| {
        by_path.into_iter().fold(Router::new(), |router, (path, methods)| {
            // The engine answers HEAD with the GET handler unless HEAD is bound.
            let refuse_head =
                methods.contains_key(&Method::Get) && !methods.contains_key(&Method::Head);
            let mut method_router = methods
                .into_values()
                .fold(MethodRouter::new(), |mr, entry| mr.on(entry.method().filter(), bind(entry)));
            if refuse_head {
                method_router = method_router.on(MethodFilter::HEAD, method_not_allowed);
            }
            router.route(path, method_router)
        })
    })
    .map_err(|fault| RegistryError::Conflict(fault.message))
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// Adapt an entry's handler to the engine, recording its identity on the
/// request scope before it runs.
fn bind(
    entry: &RouteEntry,
) -> impl Fn(Request) -> futures_util::future::BoxFuture<'static, axum::response::Response>
       + Clone
       + Send
       + Sync
       + 'static {
    let handler = Arc::clone(entry.handler());
    move |request: Request| {
        if let Some(scope) = RequestScope::from_request(&request) {
            scope.enter(handler.name());
        }
        handler.handle(request)
    }
}
