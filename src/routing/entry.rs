//! Route entries and their serializable projection.
//!
//! # Design Decisions
//! - The method set is a closed enum; anything outside it is a parse error
//! - `RouteEntry` carries the handler, `RouteView` never does
//! - Entries are immutable once built

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::routing::MethodFilter;
use serde::{Deserialize, Serialize};

use crate::routing::handler::RouteHandler;
use crate::routing::registry::RegistryError;

/// HTTP methods a route can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
}

impl Method {
    /// All supported methods, in declaration order.
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Put,
        Method::Post,
        Method::Patch,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
        }
    }

    /// The engine filter this method binds under.
    pub fn filter(&self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Head => MethodFilter::HEAD,
            Method::Put => MethodFilter::PUT,
            Method::Post => MethodFilter::POST,
            Method::Patch => MethodFilter::PATCH,
            Method::Delete => MethodFilter::DELETE,
            Method::Connect => MethodFilter::CONNECT,
            Method::Options => MethodFilter::OPTIONS,
            Method::Trace => MethodFilter::TRACE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RegistryError;

    /// Method names are matched exactly (upper case), as they appear on the wire.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RegistryError::UnsupportedMethod(s.to_string()))
    }
}

/// One registered route: path pattern, method and the handler serving it.
#[derive(Clone)]
pub struct RouteEntry {
    path: String,
    method: Method,
    handler: Arc<dyn RouteHandler>,
}

impl RouteEntry {
    pub fn new(path: impl Into<String>, method: Method, handler: impl RouteHandler) -> Self {
        Self {
            path: path.into(),
            method,
            handler: Arc::new(handler),
        }
    }

    /// Build an entry from a textual method name.
    ///
    /// Fails with [`RegistryError::UnsupportedMethod`] when the method is not
    /// one of [`Method::ALL`].
    pub fn parse(
        path: impl Into<String>,
        method: &str,
        handler: impl RouteHandler,
    ) -> Result<Self, RegistryError> {
        Ok(Self::new(path, method.parse()?, handler))
    }

    pub fn get(path: impl Into<String>, handler: impl RouteHandler) -> Self {
        Self::new(path, Method::Get, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl RouteHandler) -> Self {
        Self::new(path, Method::Post, handler)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }

    /// The serializable view of this entry.
    pub fn view(&self) -> RouteView {
        RouteView {
            path: self.path.clone(),
            method: self.method,
        }
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// What the outside world gets to see of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteView {
    pub path: String,
    pub method: Method,
}
