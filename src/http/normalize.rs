//! Trailing-slash normalization, applied before route matching.
//!
//! `/foo/` is served as `/foo`. The root path and paths ending in `//` are
//! left alone.

use axum::extract::Request;
use axum::http::uri::PathAndQuery;
use axum::http::Uri;

/// Strip one trailing slash when the path is longer than one character and
/// the slash is not preceded by another slash.
pub fn normalize_path(path: &str) -> &str {
    let bytes = path.as_bytes();
    let len = bytes.len();
    if len > 1 && bytes[len - 1] == b'/' && bytes[len - 2] != b'/' {
        &path[..len - 1]
    } else {
        path
    }
}

/// Request mapper rewriting the URI path with [`normalize_path`].
pub async fn trim_trailing_slash(mut request: Request) -> Request {
    let path = request.uri().path();
    let trimmed = normalize_path(path);
    if trimmed.len() == path.len() {
        return request;
    }

    let path_and_query = match request.uri().query() {
        Some(query) => format!("{trimmed}?{query}"),
        None => trimmed.to_string(),
    };

    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = PathAndQuery::try_from(path_and_query).ok();
    if let Ok(uri) = Uri::from_parts(parts) {
        *request.uri_mut() = uri;
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/foo/"), "/foo");
        assert_eq!(normalize_path("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize_path("/foo"), "/foo");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/foo//"), "/foo//");
        assert_eq!(normalize_path("//"), "//");
    }

    #[tokio::test]
    async fn test_trim_keeps_query() {
        let request = axum::http::Request::builder()
            .uri("/items/?limit=3")
            .body(Body::empty())
            .unwrap();
        let request = trim_trailing_slash(request).await;
        assert_eq!(request.uri().path(), "/items");
        assert_eq!(request.uri().query(), Some("limit=3"));
    }

    #[tokio::test]
    async fn test_trim_leaves_root() {
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let request = trim_trailing_slash(request).await;
        assert_eq!(request.uri().path(), "/");
    }
}
