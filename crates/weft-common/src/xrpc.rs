//! XRPC wire helpers: endpoint urls, the generic error body, and status
//! classification.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

/// Generic XRPC error format, `{"error": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenericXrpcError {
    /// Error code (e.g., "InvalidRequest")
    pub error: SmolStr,
    /// Optional error message with details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SmolStr>,
}

impl GenericXrpcError {
    /// Try to read an error body. Returns `None` if the body is not the
    /// generic error shape.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

impl std::fmt::Display for GenericXrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.error, msg),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for GenericXrpcError {}

/// Whether `status` is one of the response codes the XRPC spec assigns
/// meaning to. Anything else is an "unknown" response.
pub fn is_known_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        200 | 400 | 401 | 403 | 404 | 413 | 429 | 500 | 501 | 502 | 503 | 504
    )
}

/// Build `{base}/xrpc/{nsid}?{query}` without doubling slashes when the base
/// already carries a path.
pub fn endpoint_url(base: &Url, nsid: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let mut path = url.path().trim_end_matches('/').to_owned();
    path.push_str("/xrpc/");
    path.push_str(nsid);
    url.set_path(&path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_double_slash_in_path() {
        for base in [
            Url::parse("https://feeds").unwrap(),
            Url::parse("https://feeds/").unwrap(),
            Url::parse("https://feeds/base/").unwrap(),
        ] {
            let url = endpoint_url(&base, "app.bsky.feed.getFeedSkeleton", Some("limit=10"));
            let s = url.to_string();
            assert!(s.contains("/xrpc/app.bsky.feed.getFeedSkeleton?limit=10"));
            assert!(!s.contains("//xrpc"));
        }
    }

    #[test]
    fn empty_query_is_dropped() {
        let base = Url::parse("https://feeds").unwrap();
        let url = endpoint_url(&base, "com.example.test", Some(""));
        assert_eq!(url.as_str(), "https://feeds/xrpc/com.example.test");
    }

    #[test]
    fn parses_generic_error() {
        let err = GenericXrpcError::from_body(br#"{"error":"UnknownFeed","message":"nope"}"#)
            .unwrap();
        assert_eq!(err.error, "UnknownFeed");
        assert_eq!(err.to_string(), "UnknownFeed: nope");
        assert!(GenericXrpcError::from_body(b"<html>").is_none());
    }

    #[test]
    fn status_classification() {
        assert!(is_known_status(StatusCode::BAD_REQUEST));
        assert!(is_known_status(StatusCode::BAD_GATEWAY));
        assert!(!is_known_status(StatusCode::IM_A_TEAPOT));
        assert!(!is_known_status(StatusCode::MOVED_PERMANENTLY));
    }
}
