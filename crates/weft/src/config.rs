//! Pipeline configuration and the per-request parameter set

use bon::Builder;
use http::{HeaderMap, HeaderName, header};
use smol_str::SmolStr;
use std::time::Duration;
use weft_common::{AtUri, Did};

/// Topic hints a client may pass through to the feed generator
pub const X_BSKY_TOPICS: HeaderName = HeaderName::from_static("x-bsky-topics");

fn default_forwarded_headers() -> Vec<HeaderName> {
    vec![
        header::AUTHORIZATION,
        header::ACCEPT_LANGUAGE,
        X_BSKY_TOPICS,
    ]
}

/// Knobs for the feed pipeline.
///
/// ```
/// # use weft::config::PipelineOptions;
/// let opts = PipelineOptions::new().max_limit(30).build();
/// assert_eq!(opts.clamp_limit(None), 30);
/// assert_eq!(opts.clamp_limit(Some(0)), 1);
/// assert_eq!(opts.clamp_limit(Some(10)), 10);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct PipelineOptions {
    /// Page size when the request does not ask for one
    #[builder(default = 50)]
    pub default_limit: u32,
    /// Largest page a client may request
    #[builder(default = 100)]
    pub max_limit: u32,
    /// Display names longer than this many UTF-8 bytes are cut at a
    /// character boundary
    #[builder(default = 64)]
    pub display_name_max_bytes: usize,
    /// Fragment id of the generator service entry in a DID document
    #[builder(into, default = SmolStr::new_static("#bsky_fg"))]
    pub feed_generator_service_id: SmolStr,
    /// Type of the generator service entry in a DID document
    #[builder(into, default = SmolStr::new_static("BskyFeedGenerator"))]
    pub feed_generator_service_type: SmolStr,
    /// Client headers copied onto the generator call. Nothing else is
    /// forwarded.
    #[builder(default = default_forwarded_headers())]
    pub forwarded_headers: Vec<HeaderName>,
    /// Give up on the generator after this long
    pub upstream_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

impl PipelineOptions {
    /// Page size to use for a request, bounded to `1..=max_limit`
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        let max = self.max_limit.max(1);
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, max)
    }

    /// Subset of `headers` that may be sent to the generator
    pub fn forwardable(&self, headers: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        for name in &self.forwarded_headers {
            for value in headers.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }
        out
    }
}

/// A single getFeed request.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct FeedRequest {
    /// Uri of the feed generator record
    pub feed: AtUri,
    /// Requested page size
    pub limit: Option<u32>,
    /// Opaque pagination cursor from a previous page
    #[builder(into)]
    pub cursor: Option<SmolStr>,
    /// Account the feed is rendered for. `None` for logged-out requests.
    pub viewer: Option<Did>,
    /// Incoming client headers
    #[builder(default)]
    pub headers: HeaderMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn defaults() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.default_limit, 50);
        assert_eq!(opts.max_limit, 100);
        assert_eq!(opts.display_name_max_bytes, 64);
        assert_eq!(opts.feed_generator_service_id, "#bsky_fg");
        assert_eq!(opts.clamp_limit(Some(1000)), 100);
        assert!(opts.upstream_timeout.is_none());
    }

    #[test]
    fn only_allowed_headers_forwarded() {
        let opts = PipelineOptions::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en, ja"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=secret"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.insert(X_BSKY_TOPICS, HeaderValue::from_static("rust"));

        let out = opts.forwardable(&headers);
        assert_eq!(out.len(), 3);
        assert!(out.get(header::COOKIE).is_none());
        assert!(out.get("x-forwarded-for").is_none());
        assert_eq!(out.get(X_BSKY_TOPICS).unwrap(), "rust");
    }

    #[test]
    fn request_builder() {
        let req = FeedRequest::new()
            .feed(AtUri::new("at://did:plc:gen/app.bsky.feed.generator/hot").unwrap())
            .cursor("abc")
            .build();
        assert_eq!(req.cursor.as_deref(), Some("abc"));
        assert!(req.limit.is_none());
        assert!(req.viewer.is_none());
        assert!(req.headers.is_empty());
    }
}
