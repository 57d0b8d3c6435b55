//! Fetching feed skeletons from feed generator services

use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use std::sync::Arc;
use url::Url;
use weft_common::xrpc::{GenericXrpcError, endpoint_url, is_known_status};
use weft_common::{AtUri, Did, HttpClient, HttpError, TransportError};

use crate::config::{FeedRequest, PipelineOptions};
use crate::dataplane::DataPlane;
use crate::error::{FeedError, Result};
use crate::hydrate::EntityBatchLoader;
use crate::identity::IdentityResolver;

/// NSID of the generator endpoint
pub const GET_FEED_SKELETON: &str = "app.bsky.feed.getFeedSkeleton";
/// Collection feed uris must point into
pub const GENERATOR_COLLECTION: &str = "app.bsky.feed.generator";

/// One entry of a skeleton, in generator order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonItem {
    /// The post to show
    pub post: AtUri,
    /// Repost record, when the post appears because someone reposted it
    pub repost: Option<AtUri>,
    /// Opaque context the generator wants echoed back
    pub feed_context: Option<SmolStr>,
}

impl SkeletonItem {
    pub fn author(&self) -> &Did {
        self.post.authority()
    }

    /// Account that reposted, if this is a repost
    pub fn originator(&self) -> Option<&Did> {
        self.repost.as_ref().map(|r| r.authority())
    }
}

/// A validated skeleton response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub items: Vec<SkeletonItem>,
    /// Returned to the client unchanged
    pub cursor: Option<SmolStr>,
    /// Top-level response fields the pipeline does not interpret
    pub passthrough: Map<String, Value>,
    /// `content-language` from the generator response
    pub content_language: Option<HeaderValue>,
}

#[derive(Serialize)]
struct SkeletonQuery<'a> {
    feed: &'a str,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct SkeletonOutput {
    feed: Vec<SkeletonFeedPost>,
    #[serde(default)]
    cursor: Option<SmolStr>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkeletonFeedPost {
    post: AtUri,
    #[serde(default)]
    reason: Option<SkeletonReason>,
    #[serde(default)]
    feed_context: Option<SmolStr>,
}

#[derive(Deserialize)]
#[serde(tag = "$type")]
enum SkeletonReason {
    #[serde(rename = "app.bsky.feed.defs#skeletonReasonRepost")]
    Repost { repost: AtUri },
    #[serde(other)]
    Other,
}

/// Turn a generator response into a [`Skeleton`] or the matching error.
///
/// - unknown status codes are treated as the generator being unavailable
/// - `400 UnknownFeed` becomes [`FeedError::UnknownFeed`]
/// - other XRPC errors are passed through as [`FeedError::Upstream`]
/// - a 200 whose body is not a skeleton is [`FeedError::InvalidFeedResponse`]
pub fn parse_skeleton_response(response: Response<Vec<u8>>) -> Result<Skeleton> {
    let status = response.status();
    let content_language = response.headers().get(header::CONTENT_LANGUAGE).cloned();
    let body = response.into_body();

    if !is_known_status(status) {
        return Err(FeedError::unavailable(TransportError::other(HttpError {
            status,
            body: Some(body.into()),
        })));
    }
    if status != StatusCode::OK {
        return Err(match GenericXrpcError::from_body(&body) {
            Some(err) if status == StatusCode::BAD_REQUEST && err.error == "UnknownFeed" => {
                FeedError::UnknownFeed {
                    message: err.message,
                }
            }
            Some(err) => FeedError::Upstream {
                status,
                error: err.error,
                message: err.message,
            },
            None => FeedError::Upstream {
                status,
                error: SmolStr::new(status.canonical_reason().unwrap_or("Unknown")),
                message: None,
            },
        });
    }

    let output: SkeletonOutput = serde_json::from_slice(&body)
        .map_err(|e| FeedError::invalid_response(e.to_string()))?;
    let items = output
        .feed
        .into_iter()
        .map(|entry| SkeletonItem {
            post: entry.post,
            repost: match entry.reason {
                Some(SkeletonReason::Repost { repost }) => Some(repost),
                _ => None,
            },
            feed_context: entry.feed_context,
        })
        .collect();
    Ok(Skeleton {
        items,
        cursor: output.cursor,
        passthrough: output.extra,
        content_language,
    })
}

/// Fetches skeletons for `app.bsky.feed.generator` feeds.
///
/// The generator record gives the service DID, the DID document gives the
/// endpoint, and one `getFeedSkeleton` call gives the skeleton.
#[derive(Debug, Clone)]
pub struct SkeletonProvider<D, I, H> {
    loader: EntityBatchLoader<D>,
    identity: I,
    http: H,
    options: Arc<PipelineOptions>,
}

impl<D, I, H> SkeletonProvider<D, I, H>
where
    D: DataPlane,
    I: IdentityResolver + Sync,
    H: HttpClient + Sync,
{
    pub fn new(
        loader: EntityBatchLoader<D>,
        identity: I,
        http: H,
        options: Arc<PipelineOptions>,
    ) -> Self {
        Self {
            loader,
            identity,
            http,
            options,
        }
    }

    /// Resolve the generator endpoint for `feed`
    pub async fn resolve_endpoint(&self, feed: &AtUri, viewer: Option<&Did>) -> Result<Url> {
        if feed.collection() != GENERATOR_COLLECTION {
            return Err(FeedError::InvalidFeedReference {
                feed: feed.clone(),
                reason: SmolStr::new_static("not an app.bsky.feed.generator record"),
            });
        }
        let generators = self
            .loader
            .load_feed_generators(std::slice::from_ref(feed), viewer)
            .await?;
        let generator = generators
            .get(feed)
            .ok_or_else(|| FeedError::FeedNotFound { feed: feed.clone() })?;

        let did = &generator.service_did;
        self.identity
            .resolve_service_endpoint(
                did,
                &self.options.feed_generator_service_id,
                &self.options.feed_generator_service_type,
            )
            .await
            .map_err(|e| FeedError::generator_config(did, e.to_string()))
    }

    /// Fetch up to `limit` skeleton items for `request`.
    ///
    /// Only allow-listed client headers reach the generator. The cursor is
    /// sent as given.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(feed = %request.feed, limit = limit))
    )]
    pub async fn get_skeleton(&self, request: &FeedRequest, limit: u32) -> Result<Skeleton> {
        let endpoint = self
            .resolve_endpoint(&request.feed, request.viewer.as_ref())
            .await?;

        let query = serde_html_form::to_string(SkeletonQuery {
            feed: request.feed.as_str(),
            limit,
            cursor: request.cursor.as_deref(),
        })
        .map_err(|e| FeedError::unavailable(TransportError::InvalidRequest(e.to_string())))?;
        let url = endpoint_url(&endpoint, GET_FEED_SKELETON, Some(&query));

        let mut http_request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::ACCEPT, "application/json")
            .body(Vec::new())
            .map_err(|e| FeedError::unavailable(TransportError::from(e)))?;
        http_request
            .headers_mut()
            .extend(self.forwarded(&request.headers));

        let send = self.http.send_http(http_request);
        let response = match self.options.upstream_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send)
                .await
                .map_err(|_| FeedError::unavailable(TransportError::Timeout))?,
            None => send.await,
        }
        .map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "feed generator unreachable");
            FeedError::unavailable(TransportError::other(e))
        })?;

        let skeleton = parse_skeleton_response(response)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(items = skeleton.items.len(), "skeleton fetched");
        Ok(skeleton)
    }

    fn forwarded(&self, headers: &HeaderMap) -> HeaderMap {
        self.options.forwardable(headers)
    }
}
