//! Error types for feed assembly

use http::StatusCode;
use smol_str::SmolStr;
use weft_common::{AtUri, Did, TransportError};

/// Boxed error type for error sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Request-level failure of the feed pipeline.
///
/// Per-item problems (a deleted post, a blocked author) never surface here;
/// they drop the item instead. These variants abort the whole request.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FeedError {
    /// The feed generator reported that it does not know the requested feed
    #[error("unknown feed{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    #[diagnostic(
        code(weft::feed::unknown_feed),
        help("the generator service answered UnknownFeed for this uri")
    )]
    UnknownFeed {
        /// Message forwarded from the generator, if any
        message: Option<SmolStr>,
    },

    /// No generator record is indexed for the feed uri
    #[error("could not find feed {feed}")]
    #[diagnostic(code(weft::feed::not_found))]
    FeedNotFound {
        /// The requested feed uri
        feed: AtUri,
    },

    /// The feed uri does not name a feed generator record
    #[error("invalid feed reference {feed}: {reason}")]
    #[diagnostic(
        code(weft::feed::invalid_reference),
        help("feed uris must point at an app.bsky.feed.generator record")
    )]
    InvalidFeedReference {
        /// The requested feed uri
        feed: AtUri,
        /// What is wrong with it
        reason: SmolStr,
    },

    /// The generator's service DID did not lead to a usable endpoint
    #[error("invalid feed generator service details for {did}: {reason}")]
    #[diagnostic(
        code(weft::feed::invalid_generator_config),
        help("the service DID document needs a #bsky_fg BskyFeedGenerator service entry")
    )]
    InvalidGeneratorConfig {
        /// Service DID from the generator record
        did: Did,
        /// What went wrong while resolving it
        reason: SmolStr,
    },

    /// The generator could not be reached or answered outside the XRPC
    /// contract. Safe to retry.
    #[error("feed unavailable")]
    #[diagnostic(code(weft::feed::unavailable))]
    FeedUnavailable {
        /// Underlying transport or HTTP failure
        #[source]
        source: TransportError,
    },

    /// The generator answered 2xx with a body that is not a feed skeleton
    #[error("invalid response from feed generator: {reason}")]
    #[diagnostic(code(weft::feed::invalid_response))]
    InvalidFeedResponse {
        /// What failed to validate
        reason: SmolStr,
    },

    /// The generator answered with a well-formed XRPC error other than
    /// UnknownFeed. Propagated unchanged.
    #[error("feed generator error {status}: {error}")]
    #[diagnostic(code(weft::feed::upstream))]
    Upstream {
        /// Status the generator answered with
        status: StatusCode,
        /// XRPC error name
        error: SmolStr,
        /// XRPC error message
        message: Option<SmolStr>,
    },

    /// A batched read against the data plane failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    DataPlane(#[from] DataError),

    /// The caller cancelled the request before it completed
    #[error("request cancelled")]
    #[diagnostic(code(weft::feed::cancelled))]
    Cancelled,
}

/// Coarse classification of a [`FeedError`], for mapping onto a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request named something that cannot be served
    ClientInput,
    /// Upstream could not be reached; retrying may help
    UpstreamUnavailable,
    /// Upstream answered, but not with a feed skeleton
    UpstreamProtocolViolation,
    /// Upstream answered with its own XRPC error
    Upstream,
    /// Failure inside the app view itself
    Internal,
    /// Request was cancelled
    Cancelled,
}

impl FeedError {
    /// Wrap a transport failure as an unavailable feed
    pub fn unavailable(source: impl Into<TransportError>) -> Self {
        Self::FeedUnavailable {
            source: source.into(),
        }
    }

    /// Bad 2xx body
    pub fn invalid_response(reason: impl Into<SmolStr>) -> Self {
        Self::InvalidFeedResponse {
            reason: reason.into(),
        }
    }

    pub(crate) fn generator_config(did: &Did, reason: impl Into<SmolStr>) -> Self {
        Self::InvalidGeneratorConfig {
            did: did.clone(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::UnknownFeed { .. }
            | FeedError::FeedNotFound { .. }
            | FeedError::InvalidFeedReference { .. }
            | FeedError::InvalidGeneratorConfig { .. } => ErrorKind::ClientInput,
            FeedError::FeedUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            FeedError::InvalidFeedResponse { .. } => ErrorKind::UpstreamProtocolViolation,
            FeedError::Upstream { .. } => ErrorKind::Upstream,
            FeedError::DataPlane(_) => ErrorKind::Internal,
            FeedError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the same request might succeed if repeated unchanged.
    ///
    /// A malformed generator response is deterministic, so it is not
    /// retryable even though it is an upstream failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::FeedUnavailable { .. } => true,
            FeedError::DataPlane(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// XRPC error name to answer the client with
    pub fn xrpc_error_name(&self) -> &str {
        match self {
            FeedError::UnknownFeed { .. } => "UnknownFeed",
            FeedError::FeedNotFound { .. }
            | FeedError::InvalidFeedReference { .. }
            | FeedError::InvalidGeneratorConfig { .. } => "InvalidRequest",
            FeedError::FeedUnavailable { .. } => "UpstreamFailure",
            FeedError::InvalidFeedResponse { .. } => "InvalidFeedResponse",
            FeedError::Upstream { error, .. } => error.as_str(),
            FeedError::DataPlane(_) => "InternalServerError",
            FeedError::Cancelled => "RequestCancelled",
        }
    }

    /// HTTP status to answer the client with
    pub fn http_status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::ClientInput => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamUnavailable | ErrorKind::UpstreamProtocolViolation => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Upstream => match self {
                FeedError::Upstream { status, .. } => *status,
                _ => StatusCode::BAD_GATEWAY,
            },
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

/// Failure of a data plane read
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DataError {
    /// Backend temporarily unreachable
    #[error("data plane unavailable: {0}")]
    #[diagnostic(code(weft::data::unavailable))]
    Unavailable(SmolStr),

    /// Backend answered with an error
    #[error("data plane error: {message}")]
    #[diagnostic(code(weft::data::backend))]
    Backend {
        /// Backend-provided detail
        message: SmolStr,
        /// Underlying cause, if the backend exposes one
        #[source]
        source: Option<BoxError>,
    },
}

impl DataError {
    /// Backend error without an underlying cause
    pub fn backend(message: impl Into<SmolStr>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a repeat of the read might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_common::HttpError;

    #[test]
    fn malformed_response_is_not_retryable() {
        let unavailable = FeedError::unavailable(TransportError::Timeout);
        let malformed = FeedError::invalid_response("missing field `feed`");
        assert!(unavailable.is_retryable());
        assert!(!malformed.is_retryable());
        assert_ne!(unavailable.kind(), malformed.kind());
        assert_eq!(malformed.kind(), ErrorKind::UpstreamProtocolViolation);
    }

    #[test]
    fn unknown_status_maps_to_unavailable() {
        let err = FeedError::unavailable(TransportError::other(HttpError {
            status: StatusCode::IM_A_TEAPOT,
            body: None,
        }));
        assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.xrpc_error_name(), "UpstreamFailure");
    }

    #[test]
    fn upstream_errors_keep_their_status() {
        let err = FeedError::Upstream {
            status: StatusCode::UNAUTHORIZED,
            error: SmolStr::new_static("AuthMissing"),
            message: None,
        };
        assert_eq!(err.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.xrpc_error_name(), "AuthMissing");
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_feed_display() {
        let err = FeedError::UnknownFeed {
            message: Some(SmolStr::new_static("no such feed")),
        };
        assert_eq!(err.to_string(), "unknown feed: no such feed");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        let bare = FeedError::UnknownFeed { message: None };
        assert_eq!(bare.to_string(), "unknown feed");
    }

    #[test]
    fn data_plane_retryability() {
        let err: FeedError = DataError::Unavailable("pool exhausted".into()).into();
        assert!(err.is_retryable());
        let err: FeedError = DataError::backend("bad query").into();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
