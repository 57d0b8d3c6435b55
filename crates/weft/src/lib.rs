//! # Weft
//!
//! Feed assembly for AT Protocol app views.
//!
//! A custom feed is produced in two halves. A third-party feed generator
//! returns a *skeleton*: an ordered list of post references. The app view
//! turns that into fully rendered posts for a particular viewer. Weft is the
//! second half.
//!
//! ## Stages
//!
//! - **skeleton**: find the generator's service endpoint and call
//!   `app.bsky.feed.getFeedSkeleton`, forwarding only allow-listed headers
//! - **hydration**: batched loads of posts, reposts, reply ancestors,
//!   authors, viewer relationships and labels, then one level of embedded
//!   records
//! - **rules**: drop items that did not hydrate, or whose author or reposter
//!   is blocked or muted
//! - **presentation**: render `app.bsky.feed.defs#feedViewPost`s in skeleton
//!   order, cut to the requested limit
//!
//! Every load takes the whole id set for the page in one call, and no call
//! is made for an empty set.
//!
//! ## Example
//!
//! ```no_run
//! use weft::config::{FeedRequest, PipelineOptions};
//! use weft::dataplane::MemoryDataPlane;
//! use weft::images::CdnUriBuilder;
//! use weft::FeedPipeline;
//! use weft_common::{AtUri, Did, DidDocument};
//! # use weft::identity::{IdentityError, IdentityResolver};
//! # struct Resolver;
//! # impl IdentityResolver for Resolver {
//! #     async fn resolve_did_doc(&self, did: &Did) -> Result<DidDocument, IdentityError> {
//! #         Err(IdentityError::NotFound(did.clone()))
//! #     }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> miette::Result<()> {
//! let pipeline = FeedPipeline::new(
//!     MemoryDataPlane::new(),
//!     Resolver,
//!     reqwest::Client::new(),
//!     CdnUriBuilder::new("https://cdn.example.com".parse().unwrap()),
//!     PipelineOptions::default(),
//! );
//!
//! let outcome = pipeline
//!     .get_feed(
//!         FeedRequest::new()
//!             .feed(AtUri::new("at://did:plc:gen/app.bsky.feed.generator/hot").unwrap())
//!             .limit(30)
//!             .viewer(Did::new("did:plc:alice").unwrap())
//!             .build(),
//!     )
//!     .await?;
//!
//! println!("{} posts, {} omitted", outcome.response.feed.len(), outcome.omitted.total());
//! # Ok(())
//! # }
//! ```

pub use weft_common;

/// Pipeline options and request parameters
pub mod config;
pub mod dataplane;
pub mod error;
pub mod hydrate;
pub mod identity;
pub mod images;
pub mod pipeline;
pub mod present;
pub mod records;
pub mod skeleton;
pub mod views;

pub use config::{FeedRequest, PipelineOptions};
pub use error::{DataError, ErrorKind, FeedError};
pub use pipeline::{FeedOutcome, FeedPipeline, FeedResponse, OmittedCounts};
