//! Core AT Protocol value types and utilities for weft
//!
//! Validated identifier strings ([`Did`], [`AtUri`], [`Cid`]), the label and
//! DID document shapes the feed pipeline reads, a minimal HTTP client
//! abstraction for outbound calls, and the XRPC error body format.

#![warn(missing_docs)]
pub use smol_str;
pub use url;

/// Transport and HTTP error types
pub mod error;
pub mod did_doc;
pub mod http_client;
pub mod label;
/// UTF-8 aware text helpers
pub mod text;
pub mod types;
pub mod xrpc;

pub use did_doc::{DidDocument, Service};
pub use error::{HttpError, TransportError};
pub use http_client::HttpClient;
pub use label::Label;
pub use types::{AtStrError, AtUri, Cid, Did, StrongRef};
