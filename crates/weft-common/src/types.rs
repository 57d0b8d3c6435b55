//! Validated AT Protocol identifier strings.
//!
//! Every type here is an owned [`SmolStr`] newtype that is checked on
//! construction and deserialization, so a value that exists is well formed.

use miette::SourceSpan;
use smol_str::SmolStr;

/// at:// record uris and strong references
pub mod aturi;
/// Content identifiers
pub mod cid;
/// Decentralized identifiers
pub mod did;

pub use aturi::{AtUri, StrongRef};
pub use cid::Cid;
pub use did::Did;

/// Parsing error for atproto string types.
///
/// `spec` refers to the final url path segment on atproto.com/specs,
/// detailing the specification for the type
/// `source` is the source string, or part of it
/// `kind` is the type of parsing error: `[StrParseKind]`
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("error in `{source}`: {kind}")]
#[diagnostic(url("https://atproto.com/specs/{spec}"))]
pub struct AtStrError {
    /// Spec page slug for the type that failed to parse
    pub spec: SmolStr,
    /// The offending input
    #[source_code]
    pub source: String,
    /// What went wrong
    #[source]
    #[diagnostic_source]
    pub kind: StrParseKind,
}

impl AtStrError {
    /// Input exceeded the maximum length for the type
    pub fn too_long(spec: &'static str, source: &str, max: usize, actual: usize) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind: StrParseKind::TooLong { max, actual },
        }
    }

    /// Input did not match the type's grammar
    pub fn regex(spec: &'static str, source: &str, message: SmolStr) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind: StrParseKind::RegexFail {
                span: None,
                message,
            },
        }
    }

    /// A required component was absent, with the span where it was expected
    pub fn missing(spec: &'static str, source: &str, expected: &str, at: usize) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind: StrParseKind::MissingComponent {
                span: Some((at, 0).into()),
                message: SmolStr::new(expected),
            },
        }
    }

    /// A component was present but malformed
    pub fn component(
        spec: &'static str,
        source: &str,
        span: (usize, usize),
        message: impl Into<SmolStr>,
    ) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind: StrParseKind::RegexFail {
                span: Some(span.into()),
                message: message.into(),
            },
        }
    }
}

/// Kind of [`AtStrError`]
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[allow(missing_docs)]
pub enum StrParseKind {
    #[error("regex failure - {message}")]
    #[diagnostic(code(weft::types::regex_fail))]
    RegexFail {
        #[label]
        span: Option<SourceSpan>,
        #[help]
        message: SmolStr,
    },
    #[error("string too long (allowed: {max}, actual: {actual})")]
    #[diagnostic(code(weft::types::wrong_length))]
    TooLong { max: usize, actual: usize },
    #[error("missing - {message}")]
    #[diagnostic(code(weft::types::missing_component))]
    MissingComponent {
        #[label]
        span: Option<SourceSpan>,
        #[help]
        message: SmolStr,
    },
}
