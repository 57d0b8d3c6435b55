//! DID document resolution for feed generator services

use std::future::Future;
use url::Url;
use weft_common::{Did, DidDocument, TransportError};

/// Identity resolution failure
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum IdentityError {
    /// No document exists for the DID
    #[error("DID document not found for {0}")]
    #[diagnostic(code(weft::identity::not_found))]
    NotFound(Did),

    /// The document could not be fetched
    #[error(transparent)]
    #[diagnostic(code(weft::identity::transport))]
    Transport(#[from] TransportError),

    /// The document was fetched but is not valid JSON for a DID document
    #[error("invalid DID document: {0}")]
    #[diagnostic(code(weft::identity::invalid_doc))]
    InvalidDoc(String),

    /// The document's `id` is a different DID than the one requested
    #[error("DID document id mismatch: expected {expected}, found {found}")]
    #[diagnostic(
        code(weft::identity::doc_id_mismatch),
        help("the document was served for a different DID than requested")
    )]
    DocIdMismatch {
        /// Requested DID
        expected: Did,
        /// `id` in the served document
        found: Did,
    },

    /// The document does not carry the requested service
    #[error("no {id} service of type {service_type} in DID document")]
    #[diagnostic(code(weft::identity::missing_service))]
    MissingService {
        /// Service fragment id
        id: String,
        /// Service type
        service_type: String,
    },
}

/// Resolves DIDs to documents.
///
/// Only `resolve_did_doc` is required; service lookup is provided on top of
/// it and checks that the document is actually for the requested DID.
pub trait IdentityResolver {
    /// Fetch the DID document for `did`
    fn resolve_did_doc(
        &self,
        did: &Did,
    ) -> impl Future<Output = Result<DidDocument, IdentityError>> + Send
    where
        Self: Sync;

    /// Resolve `did` and find the endpoint of the service with fragment `id`
    /// and type `type`
    fn resolve_service_endpoint(
        &self,
        did: &Did,
        id: &str,
        r#type: &str,
    ) -> impl Future<Output = Result<Url, IdentityError>> + Send
    where
        Self: Sync,
    {
        async move {
            let doc = self.resolve_did_doc(did).await?;
            if &doc.id != did {
                return Err(IdentityError::DocIdMismatch {
                    expected: did.clone(),
                    found: doc.id,
                });
            }
            doc.service_endpoint(id, r#type)
                .ok_or_else(|| IdentityError::MissingService {
                    id: id.to_string(),
                    service_type: r#type.to_string(),
                })
        }
    }
}

impl<T: IdentityResolver + Sync + Send> IdentityResolver for std::sync::Arc<T> {
    async fn resolve_did_doc(&self, did: &Did) -> Result<DidDocument, IdentityError> {
        self.as_ref().resolve_did_doc(did).await
    }
}
