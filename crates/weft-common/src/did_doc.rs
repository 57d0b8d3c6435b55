//! DID document representation, reduced to what service discovery needs

use crate::types::Did;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use url::Url;

/// DID Document.
///
/// Only the fields used for service discovery are modeled explicitly. All
/// other fields are captured in `extra_data` for forward compatibility.
///
/// Example
/// ```
/// use weft_common::did_doc::DidDocument;
/// use serde_json::json;
/// let doc: DidDocument = serde_json::from_value(json!({
///   "id": "did:web:feeds.example.com",
///   "service": [{"id":"#bsky_fg","type":"BskyFeedGenerator","serviceEndpoint":"https://feeds.example.com"}]
/// })).unwrap();
/// let url = doc.service_endpoint("#bsky_fg", "BskyFeedGenerator").unwrap();
/// assert_eq!(url.as_str(), "https://feeds.example.com/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// Document identifier (e.g., `did:plc:...` or `did:web:...`)
    pub id: Did,

    /// Alternate identifiers for the subject, such as at://<handle>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<SmolStr>>,

    /// Services associated with this DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,

    /// Forward‑compatible capture of unmodeled fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

impl DidDocument {
    /// Find a service entry by fragment id and type and return its endpoint.
    ///
    /// `id` is matched either as written (`#bsky_fg`) or qualified with the
    /// document DID (`did:web:example.com#bsky_fg`). The endpoint must be an
    /// absolute http(s) url; anything else is treated as absent.
    pub fn service_endpoint(&self, id: &str, r#type: &str) -> Option<Url> {
        let qualified = format!("{}{}", self.id, id);
        self.service.as_ref().and_then(|services| {
            services
                .iter()
                .filter(|s| s.r#type == r#type)
                .find(|s| s.id == id || s.id == qualified)
                .and_then(|s| s.endpoint_url())
        })
    }

    /// Extract the AtprotoPersonalDataServer service endpoint.
    pub fn pds_endpoint(&self) -> Option<Url> {
        self.service_endpoint("#atproto_pds", "AtprotoPersonalDataServer")
    }
}

/// Service entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service identifier
    #[builder(into)]
    pub id: SmolStr,
    /// Service type (e.g., `BskyFeedGenerator`)
    #[serde(rename = "type")]
    #[builder(into)]
    pub r#type: SmolStr,
    /// String or object; kept as raw JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<Value>,

    /// Forward‑compatible capture of unmodeled fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

impl Service {
    /// Endpoint as a `Url`. Accepts endpoint as string or object (string preferred).
    pub fn endpoint_url(&self) -> Option<Url> {
        let raw = match self.service_endpoint.as_ref()? {
            Value::String(s) => s.as_str(),
            Value::Object(obj) => obj.get("url")?.as_str()?,
            _ => return None,
        };
        let url = Url::parse(raw).ok()?;
        matches!(url.scheme(), "http" | "https")
            .then_some(url)
            .filter(|u| u.host().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(services: Value) -> DidDocument {
        serde_json::from_value(json!({
            "id": "did:web:feeds.example.com",
            "service": services,
        }))
        .unwrap()
    }

    #[test]
    fn finds_qualified_and_bare_ids() {
        let bare = doc(json!([{
            "id": "#bsky_fg", "type": "BskyFeedGenerator",
            "serviceEndpoint": "https://feeds.example.com"
        }]));
        assert!(bare.service_endpoint("#bsky_fg", "BskyFeedGenerator").is_some());

        let qualified = doc(json!([{
            "id": "did:web:feeds.example.com#bsky_fg", "type": "BskyFeedGenerator",
            "serviceEndpoint": "https://feeds.example.com"
        }]));
        assert!(qualified.service_endpoint("#bsky_fg", "BskyFeedGenerator").is_some());
    }

    #[test]
    fn type_must_match() {
        let d = doc(json!([{
            "id": "#bsky_fg", "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": "https://feeds.example.com"
        }]));
        assert!(d.service_endpoint("#bsky_fg", "BskyFeedGenerator").is_none());
    }

    #[test]
    fn malformed_endpoints_are_absent() {
        for endpoint in [json!("not a url"), json!("ftp://feeds.example.com"), json!(42)] {
            let d = doc(json!([{
                "id": "#bsky_fg", "type": "BskyFeedGenerator", "serviceEndpoint": endpoint
            }]));
            assert!(d.service_endpoint("#bsky_fg", "BskyFeedGenerator").is_none());
        }
    }

    #[test]
    fn object_endpoint() {
        let d = doc(json!([{
            "id": "#atproto_pds", "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": {"url": "https://pds.example.com"}
        }]));
        assert_eq!(d.pds_endpoint().unwrap().as_str(), "https://pds.example.com/");
    }

    #[test]
    fn keeps_unmodeled_fields() {
        let d: DidDocument = serde_json::from_value(json!({
            "id": "did:plc:alice",
            "@context": ["https://www.w3.org/ns/did/v1"]
        }))
        .unwrap();
        assert!(d.extra_data.contains_key("@context"));
        assert!(d.pds_endpoint().is_none());
    }
}
