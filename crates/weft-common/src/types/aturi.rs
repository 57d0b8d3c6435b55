use crate::types::{AtStrError, Cid, Did};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use smol_str::{SmolStr, ToSmolStr, format_smolstr};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

/// NSID grammar, used for the collection segment.
pub static NSID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+(\.[a-zA-Z][a-zA-Z0-9]{0,62})$").unwrap()
});

/// Record key grammar
pub static RKEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.\-_:~]{1,512}$").unwrap());

/// A record reference of the form `at://{authority}/{collection}/{rkey}`.
///
/// Only fully-qualified record uris with a DID authority are accepted, since
/// those are the only ones the feed pipeline can hydrate. The parsed parts are
/// kept alongside the original string; equality, ordering and hashing use the
/// string alone.
#[derive(Clone)]
pub struct AtUri {
    uri: SmolStr,
    authority: Did,
    collection: SmolStr,
    rkey: SmolStr,
}

impl AtUri {
    /// Fallible constructor, validates
    pub fn new(uri: impl AsRef<str>) -> Result<Self, AtStrError> {
        let uri = uri.as_ref();
        if uri.len() > 8192 {
            return Err(AtStrError::too_long("at-uri-scheme", uri, 8192, uri.len()));
        }
        let Some(rest) = uri.strip_prefix("at://") else {
            return Err(AtStrError::missing("at-uri-scheme", uri, "at://", 0));
        };
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut parts = rest.splitn(3, '/');
        let authority = parts.next().unwrap_or_default();
        let authority = Did::new(authority).map_err(|_| {
            AtStrError::component(
                "at-uri-scheme",
                uri,
                (5, authority.len()),
                "authority must be a DID",
            )
        })?;
        let Some(collection) = parts.next().filter(|c| !c.is_empty()) else {
            return Err(AtStrError::missing("at-uri-scheme", uri, "collection", uri.len()));
        };
        if !NSID_REGEX.is_match(collection) {
            let start = uri.find(collection).unwrap_or_default();
            return Err(AtStrError::component(
                "at-uri-scheme",
                uri,
                (start, collection.len()),
                "collection must be an NSID",
            ));
        }
        let Some(rkey) = parts.next().filter(|r| !r.is_empty()) else {
            return Err(AtStrError::missing("at-uri-scheme", uri, "record key", uri.len()));
        };
        if !RKEY_REGEX.is_match(rkey) {
            let start = uri.rfind(rkey).unwrap_or_default();
            return Err(AtStrError::component(
                "at-uri-scheme",
                uri,
                (start, rkey.len()),
                "invalid record key",
            ));
        }
        Ok(Self {
            uri: format_smolstr!("at://{}/{}/{}", authority, collection, rkey),
            collection: collection.to_smolstr(),
            rkey: rkey.to_smolstr(),
            authority,
        })
    }

    /// Build a record uri from already-validated parts
    pub fn from_parts(
        authority: &Did,
        collection: &str,
        rkey: &str,
    ) -> Result<Self, AtStrError> {
        Self::new(format_smolstr!("at://{}/{}/{}", authority, collection, rkey))
    }

    /// The repository DID that owns this record
    pub fn authority(&self) -> &Did {
        &self.authority
    }

    /// The collection NSID, e.g. `app.bsky.feed.post`
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The record key
    pub fn rkey(&self) -> &str {
        &self.rkey
    }

    /// Get the uri as a string slice
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl PartialEq for AtUri {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for AtUri {}

impl Hash for AtUri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state)
    }
}

impl PartialOrd for AtUri {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AtUri {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri.cmp(&other.uri)
    }
}

impl FromStr for AtUri {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for AtUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uri)
    }
}

impl<'de> Deserialize<'de> for AtUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: SmolStr = Deserialize::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl fmt::Debug for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtUri").field(&self.uri.as_str()).finish()
    }
}

impl AsRef<str> for AtUri {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for AtUri {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<AtUri> for SmolStr {
    fn from(value: AtUri) -> Self {
        value.uri
    }
}

/// A `{uri, cid}` pair pinning a record reference to a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrongRef {
    /// Record uri
    pub uri: AtUri,
    /// Content hash of the referenced record version
    pub cid: Cid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parts() {
        let uri = AtUri::new("at://did:plc:alice/app.bsky.feed.post/3k2abc").unwrap();
        assert_eq!(uri.authority().as_str(), "did:plc:alice");
        assert_eq!(uri.collection(), "app.bsky.feed.post");
        assert_eq!(uri.rkey(), "3k2abc");
        assert_eq!(uri.as_str(), "at://did:plc:alice/app.bsky.feed.post/3k2abc");
    }

    #[test]
    fn drops_query_and_fragment() {
        let uri = AtUri::new("at://did:plc:alice/app.bsky.feed.post/3k2abc#frag").unwrap();
        assert_eq!(uri.as_str(), "at://did:plc:alice/app.bsky.feed.post/3k2abc");
    }

    #[test]
    fn rejects_incomplete_uris() {
        assert!(AtUri::new("https://did:plc:alice/app.bsky.feed.post/x").is_err());
        assert!(AtUri::new("at://did:plc:alice").is_err());
        assert!(AtUri::new("at://did:plc:alice/app.bsky.feed.post").is_err());
        assert!(AtUri::new("at://did:plc:alice/app.bsky.feed.post/").is_err());
        assert!(AtUri::new("at://alice.bsky.social/app.bsky.feed.post/x").is_err());
        assert!(AtUri::new("at://did:plc:alice/notansid/x").is_err());
        assert!(AtUri::new("at://did:plc:alice/app.bsky.feed.post/bad key").is_err());
    }

    #[test]
    fn borrow_lookup_matches_owned() {
        let mut set = std::collections::HashSet::new();
        set.insert(AtUri::new("at://did:plc:alice/app.bsky.feed.post/a").unwrap());
        assert!(set.contains("at://did:plc:alice/app.bsky.feed.post/a"));
    }

    #[test]
    fn strong_ref_serde() {
        let json = serde_json::json!({
            "uri": "at://did:plc:alice/app.bsky.feed.post/a",
            "cid": "bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm"
        });
        let r: StrongRef = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(r.uri.rkey(), "a");
        assert_eq!(serde_json::to_value(&r).unwrap(), json);
    }
}
