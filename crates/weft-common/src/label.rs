//! Moderation labels as they are attached to hydrated views

use crate::types::{Cid, Did};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A label applied by a labeler to an account or record.
///
/// `uri` is the labelled subject: a DID for account labels, an at:// uri for
/// record labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    /// DID of the labeler that emitted the label
    pub src: Did,
    /// Subject the label applies to
    pub uri: SmolStr,
    /// Optionally pins the label to a specific record version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<Cid>,
    /// Label value, e.g. `porn` or `!hide`
    pub val: SmolStr,
    /// Whether this label negates an earlier label
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub neg: bool,
    /// Creation time
    pub cts: DateTime<Utc>,
    /// Expiry, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,
}

impl Label {
    /// Whether the label has an expiry at or before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_shape() {
        let json = serde_json::json!({
            "src": "did:plc:labeler",
            "uri": "at://did:plc:alice/app.bsky.feed.post/a",
            "val": "porn",
            "cts": "2024-01-01T00:00:00Z"
        });
        let label: Label = serde_json::from_value(json.clone()).unwrap();
        assert!(!label.neg);
        assert_eq!(label.val, "porn");
        assert_eq!(serde_json::to_value(&label).unwrap(), json);
    }

    #[test]
    fn expiry() {
        let mut label: Label = serde_json::from_value(serde_json::json!({
            "src": "did:plc:labeler",
            "uri": "did:plc:alice",
            "val": "spam",
            "cts": "2024-01-01T00:00:00Z",
            "exp": "2024-02-01T00:00:00Z"
        }))
        .unwrap();
        let later = "2024-03-01T00:00:00Z".parse().unwrap();
        assert!(label.is_expired(later));
        label.exp = None;
        assert!(!label.is_expired(later));
    }
}
