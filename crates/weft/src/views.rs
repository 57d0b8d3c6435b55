//! Rendered views, serialized in the `app.bsky.*` wire shapes.
//!
//! Union members carry their `$type` via internally tagged enums so the
//! output is identical to what clients already parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use weft_common::{AtUri, Cid, Did, Label};

/// Viewer-relative state attached to a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorViewerState {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_by_list: Option<ListViewBasic>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked_by: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<AtUri>,
}

/// `app.bsky.actor.defs#profileViewBasic`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileViewBasic {
    pub did: Did,
    pub handle: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ActorViewerState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// `app.bsky.graph.defs#listViewBasic`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListViewBasic {
    pub uri: AtUri,
    pub cid: Cid,
    pub name: String,
    pub purpose: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

/// `app.bsky.graph.defs#listView`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub uri: AtUri,
    pub cid: Cid,
    pub creator: ProfileViewBasic,
    pub name: String,
    pub purpose: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub indexed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// `app.bsky.feed.defs#generatorView`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorView {
    pub uri: AtUri,
    pub cid: Cid,
    pub did: Did,
    pub creator: ProfileViewBasic,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub like_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<GeneratorViewerState>,
    pub indexed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorViewerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<AtUri>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostViewerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost: Option<AtUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<AtUri>,
}

/// `app.bsky.feed.defs#postView`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: AtUri,
    pub cid: Cid,
    pub author: ProfileViewBasic,
    /// Record body exactly as stored
    pub record: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
    pub reply_count: u64,
    pub repost_count: u64,
    pub like_count: u64,
    pub indexed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<PostViewerState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// Author stub shown in place of a blocked record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAuthor {
    pub did: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ActorViewerState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundPost {
    pub uri: AtUri,
    pub not_found: bool,
}

impl NotFoundPost {
    pub fn new(uri: AtUri) -> Self {
        Self {
            uri,
            not_found: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedPost {
    pub uri: AtUri,
    pub blocked: bool,
    pub author: BlockedAuthor,
}

/// A reply ancestor slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ReplyPost {
    #[serde(rename = "app.bsky.feed.defs#postView")]
    Post(Box<PostView>),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound(NotFoundPost),
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked(BlockedPost),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: ReplyPost,
    pub parent: ReplyPost,
}

/// Why a post appears in the feed, when it is not authored by the feed
/// subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FeedReason {
    #[serde(rename = "app.bsky.feed.defs#reasonRepost", rename_all = "camelCase")]
    Repost {
        by: ProfileViewBasic,
        indexed_at: DateTime<Utc>,
    },
}

/// `app.bsky.feed.defs#feedViewPost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedViewPost {
    pub post: PostView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FeedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_context: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectRatio {
    pub width: u64,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewImage {
    pub thumb: String,
    pub fullsize: String,
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesView {
    pub images: Vec<ViewImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewExternal {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalView {
    pub external: ViewExternal,
}

/// `app.bsky.embed.record#viewRecord`.
///
/// Carries no resolved `embeds` of its own: an embedded post's own embed
/// stays unexpanded inside `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub uri: AtUri,
    pub cid: Cid,
    pub author: ProfileViewBasic,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    pub reply_count: u64,
    pub repost_count: u64,
    pub like_count: u64,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNotFound {
    pub uri: AtUri,
    pub not_found: bool,
}

impl ViewNotFound {
    pub fn new(uri: AtUri) -> Self {
        Self {
            uri,
            not_found: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBlocked {
    pub uri: AtUri,
    pub blocked: bool,
    pub author: BlockedAuthor,
}

/// The record slot of an embedded-record view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum EmbeddedRecord {
    #[serde(rename = "app.bsky.embed.record#viewRecord")]
    Record(Box<ViewRecord>),
    #[serde(rename = "app.bsky.embed.record#viewNotFound")]
    NotFound(ViewNotFound),
    #[serde(rename = "app.bsky.embed.record#viewBlocked")]
    Blocked(ViewBlocked),
    #[serde(rename = "app.bsky.feed.defs#generatorView")]
    Generator(Box<GeneratorView>),
    #[serde(rename = "app.bsky.graph.defs#listView")]
    List(Box<ListView>),
}

impl EmbeddedRecord {
    /// The referenced uri, whatever the outcome
    pub fn uri(&self) -> &AtUri {
        match self {
            EmbeddedRecord::Record(v) => &v.uri,
            EmbeddedRecord::NotFound(v) => &v.uri,
            EmbeddedRecord::Blocked(v) => &v.uri,
            EmbeddedRecord::Generator(v) => &v.uri,
            EmbeddedRecord::List(v) => &v.uri,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub record: EmbeddedRecord,
}

/// Media half of a record-with-media embed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum MediaView {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images(ImagesView),
    #[serde(rename = "app.bsky.embed.external#view")]
    External(ExternalView),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWithMediaView {
    pub record: RecordView,
    pub media: MediaView,
}

/// A resolved post embed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum EmbedView {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images(ImagesView),
    #[serde(rename = "app.bsky.embed.external#view")]
    External(ExternalView),
    #[serde(rename = "app.bsky.embed.record#view")]
    Record(RecordView),
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia(RecordWithMediaView),
}

impl EmbedView {
    /// Embedded record slot, if this embed references a record
    pub fn record(&self) -> Option<&EmbeddedRecord> {
        match self {
            EmbedView::Record(r) => Some(&r.record),
            EmbedView::RecordWithMedia(r) => Some(&r.record.record),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uri(s: &str) -> AtUri {
        AtUri::new(s).unwrap()
    }

    #[test]
    fn not_found_embed_wire_shape() {
        let view = EmbedView::Record(RecordView {
            record: EmbeddedRecord::NotFound(ViewNotFound::new(uri(
                "at://did:plc:x/app.bsky.feed.post/1",
            ))),
        });
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "$type": "app.bsky.embed.record#view",
                "record": {
                    "$type": "app.bsky.embed.record#viewNotFound",
                    "uri": "at://did:plc:x/app.bsky.feed.post/1",
                    "notFound": true
                }
            })
        );
    }

    #[test]
    fn blocked_embed_wire_shape() {
        let blocked = EmbeddedRecord::Blocked(ViewBlocked {
            uri: uri("at://did:plc:c/app.bsky.feed.post/1"),
            blocked: true,
            author: BlockedAuthor {
                did: Did::new("did:plc:c").unwrap(),
                viewer: Some(ActorViewerState {
                    blocked_by: true,
                    ..Default::default()
                }),
            },
        });
        let value = serde_json::to_value(&blocked).unwrap();
        assert_eq!(value["$type"], "app.bsky.embed.record#viewBlocked");
        assert_eq!(value["author"]["viewer"], json!({"blockedBy": true}));
    }

    #[test]
    fn repost_reason_shape() {
        let reason = FeedReason::Repost {
            by: ProfileViewBasic {
                did: Did::new("did:plc:b").unwrap(),
                handle: "b.test".into(),
                display_name: None,
                avatar: None,
                viewer: None,
                labels: vec![],
            },
            indexed_at: "2024-01-01T00:00:00Z".parse().unwrap(),
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["$type"], "app.bsky.feed.defs#reasonRepost");
        assert_eq!(value["by"], json!({"did": "did:plc:b", "handle": "b.test"}));
        assert!(value.get("indexedAt").is_some());
    }
}
