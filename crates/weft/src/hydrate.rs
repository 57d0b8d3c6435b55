//! Hydration: turning id sets into immutable per-request snapshots.
//!
//! Everything here loads in batches. Each loader deduplicates its input,
//! makes no data plane call for an empty set, and returns a map keyed by id
//! from which missing or hidden entries are simply absent.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use weft_common::{AtUri, Cid, Did, Label, StrongRef};

use crate::dataplane::{FeedGenRow, ListRow, PostRow, RepostRow};

/// Embedded record resolution
pub mod embed;
/// Request-wide label snapshot
pub mod labels;
/// Batched entity loading
pub mod loader;
/// Viewer-relative graph state
pub mod overlay;

pub use embed::{EmbedResolver, ResolvedEmbeds};
pub use labels::LabelSet;
pub use loader::{ActorLoadOptions, EntityBatchLoader};
pub use overlay::{RelationshipOverlay, ViewerOverlayResolver};

/// Handle shown for accounts whose handle does not verify
pub const INVALID_HANDLE: &str = "handle.invalid";

/// Sorted, deduplicated copy of `ids`
pub(crate) fn dedup<'a, T, I>(ids: I) -> Vec<T>
where
    T: Ord + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    ids.into_iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A hydrated account
#[derive(Debug, Clone, PartialEq)]
pub struct ActorInfo {
    pub did: Did,
    pub handle: SmolStr,
    /// Truncated to the configured byte limit
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub indexed_at: Option<DateTime<Utc>>,
    /// Relationship to the viewer. `None` for logged-out requests.
    pub overlay: Option<RelationshipOverlay>,
    /// Mute list the viewer mutes this account through
    pub muted_by_list: Option<ListInfo>,
    /// Account labels, when loaded alongside the actor. `None` means the
    /// caller reads them from a request-wide [`LabelSet`].
    pub labels: Option<Vec<Label>>,
}

impl ActorInfo {
    /// Block in either direction between the viewer and this account
    pub fn has_block(&self) -> bool {
        self.overlay.as_ref().is_some_and(|o| o.has_block())
    }

    /// The viewer blocks this account
    pub fn is_blocked_by_viewer(&self) -> bool {
        self.overlay.as_ref().is_some_and(|o| o.blocking.is_some())
    }

    /// Muted directly or through a list
    pub fn is_muted(&self) -> bool {
        self.overlay.as_ref().is_some_and(|o| o.is_muted())
    }
}

/// A hydrated post
#[derive(Debug, Clone, PartialEq)]
pub struct ContentInfo {
    pub uri: AtUri,
    pub cid: Cid,
    pub author: Did,
    /// Record body as stored
    pub body: Bytes,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub reply_root: Option<StrongRef>,
    pub reply_parent: Option<StrongRef>,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub viewer_like: Option<AtUri>,
    pub viewer_repost: Option<AtUri>,
}

impl ContentInfo {
    /// Root and parent, when this post is a reply. A reply missing its root
    /// pointer uses the parent for both.
    pub fn reply_refs(&self) -> Option<(&AtUri, &AtUri)> {
        let parent = self.reply_parent.as_ref()?;
        let root = self.reply_root.as_ref().unwrap_or(parent);
        Some((&root.uri, &parent.uri))
    }
}

impl From<PostRow> for ContentInfo {
    fn from(row: PostRow) -> Self {
        Self {
            author: row.uri.authority().clone(),
            uri: row.uri,
            cid: row.cid,
            body: row.record,
            created_at: row.created_at,
            indexed_at: row.indexed_at,
            reply_root: row.reply_root,
            reply_parent: row.reply_parent,
            like_count: row.like_count,
            repost_count: row.repost_count,
            reply_count: row.reply_count,
            viewer_like: row.viewer_like,
            viewer_repost: row.viewer_repost,
        }
    }
}

/// A hydrated repost record
#[derive(Debug, Clone, PartialEq)]
pub struct RepostInfo {
    pub uri: AtUri,
    /// Account that reposted
    pub originator: Did,
    pub subject: StrongRef,
    pub indexed_at: DateTime<Utc>,
}

impl From<RepostRow> for RepostInfo {
    fn from(row: RepostRow) -> Self {
        Self {
            originator: row.uri.authority().clone(),
            uri: row.uri,
            subject: row.subject,
            indexed_at: row.indexed_at,
        }
    }
}

/// A hydrated feed generator
#[derive(Debug, Clone, PartialEq)]
pub struct FeedGenInfo {
    pub uri: AtUri,
    pub cid: Cid,
    pub creator: Did,
    pub service_did: Did,
    pub display_name: String,
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub like_count: u64,
    pub viewer_like: Option<AtUri>,
    pub indexed_at: DateTime<Utc>,
}

impl From<FeedGenRow> for FeedGenInfo {
    fn from(row: FeedGenRow) -> Self {
        Self {
            creator: row.uri.authority().clone(),
            uri: row.uri,
            cid: row.cid,
            service_did: row.service_did,
            display_name: row.display_name,
            description: row.description,
            avatar_cid: row.avatar_cid,
            like_count: row.like_count,
            viewer_like: row.viewer_like,
            indexed_at: row.indexed_at,
        }
    }
}

/// A hydrated list
#[derive(Debug, Clone, PartialEq)]
pub struct ListInfo {
    pub uri: AtUri,
    pub cid: Cid,
    pub creator: Did,
    pub name: String,
    pub purpose: SmolStr,
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub indexed_at: DateTime<Utc>,
    pub viewer_muted: bool,
    pub viewer_blocked: Option<AtUri>,
}

impl From<ListRow> for ListInfo {
    fn from(row: ListRow) -> Self {
        Self {
            creator: row.uri.authority().clone(),
            uri: row.uri,
            cid: row.cid,
            name: row.name,
            purpose: row.purpose,
            description: row.description,
            avatar_cid: row.avatar_cid,
            indexed_at: row.indexed_at,
            viewer_muted: row.viewer_muted,
            viewer_blocked: row.viewer_blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_sorts_and_removes_repeats() {
        let a = Did::new("did:plc:a").unwrap();
        let b = Did::new("did:plc:b").unwrap();
        let ids = vec![b.clone(), a.clone(), b.clone()];
        assert_eq!(dedup(&ids), vec![a, b]);
        assert!(dedup::<Did, _>(&Vec::new()).is_empty());
    }
}
