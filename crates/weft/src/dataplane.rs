//! Batched reads against the app view's index.
//!
//! Every method takes the full id set for one round trip and returns rows
//! for whichever ids exist. Missing ids are simply absent from the result;
//! callers never see a per-id error.

use bon::Builder;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use std::collections::HashMap;
use weft_common::{AtUri, Cid, Did, Label, StrongRef};

use crate::error::DataError;

/// In-memory data plane for tests and local tooling
pub mod memory;

pub use memory::MemoryDataPlane;

/// Indexed profile row for an account
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(start_fn = new)]
pub struct ActorRow {
    /// Account DID
    pub did: Did,
    /// Verified handle; `None` when the handle does not resolve back
    #[builder(into)]
    pub handle: Option<SmolStr>,
    #[builder(into)]
    pub display_name: Option<String>,
    #[builder(into)]
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub indexed_at: Option<DateTime<Utc>>,
    /// Taken down by moderation
    #[builder(default)]
    pub taken_down: bool,
    /// Deactivated or deleted by the account holder
    #[builder(default)]
    pub soft_deleted: bool,
}

impl ActorRow {
    /// Whether the account may appear in views at all
    pub fn is_visible(&self) -> bool {
        !self.taken_down && !self.soft_deleted
    }
}

/// Indexed post row.
///
/// `viewer_like` and `viewer_repost` are filled in by the same query that
/// reads the post when a viewer is supplied.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(start_fn = new)]
pub struct PostRow {
    pub uri: AtUri,
    pub cid: Cid,
    /// Record body as stored, JSON encoded
    #[builder(into)]
    pub record: Bytes,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    /// Thread root, for replies
    pub reply_root: Option<StrongRef>,
    /// Direct parent, for replies
    pub reply_parent: Option<StrongRef>,
    #[builder(default)]
    pub like_count: u64,
    #[builder(default)]
    pub repost_count: u64,
    #[builder(default)]
    pub reply_count: u64,
    pub viewer_like: Option<AtUri>,
    pub viewer_repost: Option<AtUri>,
    #[builder(default)]
    pub taken_down: bool,
}

/// Indexed repost record
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(start_fn = new)]
pub struct RepostRow {
    pub uri: AtUri,
    /// The reposted post
    pub subject: StrongRef,
    pub indexed_at: DateTime<Utc>,
}

/// Indexed feed generator record
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(start_fn = new)]
pub struct FeedGenRow {
    pub uri: AtUri,
    pub cid: Cid,
    /// DID of the service that produces the skeleton
    pub service_did: Did,
    #[builder(into)]
    pub display_name: String,
    #[builder(into)]
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    #[builder(default)]
    pub like_count: u64,
    pub viewer_like: Option<AtUri>,
    pub indexed_at: DateTime<Utc>,
    /// Taken down by moderation
    #[builder(default)]
    pub taken_down: bool,
}

/// Indexed list record
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(start_fn = new)]
pub struct ListRow {
    pub uri: AtUri,
    pub cid: Cid,
    #[builder(into)]
    pub name: String,
    /// List purpose token, e.g. `app.bsky.graph.defs#modlist`
    #[builder(into)]
    pub purpose: SmolStr,
    #[builder(into)]
    pub description: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub indexed_at: DateTime<Utc>,
    /// The viewer has muted this list
    #[builder(default)]
    pub viewer_muted: bool,
    /// The viewer's listblock record, if they block via this list
    pub viewer_blocked: Option<AtUri>,
    #[builder(default)]
    pub taken_down: bool,
}

/// A block record. `creator` blocks `subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub uri: AtUri,
    pub creator: Did,
    pub subject: Did,
}

/// A follow record. `creator` follows `subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRow {
    pub uri: AtUri,
    pub creator: Did,
    pub subject: Did,
}

/// `subject` is on a mute list the viewer subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMuteRow {
    pub subject: Did,
    pub list: AtUri,
}

/// Batched, read-only access to indexed records and the social graph.
///
/// Implementations must answer each call in one round trip regardless of
/// how many ids it carries. Graph reads return rows in *both* directions
/// between the viewer and each subject.
#[trait_variant::make(Send)]
pub trait DataPlane: Clone + Sync {
    /// Profile rows, including taken-down and deleted accounts
    async fn actors(&self, dids: &[Did]) -> Result<Vec<ActorRow>, DataError>;

    /// Post rows, with viewer like/repost state when `viewer` is set
    async fn posts(&self, uris: &[AtUri], viewer: Option<&Did>)
    -> Result<Vec<PostRow>, DataError>;

    /// Repost records
    async fn reposts(&self, uris: &[AtUri]) -> Result<Vec<RepostRow>, DataError>;

    /// Feed generator records, with viewer like state when `viewer` is set
    async fn feed_generators(
        &self,
        uris: &[AtUri],
        viewer: Option<&Did>,
    ) -> Result<Vec<FeedGenRow>, DataError>;

    /// List records, with viewer mute/block state when `viewer` is set
    async fn lists(&self, uris: &[AtUri], viewer: Option<&Did>)
    -> Result<Vec<ListRow>, DataError>;

    /// Labels keyed by subject (DID or at:// uri)
    async fn labels(&self, subjects: &[SmolStr]) -> Result<HashMap<SmolStr, Vec<Label>>, DataError>;

    /// Blocks between `viewer` and any of `subjects`, either direction
    async fn blocks(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<BlockRow>, DataError>;

    /// Follows between `viewer` and any of `subjects`, either direction
    async fn follows(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<FollowRow>, DataError>;

    /// Which of `subjects` the viewer has muted directly
    async fn mutes(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<Did>, DataError>;

    /// Which of `subjects` appear on a mute list the viewer subscribes to
    async fn list_mutes(&self, viewer: &Did, subjects: &[Did])
    -> Result<Vec<ListMuteRow>, DataError>;
}
