use super::{
    ActorRow, BlockRow, DataPlane, FeedGenRow, FollowRow, ListMuteRow, ListRow, PostRow, RepostRow,
};
use crate::error::DataError;
use smol_str::SmolStr;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use weft_common::{AtUri, Did, Label};

/// One call made against a [`MemoryDataPlane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCall {
    /// Method name, e.g. `posts`
    pub method: &'static str,
    /// Number of ids in the batch
    pub batch: usize,
}

#[derive(Debug, Default)]
struct Tables {
    actors: BTreeMap<Did, ActorRow>,
    posts: BTreeMap<AtUri, PostRow>,
    reposts: BTreeMap<AtUri, RepostRow>,
    generators: BTreeMap<AtUri, FeedGenRow>,
    lists: BTreeMap<AtUri, ListRow>,
    labels: HashMap<SmolStr, Vec<Label>>,
    blocks: Vec<BlockRow>,
    follows: Vec<FollowRow>,
    // (creator, subject)
    mutes: Vec<(Did, Did)>,
    // (subscriber, list)
    list_subscriptions: Vec<(Did, AtUri)>,
    // (list, member)
    list_items: Vec<(AtUri, Did)>,
    // (creator, subject, like record)
    likes: Vec<(Did, AtUri, AtUri)>,
    failing: Option<&'static str>,
}

/// In-memory data plane.
///
/// Clones share the same tables, so a test can keep a handle for seeding
/// and inspecting calls while the pipeline owns another. Every read is
/// recorded as a [`DataCall`].
///
/// # Example
///
/// ```
/// use weft::dataplane::{ActorRow, DataPlane, MemoryDataPlane};
/// use weft_common::Did;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = MemoryDataPlane::new();
/// let alice = Did::new("did:plc:alice")?;
/// data.insert_actor(ActorRow::new().did(alice.clone()).handle("alice.test").build());
///
/// let rows = data.actors(&[alice]).await?;
/// assert_eq!(rows.len(), 1);
/// assert_eq!(data.call_count("actors"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDataPlane {
    tables: Arc<RwLock<Tables>>,
    calls: Arc<RwLock<Vec<DataCall>>>,
}

impl MemoryDataPlane {
    /// Create new empty data plane
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: &'static str, batch: usize) -> Result<(), DataError> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DataCall { method, batch });
        match self.read().failing {
            Some(m) if m == method => Err(DataError::Unavailable(SmolStr::new_static(
                "memory data plane configured to fail",
            ))),
            _ => Ok(()),
        }
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<DataCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made to `method`
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every subsequent call to `method` fail with
    /// [`DataError::Unavailable`]. `None` clears it.
    pub fn fail_on(&self, method: Option<&'static str>) {
        self.write().failing = method;
    }

    pub fn insert_actor(&self, row: ActorRow) {
        self.write().actors.insert(row.did.clone(), row);
    }

    /// Insert a post. Viewer fields on `row` are ignored; they are computed
    /// from likes and reposts at read time.
    pub fn insert_post(&self, row: PostRow) {
        self.write().posts.insert(row.uri.clone(), row);
    }

    /// Delete a post, as if it was removed after a skeleton referenced it
    pub fn remove_post(&self, uri: &AtUri) -> Option<PostRow> {
        self.write().posts.remove(uri)
    }

    pub fn insert_repost(&self, row: RepostRow) {
        self.write().reposts.insert(row.uri.clone(), row);
    }

    pub fn insert_feed_generator(&self, row: FeedGenRow) {
        self.write().generators.insert(row.uri.clone(), row);
    }

    /// Insert a list. Viewer fields on `row` are ignored.
    pub fn insert_list(&self, row: ListRow) {
        self.write().lists.insert(row.uri.clone(), row);
    }

    pub fn insert_label(&self, label: Label) {
        self.write()
            .labels
            .entry(label.uri.clone())
            .or_default()
            .push(label);
    }

    pub fn insert_block(&self, row: BlockRow) {
        self.write().blocks.push(row);
    }

    pub fn insert_follow(&self, row: FollowRow) {
        self.write().follows.push(row);
    }

    pub fn insert_mute(&self, creator: Did, subject: Did) {
        self.write().mutes.push((creator, subject));
    }

    /// `subscriber` mutes everyone on `list`
    pub fn subscribe_mute_list(&self, subscriber: Did, list: AtUri) {
        self.write().list_subscriptions.push((subscriber, list));
    }

    pub fn insert_list_item(&self, list: AtUri, member: Did) {
        self.write().list_items.push((list, member));
    }

    /// `creator` likes the record at `subject` via the like record `like`
    pub fn insert_like(&self, creator: Did, subject: AtUri, like: AtUri) {
        self.write().likes.push((creator, subject, like));
    }

    fn viewer_like(tables: &Tables, viewer: Option<&Did>, subject: &AtUri) -> Option<AtUri> {
        let viewer = viewer?;
        tables
            .likes
            .iter()
            .find(|(creator, s, _)| creator == viewer && s == subject)
            .map(|(_, _, like)| like.clone())
    }
}

impl DataPlane for MemoryDataPlane {
    async fn actors(&self, dids: &[Did]) -> Result<Vec<ActorRow>, DataError> {
        self.record("actors", dids.len())?;
        let tables = self.read();
        Ok(dids
            .iter()
            .filter_map(|did| tables.actors.get(did).cloned())
            .collect())
    }

    async fn posts(&self, uris: &[AtUri], viewer: Option<&Did>) -> Result<Vec<PostRow>, DataError> {
        self.record("posts", uris.len())?;
        let tables = self.read();
        Ok(uris
            .iter()
            .filter_map(|uri| tables.posts.get(uri))
            .map(|row| {
                let mut row = row.clone();
                row.viewer_like = Self::viewer_like(&tables, viewer, &row.uri);
                row.viewer_repost = viewer.and_then(|viewer| {
                    tables
                        .reposts
                        .values()
                        .find(|r| r.uri.authority() == viewer && r.subject.uri == row.uri)
                        .map(|r| r.uri.clone())
                });
                row
            })
            .collect())
    }

    async fn reposts(&self, uris: &[AtUri]) -> Result<Vec<RepostRow>, DataError> {
        self.record("reposts", uris.len())?;
        let tables = self.read();
        Ok(uris
            .iter()
            .filter_map(|uri| tables.reposts.get(uri).cloned())
            .collect())
    }

    async fn feed_generators(
        &self,
        uris: &[AtUri],
        viewer: Option<&Did>,
    ) -> Result<Vec<FeedGenRow>, DataError> {
        self.record("feed_generators", uris.len())?;
        let tables = self.read();
        Ok(uris
            .iter()
            .filter_map(|uri| tables.generators.get(uri))
            .map(|row| {
                let mut row = row.clone();
                row.viewer_like = Self::viewer_like(&tables, viewer, &row.uri);
                row
            })
            .collect())
    }

    async fn lists(&self, uris: &[AtUri], viewer: Option<&Did>) -> Result<Vec<ListRow>, DataError> {
        self.record("lists", uris.len())?;
        let tables = self.read();
        Ok(uris
            .iter()
            .filter_map(|uri| tables.lists.get(uri))
            .map(|row| {
                let mut row = row.clone();
                row.viewer_muted = viewer.is_some_and(|viewer| {
                    tables
                        .list_subscriptions
                        .iter()
                        .any(|(sub, list)| sub == viewer && list == &row.uri)
                });
                row.viewer_blocked = None;
                row
            })
            .collect())
    }

    async fn labels(&self, subjects: &[SmolStr]) -> Result<HashMap<SmolStr, Vec<Label>>, DataError> {
        self.record("labels", subjects.len())?;
        let tables = self.read();
        Ok(subjects
            .iter()
            .filter_map(|s| tables.labels.get(s).map(|l| (s.clone(), l.clone())))
            .collect())
    }

    async fn blocks(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<BlockRow>, DataError> {
        self.record("blocks", subjects.len())?;
        let tables = self.read();
        Ok(tables
            .blocks
            .iter()
            .filter(|b| {
                (&b.creator == viewer && subjects.contains(&b.subject))
                    || (&b.subject == viewer && subjects.contains(&b.creator))
            })
            .cloned()
            .collect())
    }

    async fn follows(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<FollowRow>, DataError> {
        self.record("follows", subjects.len())?;
        let tables = self.read();
        Ok(tables
            .follows
            .iter()
            .filter(|f| {
                (&f.creator == viewer && subjects.contains(&f.subject))
                    || (&f.subject == viewer && subjects.contains(&f.creator))
            })
            .cloned()
            .collect())
    }

    async fn mutes(&self, viewer: &Did, subjects: &[Did]) -> Result<Vec<Did>, DataError> {
        self.record("mutes", subjects.len())?;
        let tables = self.read();
        Ok(tables
            .mutes
            .iter()
            .filter(|(creator, subject)| creator == viewer && subjects.contains(subject))
            .map(|(_, subject)| subject.clone())
            .collect())
    }

    async fn list_mutes(
        &self,
        viewer: &Did,
        subjects: &[Did],
    ) -> Result<Vec<ListMuteRow>, DataError> {
        self.record("list_mutes", subjects.len())?;
        let tables = self.read();
        let mut rows = Vec::new();
        for (_, list) in tables.list_subscriptions.iter().filter(|(s, _)| s == viewer) {
            for (_, member) in tables
                .list_items
                .iter()
                .filter(|(l, m)| l == list && subjects.contains(m))
            {
                rows.push(ListMuteRow {
                    subject: member.clone(),
                    list: list.clone(),
                });
            }
        }
        Ok(rows)
    }
}
