use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use weft_common::text::truncate_utf8;
use weft_common::{AtUri, Did};

use super::{
    ActorInfo, ContentInfo, FeedGenInfo, INVALID_HANDLE, LabelSet, ListInfo, RepostInfo, dedup,
    overlay::ViewerOverlayResolver,
};
use crate::config::PipelineOptions;
use crate::dataplane::DataPlane;
use crate::error::DataError;

/// Options for [`EntityBatchLoader::load_actors`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorLoadOptions {
    /// Leave labels out of the load. Set when the caller already holds a
    /// request-wide [`LabelSet`].
    pub skip_labels: bool,
}

impl ActorLoadOptions {
    /// Skip the label read
    pub fn skip_labels() -> Self {
        Self { skip_labels: true }
    }
}

/// Batched loads of actors, posts, reposts, generators and lists.
///
/// Each load deduplicates its ids, reads once per id set, and omits ids that
/// do not exist or are hidden by moderation.
#[derive(Debug, Clone)]
pub struct EntityBatchLoader<D> {
    data: D,
    overlay: ViewerOverlayResolver<D>,
    display_name_max_bytes: usize,
}

impl<D: DataPlane> EntityBatchLoader<D> {
    pub fn new(data: D, options: &PipelineOptions) -> Self {
        Self {
            overlay: ViewerOverlayResolver::new(data.clone()),
            data,
            display_name_max_bytes: options.display_name_max_bytes,
        }
    }

    /// The underlying data plane
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Load actors with their viewer overlay and mute-list summary.
    ///
    /// Taken-down and deactivated accounts are absent from the result.
    /// Display names are cut to the configured byte limit on a character
    /// boundary.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = dids.len()))
    )]
    pub async fn load_actors(
        &self,
        dids: &[Did],
        viewer: Option<&Did>,
        opts: ActorLoadOptions,
    ) -> Result<HashMap<Did, ActorInfo>, DataError> {
        let dids = dedup(dids);
        if dids.is_empty() {
            return Ok(HashMap::new());
        }

        let labels = async {
            if opts.skip_labels {
                Ok(LabelSet::default())
            } else {
                LabelSet::fetch(&self.data, dids.iter().map(|d| SmolStr::from(d.clone()))).await
            }
        };
        let (rows, overlays, labels) = tokio::try_join!(
            self.data.actors(&dids),
            self.overlay.resolve(&dids, viewer),
            labels,
        )?;

        let list_uris = dedup(overlays.values().filter_map(|o| o.muted_by_list.as_ref()));
        let lists = self.load_lists(&list_uris, viewer).await?;

        let actors = rows
            .into_iter()
            .filter(|row| row.is_visible())
            .map(|row| {
                let overlay = overlays.get(&row.did).cloned();
                let muted_by_list = overlay
                    .as_ref()
                    .and_then(|o| o.muted_by_list.as_ref())
                    .and_then(|uri| lists.get(uri).cloned());
                let actor_labels =
                    (!opts.skip_labels).then(|| labels.get(row.did.as_str()).to_vec());
                let display_name = row
                    .display_name
                    .as_deref()
                    .map(|name| truncate_utf8(name, self.display_name_max_bytes).to_string());
                let info = ActorInfo {
                    handle: row
                        .handle
                        .unwrap_or_else(|| SmolStr::new_static(INVALID_HANDLE)),
                    display_name,
                    description: row.description,
                    avatar_cid: row.avatar_cid,
                    indexed_at: row.indexed_at,
                    overlay,
                    muted_by_list,
                    labels: actor_labels,
                    did: row.did,
                };
                (info.did.clone(), info)
            })
            .collect();
        Ok(actors)
    }

    /// Load posts with viewer like/repost state.
    ///
    /// Posts that are taken down, or whose author is taken down or
    /// deactivated, are absent from the result.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = uris.len()))
    )]
    pub async fn load_content(
        &self,
        uris: &[AtUri],
        viewer: Option<&Did>,
    ) -> Result<HashMap<AtUri, ContentInfo>, DataError> {
        let uris = dedup(uris);
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<_> = self
            .data
            .posts(&uris, viewer)
            .await?
            .into_iter()
            .filter(|row| !row.taken_down)
            .collect();

        let live = self
            .live_accounts(rows.iter().map(|row| row.uri.authority()))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| live.contains(row.uri.authority()))
            .map(|row| (row.uri.clone(), ContentInfo::from(row)))
            .collect())
    }

    /// Load repost records
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = uris.len()))
    )]
    pub async fn load_reposts(
        &self,
        uris: &[AtUri],
    ) -> Result<HashMap<AtUri, RepostInfo>, DataError> {
        let uris = dedup(uris);
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .data
            .reposts(&uris)
            .await?
            .into_iter()
            .map(|row| (row.uri.clone(), RepostInfo::from(row)))
            .collect())
    }

    /// Load feed generators with viewer like state.
    ///
    /// Generators that are taken down, or whose creator is taken down or
    /// deactivated, are absent from the result.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = uris.len()))
    )]
    pub async fn load_feed_generators(
        &self,
        uris: &[AtUri],
        viewer: Option<&Did>,
    ) -> Result<HashMap<AtUri, FeedGenInfo>, DataError> {
        let uris = dedup(uris);
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<_> = self
            .data
            .feed_generators(&uris, viewer)
            .await?
            .into_iter()
            .filter(|row| !row.taken_down)
            .collect();
        let live = self
            .live_accounts(rows.iter().map(|row| row.uri.authority()))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| live.contains(row.uri.authority()))
            .map(|row| (row.uri.clone(), FeedGenInfo::from(row)))
            .collect())
    }

    /// Load list summaries with viewer mute/block state. Same visibility
    /// rules as generators.
    pub async fn load_lists(
        &self,
        uris: &[AtUri],
        viewer: Option<&Did>,
    ) -> Result<HashMap<AtUri, ListInfo>, DataError> {
        let uris = dedup(uris);
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<_> = self
            .data
            .lists(&uris, viewer)
            .await?
            .into_iter()
            .filter(|row| !row.taken_down)
            .collect();
        let live = self
            .live_accounts(rows.iter().map(|row| row.uri.authority()))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| live.contains(row.uri.authority()))
            .map(|row| (row.uri.clone(), ListInfo::from(row)))
            .collect())
    }

    /// Which of `dids` are neither taken down nor deactivated
    async fn live_accounts<'a>(
        &self,
        dids: impl IntoIterator<Item = &'a Did>,
    ) -> Result<HashSet<Did>, DataError> {
        let dids = dedup(dids);
        if dids.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self
            .data
            .actors(&dids)
            .await?
            .into_iter()
            .filter(|a| a.is_visible())
            .map(|a| a.did)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::{ActorRow, FeedGenRow, ListRow, MemoryDataPlane, PostRow};
    use chrono::Utc;
    use weft_common::{Cid, Label};

    const CID: &str = "bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm";

    fn did(s: &str) -> Did {
        Did::new(format!("did:plc:{s}")).unwrap()
    }

    fn post_uri(author: &str, rkey: &str) -> AtUri {
        AtUri::new(format!("at://did:plc:{author}/app.bsky.feed.post/{rkey}")).unwrap()
    }

    fn post(uri: AtUri) -> PostRow {
        let now = Utc::now();
        PostRow::new()
            .uri(uri)
            .cid(Cid::new(CID).unwrap())
            .record(&br#"{"text":"hi"}"#[..])
            .created_at(now)
            .indexed_at(now)
            .build()
    }

    fn loader(data: &MemoryDataPlane) -> EntityBatchLoader<MemoryDataPlane> {
        EntityBatchLoader::new(data.clone(), &PipelineOptions::default())
    }

    #[tokio::test]
    async fn empty_sets_make_no_calls() {
        let data = MemoryDataPlane::new();
        let loader = loader(&data);
        let viewer = did("viewer");
        assert!(
            loader
                .load_actors(&[], Some(&viewer), ActorLoadOptions::default())
                .await
                .unwrap()
                .is_empty()
        );
        assert!(loader.load_content(&[], Some(&viewer)).await.unwrap().is_empty());
        assert!(loader.load_reposts(&[]).await.unwrap().is_empty());
        assert!(loader.load_feed_generators(&[], None).await.unwrap().is_empty());
        assert!(loader.load_lists(&[], None).await.unwrap().is_empty());
        assert!(data.calls().is_empty());
    }

    #[tokio::test]
    async fn actors_batched_and_filtered() {
        let data = MemoryDataPlane::new();
        data.insert_actor(ActorRow::new().did(did("a")).handle("a.test").build());
        data.insert_actor(
            ActorRow::new()
                .did(did("gone"))
                .handle("gone.test")
                .taken_down(true)
                .build(),
        );
        data.insert_actor(ActorRow::new().did(did("nohandle")).build());
        data.insert_label(Label {
            src: did("labeler"),
            uri: "did:plc:a".into(),
            cid: None,
            val: "spam".into(),
            neg: false,
            cts: Utc::now(),
            exp: None,
        });

        let loader = loader(&data);
        let ids = [did("a"), did("gone"), did("a"), did("nohandle"), did("missing")];
        let out = loader
            .load_actors(&ids, None, ActorLoadOptions::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out.contains_key(&did("gone")));
        assert_eq!(out[&did("nohandle")].handle, INVALID_HANDLE);
        assert_eq!(out[&did("a")].labels.as_ref().unwrap().len(), 1);
        assert!(out[&did("a")].overlay.is_none());
        assert_eq!(data.call_count("actors"), 1);
        let actors_call = data.calls().into_iter().find(|c| c.method == "actors");
        assert_eq!(actors_call.unwrap().batch, 4);

        data.reset_calls();
        let out = loader
            .load_actors(&[did("a")], None, ActorLoadOptions::skip_labels())
            .await
            .unwrap();
        assert!(out[&did("a")].labels.is_none());
        assert_eq!(data.call_count("labels"), 0);
    }

    #[tokio::test]
    async fn display_name_cut_on_char_boundary() {
        let data = MemoryDataPlane::new();
        let name = format!("{}x", "語".repeat(23));
        data.insert_actor(
            ActorRow::new()
                .did(did("a"))
                .handle("a.test")
                .display_name(name)
                .build(),
        );
        let out = loader(&data)
            .load_actors(&[did("a")], None, ActorLoadOptions::skip_labels())
            .await
            .unwrap();
        let shown = out[&did("a")].display_name.as_deref().unwrap();
        assert_eq!(shown.len(), 63);
        assert!(shown.chars().all(|c| c == '語'));
    }

    #[tokio::test]
    async fn mute_list_summary_loaded_with_actor() {
        let data = MemoryDataPlane::new();
        let viewer = did("viewer");
        let list = AtUri::new("at://did:plc:mod/app.bsky.graph.list/spam").unwrap();
        data.insert_actor(ActorRow::new().did(did("e")).handle("e.test").build());
        data.insert_actor(ActorRow::new().did(did("mod")).handle("mod.test").build());
        data.insert_list(
            ListRow::new()
                .uri(list.clone())
                .cid(Cid::new(CID).unwrap())
                .name("spammers")
                .purpose("app.bsky.graph.defs#modlist")
                .indexed_at(Utc::now())
                .build(),
        );
        data.subscribe_mute_list(viewer.clone(), list.clone());
        data.insert_list_item(list.clone(), did("e"));

        let out = loader(&data)
            .load_actors(&[did("e")], Some(&viewer), ActorLoadOptions::skip_labels())
            .await
            .unwrap();
        let actor = &out[&did("e")];
        assert!(actor.is_muted());
        let summary = actor.muted_by_list.as_ref().unwrap();
        assert_eq!(summary.name, "spammers");
        assert!(summary.viewer_muted);
    }

    #[tokio::test]
    async fn content_rechecks_author_takedown() {
        let data = MemoryDataPlane::new();
        data.insert_actor(ActorRow::new().did(did("a")).handle("a.test").build());
        data.insert_actor(
            ActorRow::new()
                .did(did("b"))
                .handle("b.test")
                .soft_deleted(true)
                .build(),
        );
        data.insert_post(post(post_uri("a", "1")));
        data.insert_post(post(post_uri("b", "1")));
        let mut hidden = post(post_uri("a", "2"));
        hidden.taken_down = true;
        data.insert_post(hidden);

        let ids = [
            post_uri("a", "1"),
            post_uri("b", "1"),
            post_uri("a", "2"),
            post_uri("a", "1"),
        ];
        let out = loader(&data).load_content(&ids, None).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&post_uri("a", "1")));
        assert_eq!(out[&post_uri("a", "1")].author, did("a"));
        assert_eq!(data.call_count("posts"), 1);
        assert_eq!(data.call_count("actors"), 1);
    }

    #[tokio::test]
    async fn generators_and_lists_recheck_creator() {
        let data = MemoryDataPlane::new();
        data.insert_actor(ActorRow::new().did(did("ok")).handle("ok.test").build());
        data.insert_actor(
            ActorRow::new()
                .did(did("banned"))
                .handle("banned.test")
                .taken_down(true)
                .build(),
        );
        let generator = |author: &str, rkey: &str, taken_down: bool| {
            let uri = format!("at://did:plc:{author}/app.bsky.feed.generator/{rkey}");
            FeedGenRow::new()
                .uri(AtUri::new(uri).unwrap())
                .cid(Cid::new(CID).unwrap())
                .service_did(Did::new("did:web:feeds.test").unwrap())
                .display_name(rkey)
                .indexed_at(Utc::now())
                .taken_down(taken_down)
                .build()
        };
        let live = generator("ok", "hot", false);
        let pulled = generator("ok", "pulled", true);
        let orphan = generator("banned", "hot", false);
        for row in [&live, &pulled, &orphan] {
            data.insert_feed_generator(row.clone());
        }
        let list = |author: &str| {
            let uri = format!("at://did:plc:{author}/app.bsky.graph.list/l");
            ListRow::new()
                .uri(AtUri::new(uri).unwrap())
                .cid(Cid::new(CID).unwrap())
                .name("l")
                .purpose("app.bsky.graph.defs#curatelist")
                .indexed_at(Utc::now())
                .build()
        };
        data.insert_list(list("ok"));
        data.insert_list(list("banned"));

        let loader = loader(&data);
        let gens = loader
            .load_feed_generators(
                &[live.uri.clone(), pulled.uri.clone(), orphan.uri.clone()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(gens.len(), 1);
        assert!(gens.contains_key(&live.uri));

        let lists = loader
            .load_lists(&[list("ok").uri, list("banned").uri], None)
            .await
            .unwrap();
        assert_eq!(lists.len(), 1);
        assert!(lists.contains_key(&list("ok").uri));
    }
}
