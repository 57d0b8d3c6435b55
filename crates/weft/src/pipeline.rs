//! The feed pipeline: skeleton, hydration, rules, presentation.
//!
//! Each stage reads the previous stage's output and produces a new value;
//! nothing is patched in place. Per-item problems drop the item and are
//! counted in [`OmittedCounts`]; request-level problems end the request with
//! a [`FeedError`].

use http::{HeaderMap, HeaderName, HeaderValue, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::{SmolStr, format_smolstr};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use weft_common::{AtUri, Did, HttpClient};

use crate::config::{FeedRequest, PipelineOptions};
use crate::dataplane::DataPlane;
use crate::error::{FeedError, Result};
use crate::hydrate::{
    ActorInfo, ActorLoadOptions, ContentInfo, EmbedResolver, EntityBatchLoader, LabelSet,
    RepostInfo, ResolvedEmbeds,
};
use crate::identity::IdentityResolver;
use crate::images::ImageUriSigner;
use crate::present::Presenter;
use crate::skeleton::{Skeleton, SkeletonItem, SkeletonProvider};
use crate::views::{BlockedPost, FeedReason, FeedViewPost, NotFoundPost, ReplyPost, ReplyRef};

/// `server-timing` response header
pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// The getFeed response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponse {
    /// Generator fields the pipeline does not interpret, passed through
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
    pub feed: Vec<FeedViewPost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<SmolStr>,
}

/// How many skeleton items were left out, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OmittedCounts {
    /// Deleted, taken down, or otherwise missing after hydration
    pub not_hydrated: usize,
    /// A block in either direction with the author or reposter
    pub blocked: usize,
    /// Author or reposter muted by the viewer
    pub muted: usize,
    /// Hydrated but could not be rendered
    pub malformed: usize,
}

impl OmittedCounts {
    pub fn total(&self) -> usize {
        self.not_hydrated + self.blocked + self.muted + self.malformed
    }
}

/// Wall time spent per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub skeleton: Duration,
    pub hydration: Duration,
}

impl StageTimings {
    /// `skeleton;dur=<ms>, hydration;dur=<ms>`
    pub fn server_timing(&self) -> SmolStr {
        format_smolstr!(
            "skeleton;dur={}, hydration;dur={}",
            self.skeleton.as_millis(),
            self.hydration.as_millis()
        )
    }
}

/// A completed request
#[derive(Debug, Clone)]
pub struct FeedOutcome {
    pub response: FeedResponse,
    /// Headers for the client response: server timing, and the generator's
    /// content language when it sent one
    pub headers: HeaderMap,
    pub omitted: OmittedCounts,
    pub timings: StageTimings,
}

/// Everything hydration learned about one page of skeleton items
#[derive(Debug, Clone, Default)]
pub struct Hydration {
    /// Skeleton posts and their reply ancestors
    pub contents: HashMap<AtUri, ContentInfo>,
    pub reposts: HashMap<AtUri, RepostInfo>,
    pub actors: HashMap<Did, ActorInfo>,
    pub labels: LabelSet,
    pub embeds: ResolvedEmbeds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    NotHydrated,
    Blocked,
    Muted,
}

/// Items that survived the rules stage, in skeleton order
#[derive(Debug, Clone, Default)]
pub struct Filtered {
    pub items: Vec<SkeletonItem>,
    pub omitted: OmittedCounts,
}

/// Assembles feeds from a generator skeleton.
///
/// [`FeedPipeline::new`] wires every stage from the backends. The builder
/// takes stages that were built elsewhere, for example to share one
/// [`EntityBatchLoader`] between several pipelines. The stages should be
/// built with the same options the pipeline gets.
#[derive(bon::Builder)]
pub struct FeedPipeline<D, I, H> {
    #[builder(into, default = Arc::new(PipelineOptions::default()))]
    options: Arc<PipelineOptions>,
    skeletons: SkeletonProvider<D, I, H>,
    loader: EntityBatchLoader<D>,
    embeds: EmbedResolver<D>,
    presenter: Presenter,
}

impl<D, I, H> FeedPipeline<D, I, H>
where
    D: DataPlane,
    I: IdentityResolver + Sync,
    H: HttpClient + Sync,
{
    /// Wire every stage from the backends
    pub fn new(
        data: D,
        identity: I,
        http: H,
        signer: impl ImageUriSigner + 'static,
        options: PipelineOptions,
    ) -> Self {
        let options = Arc::new(options);
        let loader = EntityBatchLoader::new(data, &options);
        let presenter = Presenter::new(signer);
        Self::builder()
            .skeletons(SkeletonProvider::new(
                loader.clone(),
                identity,
                http,
                options.clone(),
            ))
            .embeds(EmbedResolver::new(loader.clone(), presenter.clone()))
            .loader(loader)
            .presenter(presenter)
            .options(options)
            .build()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline for one request
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(feed = %request.feed))
    )]
    pub async fn get_feed(&self, request: FeedRequest) -> Result<FeedOutcome> {
        let limit = self.options.clamp_limit(request.limit);
        let viewer = request.viewer.as_ref();

        let started = Instant::now();
        let skeleton = self.skeletons.get_skeleton(&request, limit).await?;
        let skeleton_elapsed = started.elapsed();

        let started = Instant::now();
        let hydration = self.hydrate(&skeleton.items, viewer).await?;
        let hydration_elapsed = started.elapsed();

        let filtered = apply_rules(&skeleton.items, &hydration);
        let timings = StageTimings {
            skeleton: skeleton_elapsed,
            hydration: hydration_elapsed,
        };
        Ok(self.present(skeleton, filtered, &hydration, limit, timings))
    }

    /// [`get_feed`](Self::get_feed), abandoned with [`FeedError::Cancelled`]
    /// as soon as `cancel` fires
    pub async fn get_feed_cancellable(
        &self,
        request: FeedRequest,
        cancel: &CancellationToken,
    ) -> Result<FeedOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("feed request cancelled");
                Err(FeedError::Cancelled)
            }
            outcome = self.get_feed(request) => outcome,
        }
    }

    /// Hydrate a page of skeleton items.
    ///
    /// Posts and reposts load first, since reply ancestors are only known
    /// from the stored posts. Actors, ancestor posts and labels then load
    /// concurrently, and embeds are resolved last over every loaded post.
    pub async fn hydrate(&self, items: &[SkeletonItem], viewer: Option<&Did>) -> Result<Hydration> {
        if items.is_empty() {
            return Ok(Hydration::default());
        }
        let post_uris: Vec<AtUri> = items.iter().map(|i| i.post.clone()).collect();
        let repost_uris: Vec<AtUri> = items.iter().filter_map(|i| i.repost.clone()).collect();

        let (mut contents, reposts) = tokio::try_join!(
            self.loader.load_content(&post_uris, viewer),
            self.loader.load_reposts(&repost_uris),
        )?;

        let ancestor_uris: Vec<AtUri> = contents
            .values()
            .filter_map(|c| c.reply_refs())
            .flat_map(|(root, parent)| [root, parent])
            .filter(|uri| !contents.contains_key(*uri))
            .cloned()
            .collect();

        let actor_ids: Vec<Did> = items
            .iter()
            .map(|i| i.author().clone())
            .chain(reposts.values().map(|r| r.originator.clone()))
            .chain(ancestor_uris.iter().map(|u| u.authority().clone()))
            .collect();
        let label_subjects: Vec<SmolStr> = actor_ids
            .iter()
            .map(|d| SmolStr::from(d.clone()))
            .chain(post_uris.iter().map(|u| SmolStr::from(u.clone())))
            .chain(ancestor_uris.iter().map(|u| SmolStr::from(u.clone())))
            .collect();

        let (ancestors, actors, labels) = tokio::try_join!(
            self.loader.load_content(&ancestor_uris, viewer),
            self.loader
                .load_actors(&actor_ids, viewer, ActorLoadOptions::skip_labels()),
            LabelSet::fetch(self.loader.data(), label_subjects),
        )?;
        contents.extend(ancestors);

        let embeds = self
            .embeds
            .resolve(contents.values(), viewer, &actors, &labels)
            .await;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            posts = contents.len(),
            actors = actors.len(),
            embeds = embeds.len(),
            "hydrated"
        );

        Ok(Hydration {
            contents,
            reposts,
            actors,
            labels,
            embeds,
        })
    }

    fn present(
        &self,
        skeleton: Skeleton,
        filtered: Filtered,
        hydration: &Hydration,
        limit: u32,
        timings: StageTimings,
    ) -> FeedOutcome {
        let mut omitted = filtered.omitted;
        let mut feed = Vec::new();
        for item in &filtered.items {
            if feed.len() >= limit as usize {
                break;
            }
            match self.feed_view_post(item, hydration) {
                Some(view) => feed.push(view),
                None => omitted.malformed += 1,
            }
        }

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&timings.server_timing()) {
            headers.insert(SERVER_TIMING, value);
        }
        if let Some(lang) = skeleton.content_language {
            headers.insert(header::CONTENT_LANGUAGE, lang);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            returned = feed.len(),
            not_hydrated = omitted.not_hydrated,
            blocked = omitted.blocked,
            muted = omitted.muted,
            malformed = omitted.malformed,
            "feed assembled"
        );

        FeedOutcome {
            response: FeedResponse {
                passthrough: skeleton.passthrough,
                feed,
                cursor: skeleton.cursor,
            },
            headers,
            omitted,
            timings,
        }
    }

    fn feed_view_post(&self, item: &SkeletonItem, h: &Hydration) -> Option<FeedViewPost> {
        let content = h.contents.get(&item.post)?;
        let author = h.actors.get(&content.author)?;
        let embed = h.embeds.get(&content.uri).cloned();
        let post = match self.presenter.post_view(content, author, embed, &h.labels) {
            Ok(post) => post,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "dropping unrenderable post");
                return None;
            }
        };

        let reply = content.reply_refs().map(|(root, parent)| ReplyRef {
            root: self.reply_post(root, h),
            parent: self.reply_post(parent, h),
        });

        let reason = match &item.repost {
            Some(uri) => {
                let repost = h.reposts.get(uri)?;
                let by = h.actors.get(&repost.originator)?;
                Some(FeedReason::Repost {
                    by: self.presenter.profile_basic(by, &h.labels),
                    indexed_at: repost.indexed_at,
                })
            }
            None => None,
        };

        Some(FeedViewPost {
            post,
            reply,
            reason,
            feed_context: item.feed_context.clone(),
        })
    }

    fn reply_post(&self, uri: &AtUri, h: &Hydration) -> ReplyPost {
        let not_found = || ReplyPost::NotFound(NotFoundPost::new(uri.clone()));
        let Some(content) = h.contents.get(uri) else {
            return not_found();
        };
        let Some(author) = h.actors.get(&content.author) else {
            return not_found();
        };
        if author.has_block() {
            return ReplyPost::Blocked(BlockedPost {
                uri: uri.clone(),
                blocked: true,
                author: self.presenter.blocked_author(&content.author, Some(author)),
            });
        }
        let embed = h.embeds.get(uri).cloned();
        match self.presenter.post_view(content, author, embed, &h.labels) {
            Ok(view) => ReplyPost::Post(Box::new(view)),
            Err(_) => not_found(),
        }
    }
}

/// Decide which skeleton items may be shown.
///
/// Dropped: items whose post, repost or author did not hydrate; items whose
/// author or reposter has a block in either direction with the viewer;
/// replies to someone the viewer blocks; items whose author or reposter
/// the viewer mutes. Order is preserved.
pub fn apply_rules(items: &[SkeletonItem], hydration: &Hydration) -> Filtered {
    let mut filtered = Filtered::default();
    for item in items {
        let verdict = judge(item, hydration);
        #[cfg(feature = "tracing")]
        {
            if verdict != Verdict::Keep {
                tracing::debug!(post = %item.post, ?verdict, "skeleton item dropped");
            }
        }
        match verdict {
            Verdict::Keep => filtered.items.push(item.clone()),
            Verdict::NotHydrated => filtered.omitted.not_hydrated += 1,
            Verdict::Blocked => filtered.omitted.blocked += 1,
            Verdict::Muted => filtered.omitted.muted += 1,
        }
    }
    filtered
}

fn judge(item: &SkeletonItem, h: &Hydration) -> Verdict {
    let Some(content) = h.contents.get(&item.post) else {
        return Verdict::NotHydrated;
    };
    let Some(author) = h.actors.get(&content.author) else {
        return Verdict::NotHydrated;
    };
    let originator = match &item.repost {
        Some(uri) => {
            let Some(originator) = h
                .reposts
                .get(uri)
                .and_then(|r| h.actors.get(&r.originator))
            else {
                return Verdict::NotHydrated;
            };
            Some(originator)
        }
        None => None,
    };

    if author.has_block() || originator.is_some_and(|o| o.has_block()) {
        return Verdict::Blocked;
    }
    if let Some((root, parent)) = content.reply_refs() {
        let blocks_ancestor = [root, parent].into_iter().any(|uri| {
            h.actors
                .get(uri.authority())
                .is_some_and(|a| a.is_blocked_by_viewer())
        });
        if blocks_ancestor {
            return Verdict::Blocked;
        }
    }
    if author.is_muted() || originator.is_some_and(|o| o.is_muted()) {
        return Verdict::Muted;
    }
    Verdict::Keep
}
