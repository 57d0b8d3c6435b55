use smol_str::SmolStr;
use std::collections::HashMap;
use weft_common::{AtUri, Did};

use super::{ActorInfo, ActorLoadOptions, ContentInfo, EntityBatchLoader, LabelSet, dedup};
use crate::dataplane::DataPlane;
use crate::present::Presenter;
use crate::records::{MediaEmbed, PostEmbed, parse_embed};
use crate::views::{
    EmbedView, EmbeddedRecord, MediaView, RecordView, RecordWithMediaView, ViewBlocked,
    ViewNotFound,
};

const POST_COLLECTION: &str = "app.bsky.feed.post";
const GENERATOR_COLLECTION: &str = "app.bsky.feed.generator";
const LIST_COLLECTION: &str = "app.bsky.graph.list";

/// Resolved embeds keyed by the uri of the post that carries them
pub type ResolvedEmbeds = HashMap<AtUri, EmbedView>;

/// Resolves post embeds one level deep.
///
/// Referenced records are partitioned by collection and loaded with one
/// batched call per partition, concurrently. Their authors and creators are
/// then loaded in a single actor batch. An embedded post's own embed is not
/// followed.
///
/// Failures never propagate: a reference that cannot be loaded renders as
/// not-found, and only that reference is affected.
#[derive(Debug, Clone)]
pub struct EmbedResolver<D> {
    loader: EntityBatchLoader<D>,
    presenter: Presenter,
}

struct Targets {
    posts: Vec<AtUri>,
    generators: Vec<AtUri>,
    lists: Vec<AtUri>,
}

impl Targets {
    fn partition<'a>(uris: impl IntoIterator<Item = &'a AtUri>) -> Self {
        let mut targets = Targets {
            posts: Vec::new(),
            generators: Vec::new(),
            lists: Vec::new(),
        };
        for uri in uris {
            match uri.collection() {
                POST_COLLECTION => targets.posts.push(uri.clone()),
                GENERATOR_COLLECTION => targets.generators.push(uri.clone()),
                LIST_COLLECTION => targets.lists.push(uri.clone()),
                _ => {}
            }
        }
        targets.posts = dedup(&targets.posts);
        targets.generators = dedup(&targets.generators);
        targets.lists = dedup(&targets.lists);
        targets
    }
}

impl<D: DataPlane> EmbedResolver<D> {
    pub fn new(loader: EntityBatchLoader<D>, presenter: Presenter) -> Self {
        Self { loader, presenter }
    }

    /// Resolve the embeds of every post in `hosts`.
    ///
    /// `actors` and `labels` are what the caller already hydrated for this
    /// request. Authors and creators found there are reused as is, so every
    /// view of an actor carries the same relationship overlay. Only the rest
    /// are loaded, in one batch. Label subjects the set does not cover are
    /// fetched in one supplementary call and merged into a new set.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all)
    )]
    pub async fn resolve<'a>(
        &self,
        hosts: impl IntoIterator<Item = &'a ContentInfo>,
        viewer: Option<&Did>,
        actors: &HashMap<Did, ActorInfo>,
        labels: &LabelSet,
    ) -> ResolvedEmbeds {
        let parsed: Vec<(&ContentInfo, PostEmbed)> = hosts
            .into_iter()
            .filter_map(|host| parse_embed(&host.body).map(|embed| (host, embed)))
            .collect();
        if parsed.is_empty() {
            return ResolvedEmbeds::new();
        }

        let targets = Targets::partition(parsed.iter().filter_map(|(_, e)| e.target()).map(|r| &r.uri));
        let data = self.loader.data();

        let (posts, generators, lists) = tokio::join!(
            self.loader.load_content(&targets.posts, viewer),
            self.loader.load_feed_generators(&targets.generators, viewer),
            self.loader.load_lists(&targets.lists, viewer),
        );
        let posts = posts.unwrap_or_else(|_e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "embedded post load failed");
            HashMap::new()
        });
        let generators = generators.unwrap_or_else(|_e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "embedded generator load failed");
            HashMap::new()
        });
        let lists = lists.unwrap_or_else(|_e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "embedded list load failed");
            HashMap::new()
        });

        let actor_ids: Vec<Did> = posts
            .values()
            .map(|p| &p.author)
            .chain(generators.values().map(|g| &g.creator))
            .chain(lists.values().map(|l| &l.creator))
            .filter(|did| !actors.contains_key(*did))
            .cloned()
            .collect();
        let subjects = labels.missing(
            posts
                .keys()
                .chain(generators.keys())
                .chain(lists.keys())
                .map(|uri| SmolStr::from(uri.clone()))
                .chain(actor_ids.iter().map(|did| SmolStr::from(did.clone()))),
        );

        let (loaded, extra) = tokio::join!(
            self.loader
                .load_actors(&actor_ids, viewer, ActorLoadOptions::skip_labels()),
            LabelSet::fetch(data, subjects),
        );
        let loaded = loaded.unwrap_or_else(|_e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "embedded author load failed");
            HashMap::new()
        });
        let labels = match extra {
            Ok(extra) => labels.merged(&extra),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "supplementary label load failed");
                labels.clone()
            }
        };

        let resolved = Resolved {
            presenter: &self.presenter,
            posts: &posts,
            generators: &generators,
            lists: &lists,
            known: actors,
            loaded: &loaded,
            labels: &labels,
        };
        parsed
            .into_iter()
            .filter_map(|(host, embed)| {
                resolved
                    .embed_view(&host.author, embed)
                    .map(|view| (host.uri.clone(), view))
            })
            .collect()
    }
}

struct Resolved<'a> {
    presenter: &'a Presenter,
    posts: &'a HashMap<AtUri, ContentInfo>,
    generators: &'a HashMap<AtUri, super::FeedGenInfo>,
    lists: &'a HashMap<AtUri, super::ListInfo>,
    known: &'a HashMap<Did, ActorInfo>,
    loaded: &'a HashMap<Did, ActorInfo>,
    labels: &'a LabelSet,
}

impl Resolved<'_> {
    fn actor(&self, did: &Did) -> Option<&ActorInfo> {
        self.known.get(did).or_else(|| self.loaded.get(did))
    }

    fn embed_view(&self, host_author: &Did, embed: PostEmbed) -> Option<EmbedView> {
        let view = match embed {
            PostEmbed::Images { images } => {
                EmbedView::Images(self.presenter.images(host_author, &images))
            }
            PostEmbed::External { external } => {
                EmbedView::External(self.presenter.external(host_author, &external))
            }
            PostEmbed::Record { record } => EmbedView::Record(RecordView {
                record: self.record(&record.uri),
            }),
            PostEmbed::RecordWithMedia { record, media } => {
                let media = match media {
                    MediaEmbed::Images { images } => {
                        MediaView::Images(self.presenter.images(host_author, &images))
                    }
                    MediaEmbed::External { external } => {
                        MediaView::External(self.presenter.external(host_author, &external))
                    }
                    MediaEmbed::Unsupported => return None,
                };
                EmbedView::RecordWithMedia(RecordWithMediaView {
                    record: RecordView {
                        record: self.record(&record.record.uri),
                    },
                    media,
                })
            }
        };
        Some(view)
    }

    fn record(&self, uri: &AtUri) -> EmbeddedRecord {
        let not_found = || EmbeddedRecord::NotFound(ViewNotFound::new(uri.clone()));
        match uri.collection() {
            POST_COLLECTION => {
                let Some(post) = self.posts.get(uri) else {
                    return not_found();
                };
                let Some(author) = self.actor(&post.author) else {
                    return not_found();
                };
                if author.has_block() {
                    return EmbeddedRecord::Blocked(ViewBlocked {
                        uri: uri.clone(),
                        blocked: true,
                        author: self.presenter.blocked_author(&post.author, Some(author)),
                    });
                }
                match self.presenter.view_record(post, author, self.labels) {
                    Ok(view) => EmbeddedRecord::Record(Box::new(view)),
                    Err(_e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %_e, "embedded post not renderable");
                        not_found()
                    }
                }
            }
            GENERATOR_COLLECTION => self
                .generators
                .get(uri)
                .and_then(|g| Some((g, self.actor(&g.creator)?)))
                .map(|(g, creator)| {
                    EmbeddedRecord::Generator(Box::new(
                        self.presenter.generator_view(g, creator, self.labels),
                    ))
                })
                .unwrap_or_else(not_found),
            LIST_COLLECTION => self
                .lists
                .get(uri)
                .and_then(|l| Some((l, self.actor(&l.creator)?)))
                .map(|(l, creator)| {
                    EmbeddedRecord::List(Box::new(self.presenter.list_view(l, creator, self.labels)))
                })
                .unwrap_or_else(not_found),
            _ => not_found(),
        }
    }
}
