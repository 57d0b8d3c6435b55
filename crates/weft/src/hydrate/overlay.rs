use std::collections::HashMap;
use weft_common::{AtUri, Did};

use super::dedup;
use crate::dataplane::DataPlane;
use crate::error::DataError;

/// How one account relates to the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipOverlay {
    /// The viewer's block record against this account
    pub blocking: Option<AtUri>,
    /// This account blocks the viewer
    pub blocked_by: bool,
    /// The viewer's follow record for this account
    pub following: Option<AtUri>,
    /// This account's follow record for the viewer
    pub followed_by: Option<AtUri>,
    /// Muted directly by the viewer
    pub muted: bool,
    /// Mute list through which the viewer mutes this account
    pub muted_by_list: Option<AtUri>,
}

impl RelationshipOverlay {
    /// Block in either direction
    pub fn has_block(&self) -> bool {
        self.blocking.is_some() || self.blocked_by
    }

    /// Muted directly or through a list
    pub fn is_muted(&self) -> bool {
        self.muted || self.muted_by_list.is_some()
    }
}

/// Resolves [`RelationshipOverlay`]s for a set of accounts.
///
/// Blocks, follows, mutes and list mutes are read concurrently, one batched
/// call each, both directions at once.
#[derive(Debug, Clone)]
pub struct ViewerOverlayResolver<D> {
    data: D,
}

impl<D: DataPlane> ViewerOverlayResolver<D> {
    pub fn new(data: D) -> Self {
        Self { data }
    }

    /// Overlays for each of `actors`.
    ///
    /// Returns an empty map for a logged-out request. Makes no calls when
    /// `actors` holds nothing but the viewer.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = actors.len()))
    )]
    pub async fn resolve(
        &self,
        actors: &[Did],
        viewer: Option<&Did>,
    ) -> Result<HashMap<Did, RelationshipOverlay>, DataError> {
        let Some(viewer) = viewer else {
            return Ok(HashMap::new());
        };
        let mut overlays: HashMap<Did, RelationshipOverlay> = actors
            .iter()
            .map(|did| (did.clone(), RelationshipOverlay::default()))
            .collect();
        let subjects: Vec<Did> = dedup(actors.iter().filter(|d| *d != viewer));
        if subjects.is_empty() {
            return Ok(overlays);
        }

        let (blocks, follows, mutes, list_mutes) = tokio::try_join!(
            self.data.blocks(viewer, &subjects),
            self.data.follows(viewer, &subjects),
            self.data.mutes(viewer, &subjects),
            self.data.list_mutes(viewer, &subjects),
        )?;

        for block in blocks {
            if &block.creator == viewer {
                if let Some(o) = overlays.get_mut(&block.subject) {
                    o.blocking = Some(block.uri);
                }
            } else if &block.subject == viewer {
                if let Some(o) = overlays.get_mut(&block.creator) {
                    o.blocked_by = true;
                }
            }
        }
        for follow in follows {
            if &follow.creator == viewer {
                if let Some(o) = overlays.get_mut(&follow.subject) {
                    o.following = Some(follow.uri);
                }
            } else if &follow.subject == viewer {
                if let Some(o) = overlays.get_mut(&follow.creator) {
                    o.followed_by = Some(follow.uri);
                }
            }
        }
        for did in mutes {
            if let Some(o) = overlays.get_mut(&did) {
                o.muted = true;
            }
        }
        // lowest list uri wins when several lists mute the same account
        for row in list_mutes {
            if let Some(o) = overlays.get_mut(&row.subject) {
                match &o.muted_by_list {
                    Some(existing) if existing <= &row.list => {}
                    _ => o.muted_by_list = Some(row.list),
                }
            }
        }
        Ok(overlays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::memory::DataCall;
    use crate::dataplane::{BlockRow, FollowRow, MemoryDataPlane};

    fn did(s: &str) -> Did {
        Did::new(format!("did:plc:{s}")).unwrap()
    }

    fn uri(s: &str) -> AtUri {
        AtUri::new(s).unwrap()
    }

    #[tokio::test]
    async fn empty_set_makes_no_calls() {
        let data = MemoryDataPlane::new();
        let resolver = ViewerOverlayResolver::new(data.clone());
        let out = resolver.resolve(&[], Some(&did("viewer"))).await.unwrap();
        assert!(out.is_empty());
        let out = resolver
            .resolve(&[did("viewer")], Some(&did("viewer")))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        let out = resolver.resolve(&[did("a")], None).await.unwrap();
        assert!(out.is_empty());
        assert!(data.calls().is_empty());
    }

    #[tokio::test]
    async fn one_call_per_relation() {
        let data = MemoryDataPlane::new();
        let viewer = did("viewer");
        data.insert_block(BlockRow {
            uri: uri("at://did:plc:viewer/app.bsky.graph.block/1"),
            creator: viewer.clone(),
            subject: did("a"),
        });
        data.insert_block(BlockRow {
            uri: uri("at://did:plc:b/app.bsky.graph.block/1"),
            creator: did("b"),
            subject: viewer.clone(),
        });
        data.insert_follow(FollowRow {
            uri: uri("at://did:plc:c/app.bsky.graph.follow/1"),
            creator: did("c"),
            subject: viewer.clone(),
        });
        data.insert_mute(viewer.clone(), did("d"));
        let list = uri("at://did:plc:mod/app.bsky.graph.list/spam");
        data.subscribe_mute_list(viewer.clone(), list.clone());
        data.insert_list_item(list.clone(), did("e"));

        let resolver = ViewerOverlayResolver::new(data.clone());
        let actors = [did("a"), did("b"), did("c"), did("d"), did("e")];
        let out = resolver.resolve(&actors, Some(&viewer)).await.unwrap();

        assert!(out[&did("a")].blocking.is_some());
        assert!(!out[&did("a")].blocked_by);
        assert!(out[&did("b")].blocked_by);
        assert!(out[&did("b")].has_block());
        assert!(out[&did("c")].followed_by.is_some());
        assert!(out[&did("c")].following.is_none());
        assert!(out[&did("d")].muted);
        assert_eq!(out[&did("e")].muted_by_list.as_ref(), Some(&list));
        assert!(out[&did("e")].is_muted());
        assert!(!out[&did("e")].muted);

        for method in ["blocks", "follows", "mutes", "list_mutes"] {
            assert_eq!(data.call_count(method), 1, "{method}");
        }
    }

    #[tokio::test]
    async fn repeated_actors_read_once() {
        let data = MemoryDataPlane::new();
        let viewer = did("viewer");
        data.insert_mute(viewer.clone(), did("a"));

        let resolver = ViewerOverlayResolver::new(data.clone());
        let actors = [did("a"), did("b"), did("a"), viewer.clone(), did("b")];
        let out = resolver.resolve(&actors, Some(&viewer)).await.unwrap();

        assert_eq!(out.len(), 3);
        assert!(out[&did("a")].muted);
        let mut calls = data.calls();
        calls.sort_by_key(|call| call.method);
        assert_eq!(
            calls,
            ["blocks", "follows", "list_mutes", "mutes"]
                .into_iter()
                .map(|method| DataCall { method, batch: 2 })
                .collect::<Vec<_>>()
        );
    }
}
