//! Turning hydrated snapshots into views

use serde_json::Value;
use smol_str::SmolStr;
use std::sync::Arc;
use weft_common::{AtUri, Did};

use crate::hydrate::{ActorInfo, ContentInfo, FeedGenInfo, LabelSet, ListInfo};
use crate::images::{ImagePreset, ImageUriSigner};
use crate::records::{ExternalRecord, ImageRecord};
use crate::views::{
    ActorViewerState, BlockedAuthor, EmbedView, ExternalView, GeneratorView, GeneratorViewerState,
    ImagesView, ListView, ListViewBasic, PostView, PostViewerState, ProfileViewBasic, ViewExternal,
    ViewImage, ViewRecord,
};

/// A single item could not be rendered
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PresentError {
    /// The stored record body is not valid JSON
    #[error("stored record for {uri} is not valid JSON: {reason}")]
    #[diagnostic(code(weft::present::invalid_record))]
    InvalidRecord { uri: AtUri, reason: SmolStr },
}

/// Builds views from hydrated data. Holds no per-request state.
#[derive(Clone)]
pub struct Presenter {
    signer: Arc<dyn ImageUriSigner>,
}

impl std::fmt::Debug for Presenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presenter").finish_non_exhaustive()
    }
}

impl Presenter {
    pub fn new(signer: impl ImageUriSigner + 'static) -> Self {
        Self {
            signer: Arc::new(signer),
        }
    }

    pub fn image_uri(&self, preset: ImagePreset, did: &Did, cid: &weft_common::Cid) -> String {
        self.signer.signed_uri(preset, did, cid)
    }

    /// Viewer state for an actor, `None` on logged-out requests
    pub fn actor_viewer_state(&self, actor: &ActorInfo) -> Option<ActorViewerState> {
        let overlay = actor.overlay.as_ref()?;
        Some(ActorViewerState {
            muted: overlay.is_muted(),
            muted_by_list: actor.muted_by_list.as_ref().map(|l| self.list_basic(l)),
            blocked_by: overlay.blocked_by,
            blocking: overlay.blocking.clone(),
            following: overlay.following.clone(),
            followed_by: overlay.followed_by.clone(),
        })
    }

    pub fn profile_basic(&self, actor: &ActorInfo, labels: &LabelSet) -> ProfileViewBasic {
        ProfileViewBasic {
            did: actor.did.clone(),
            handle: actor.handle.clone(),
            display_name: actor.display_name.clone(),
            avatar: actor
                .avatar_cid
                .as_ref()
                .map(|cid| self.image_uri(ImagePreset::Avatar, &actor.did, cid)),
            viewer: self.actor_viewer_state(actor),
            labels: actor
                .labels
                .clone()
                .unwrap_or_else(|| labels.get(actor.did.as_str()).to_vec()),
        }
    }

    /// Author stub for a blocked record. Only the block state is exposed.
    pub fn blocked_author(&self, did: &Did, actor: Option<&ActorInfo>) -> BlockedAuthor {
        BlockedAuthor {
            did: did.clone(),
            viewer: actor.and_then(|a| a.overlay.as_ref()).map(|o| ActorViewerState {
                blocked_by: o.blocked_by,
                blocking: o.blocking.clone(),
                ..Default::default()
            }),
        }
    }

    pub fn list_basic(&self, list: &ListInfo) -> ListViewBasic {
        ListViewBasic {
            uri: list.uri.clone(),
            cid: list.cid.clone(),
            name: list.name.clone(),
            purpose: list.purpose.clone(),
            avatar: list
                .avatar_cid
                .as_ref()
                .map(|cid| self.image_uri(ImagePreset::Avatar, &list.creator, cid)),
            indexed_at: Some(list.indexed_at),
        }
    }

    pub fn list_view(&self, list: &ListInfo, creator: &ActorInfo, labels: &LabelSet) -> ListView {
        ListView {
            uri: list.uri.clone(),
            cid: list.cid.clone(),
            creator: self.profile_basic(creator, labels),
            name: list.name.clone(),
            purpose: list.purpose.clone(),
            description: list.description.clone(),
            avatar: list
                .avatar_cid
                .as_ref()
                .map(|cid| self.image_uri(ImagePreset::Avatar, &list.creator, cid)),
            indexed_at: list.indexed_at,
            labels: labels.get(list.uri.as_str()).to_vec(),
        }
    }

    pub fn generator_view(
        &self,
        generator: &FeedGenInfo,
        creator: &ActorInfo,
        labels: &LabelSet,
    ) -> GeneratorView {
        GeneratorView {
            uri: generator.uri.clone(),
            cid: generator.cid.clone(),
            did: generator.service_did.clone(),
            creator: self.profile_basic(creator, labels),
            display_name: generator.display_name.clone(),
            description: generator.description.clone(),
            avatar: generator
                .avatar_cid
                .as_ref()
                .map(|cid| self.image_uri(ImagePreset::Avatar, &generator.creator, cid)),
            like_count: generator.like_count,
            viewer: generator.viewer_like.as_ref().map(|like| GeneratorViewerState {
                like: Some(like.clone()),
            }),
            indexed_at: generator.indexed_at,
            labels: labels.get(generator.uri.as_str()).to_vec(),
        }
    }

    fn record_value(content: &ContentInfo) -> Result<Value, PresentError> {
        serde_json::from_slice(&content.body).map_err(|e| PresentError::InvalidRecord {
            uri: content.uri.clone(),
            reason: SmolStr::new(e.to_string()),
        })
    }

    pub fn post_view(
        &self,
        content: &ContentInfo,
        author: &ActorInfo,
        embed: Option<EmbedView>,
        labels: &LabelSet,
    ) -> Result<PostView, PresentError> {
        let viewer = (content.viewer_like.is_some() || content.viewer_repost.is_some()).then(|| {
            PostViewerState {
                repost: content.viewer_repost.clone(),
                like: content.viewer_like.clone(),
            }
        });
        Ok(PostView {
            uri: content.uri.clone(),
            cid: content.cid.clone(),
            author: self.profile_basic(author, labels),
            record: Self::record_value(content)?,
            embed,
            reply_count: content.reply_count,
            repost_count: content.repost_count,
            like_count: content.like_count,
            indexed_at: content.indexed_at,
            viewer,
            labels: labels.get(content.uri.as_str()).to_vec(),
        })
    }

    /// An embedded post. Its own embed is left inside `value` unresolved.
    pub fn view_record(
        &self,
        content: &ContentInfo,
        author: &ActorInfo,
        labels: &LabelSet,
    ) -> Result<ViewRecord, PresentError> {
        Ok(ViewRecord {
            uri: content.uri.clone(),
            cid: content.cid.clone(),
            author: self.profile_basic(author, labels),
            value: Self::record_value(content)?,
            labels: labels.get(content.uri.as_str()).to_vec(),
            reply_count: content.reply_count,
            repost_count: content.repost_count,
            like_count: content.like_count,
            indexed_at: content.indexed_at,
        })
    }

    pub fn images(&self, did: &Did, images: &[ImageRecord]) -> ImagesView {
        ImagesView {
            images: images
                .iter()
                .map(|img| ViewImage {
                    thumb: self.image_uri(ImagePreset::FeedThumbnail, did, img.image.cid()),
                    fullsize: self.image_uri(ImagePreset::FeedFullsize, did, img.image.cid()),
                    alt: img.alt.clone(),
                    aspect_ratio: img.aspect_ratio.clone(),
                })
                .collect(),
        }
    }

    pub fn external(&self, did: &Did, external: &ExternalRecord) -> ExternalView {
        ExternalView {
            external: ViewExternal {
                uri: external.uri.clone(),
                title: external.title.clone(),
                description: external.description.clone(),
                thumb: external
                    .thumb
                    .as_ref()
                    .map(|t| self.image_uri(ImagePreset::FeedThumbnail, did, t.cid())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::RelationshipOverlay;
    use crate::images::CdnUriBuilder;
    use bytes::Bytes;
    use chrono::Utc;
    use weft_common::Cid;

    const CID: &str = "bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm";

    fn presenter() -> Presenter {
        Presenter::new(CdnUriBuilder::new("https://cdn.test".parse().unwrap()))
    }

    fn actor(overlay: Option<RelationshipOverlay>) -> ActorInfo {
        ActorInfo {
            did: Did::new("did:plc:a").unwrap(),
            handle: "a.test".into(),
            display_name: Some("A".into()),
            description: None,
            avatar_cid: Some(Cid::new(CID).unwrap()),
            indexed_at: None,
            overlay,
            muted_by_list: None,
            labels: None,
        }
    }

    fn content(body: &'static [u8]) -> ContentInfo {
        let now = Utc::now();
        ContentInfo {
            uri: AtUri::new("at://did:plc:a/app.bsky.feed.post/1").unwrap(),
            cid: Cid::new(CID).unwrap(),
            author: Did::new("did:plc:a").unwrap(),
            body: Bytes::from_static(body),
            created_at: now,
            indexed_at: now,
            reply_root: None,
            reply_parent: None,
            like_count: 3,
            repost_count: 0,
            reply_count: 1,
            viewer_like: None,
            viewer_repost: None,
        }
    }

    #[test]
    fn avatar_signed_and_viewer_omitted_when_logged_out() {
        let view = presenter().profile_basic(&actor(None), &LabelSet::default());
        assert_eq!(
            view.avatar.as_deref(),
            Some(format!("https://cdn.test/img/avatar/plain/did:plc:a/{CID}@jpeg").as_str())
        );
        assert!(view.viewer.is_none());
    }

    #[test]
    fn viewer_state_reflects_overlay() {
        let overlay = RelationshipOverlay {
            muted_by_list: Some(AtUri::new("at://did:plc:m/app.bsky.graph.list/1").unwrap()),
            ..Default::default()
        };
        let view = presenter().profile_basic(&actor(Some(overlay)), &LabelSet::default());
        assert!(view.viewer.unwrap().muted);
    }

    #[test]
    fn record_passed_through_verbatim() {
        let view = presenter()
            .post_view(
                &content(br#"{"text":"hi","extra":{"n":1}}"#),
                &actor(None),
                None,
                &LabelSet::default(),
            )
            .unwrap();
        assert_eq!(view.record["extra"]["n"], 1);
        assert_eq!(view.like_count, 3);
        assert!(view.viewer.is_none());
    }

    #[test]
    fn invalid_body_is_an_item_error() {
        let err = presenter()
            .post_view(&content(b"{not json"), &actor(None), None, &LabelSet::default())
            .unwrap_err();
        assert!(matches!(err, PresentError::InvalidRecord { .. }));
    }
}
