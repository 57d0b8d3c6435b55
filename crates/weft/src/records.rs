//! The embed portion of stored `app.bsky.feed.post` records.
//!
//! Only the fields needed to resolve an embed are modeled. A record whose
//! embed does not parse as one of these shapes is treated as having no
//! embed; the raw body is still rendered verbatim.

use serde::Deserialize;
use serde_json::Value;
use weft_common::{Cid, StrongRef};

use crate::views::AspectRatio;

/// Blob reference, either the typed form or the legacy `{cid, mimeType}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BlobRef {
    Typed {
        #[serde(rename = "ref")]
        link: CidLink,
    },
    Legacy {
        cid: Cid,
    },
}

impl BlobRef {
    pub fn cid(&self) -> &Cid {
        match self {
            BlobRef::Typed { link } => &link.link,
            BlobRef::Legacy { cid } => cid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: Cid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub image: BlobRef,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalRecord {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordRef {
    pub record: StrongRef,
}

/// Media half of a record-with-media embed
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "$type")]
pub enum MediaEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<ImageRecord> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalRecord },
    #[serde(other)]
    Unsupported,
}

/// A post's `embed` field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "$type")]
pub enum PostEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<ImageRecord> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalRecord },
    #[serde(rename = "app.bsky.embed.record")]
    Record { record: StrongRef },
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia { record: RecordRef, media: MediaEmbed },
}

impl PostEmbed {
    /// The record this embed points at, if any
    pub fn target(&self) -> Option<&StrongRef> {
        match self {
            PostEmbed::Record { record } => Some(record),
            PostEmbed::RecordWithMedia { record, .. } => Some(&record.record),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct EmbedField {
    #[serde(default)]
    embed: Option<Value>,
}

/// Read the embed out of a stored post body.
///
/// Returns `None` when the body has no embed or the embed is not one the
/// pipeline knows how to render.
pub fn parse_embed(body: &[u8]) -> Option<PostEmbed> {
    let field: EmbedField = serde_json::from_slice(body).ok()?;
    serde_json::from_value(field.embed?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CID: &str = "bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm";

    fn body(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn record_embed() {
        let raw = body(json!({
            "$type": "app.bsky.feed.post",
            "text": "look",
            "embed": {
                "$type": "app.bsky.embed.record",
                "record": {"uri": "at://did:plc:c/app.bsky.feed.post/1", "cid": CID}
            }
        }));
        let embed = parse_embed(&raw).unwrap();
        assert_eq!(
            embed.target().unwrap().uri.as_str(),
            "at://did:plc:c/app.bsky.feed.post/1"
        );
    }

    #[test]
    fn images_both_blob_forms() {
        let raw = body(json!({
            "embed": {
                "$type": "app.bsky.embed.images",
                "images": [
                    {"image": {"$type": "blob", "ref": {"$link": CID}, "mimeType": "image/jpeg", "size": 10}, "alt": "a"},
                    {"image": {"cid": CID, "mimeType": "image/png"}, "alt": "b", "aspectRatio": {"width": 4, "height": 3}}
                ]
            }
        }));
        let PostEmbed::Images { images } = parse_embed(&raw).unwrap() else {
            panic!("expected images");
        };
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image.cid().as_str(), CID);
        assert_eq!(images[1].aspect_ratio.as_ref().unwrap().width, 4);
    }

    #[test]
    fn record_with_unsupported_media() {
        let raw = body(json!({
            "embed": {
                "$type": "app.bsky.embed.recordWithMedia",
                "record": {"record": {"uri": "at://did:plc:c/app.bsky.feed.post/1", "cid": CID}},
                "media": {"$type": "app.bsky.embed.video", "video": {}}
            }
        }));
        let embed = parse_embed(&raw).unwrap();
        assert!(matches!(
            embed,
            PostEmbed::RecordWithMedia {
                media: MediaEmbed::Unsupported,
                ..
            }
        ));
    }

    #[test]
    fn unknown_or_missing_embed() {
        assert!(parse_embed(&body(json!({"text": "hi"}))).is_none());
        assert!(parse_embed(&body(json!({"embed": {"$type": "app.bsky.embed.video"}}))).is_none());
        assert!(parse_embed(b"not json").is_none());
        // malformed strong ref
        assert!(
            parse_embed(&body(json!({
                "embed": {"$type": "app.bsky.embed.record", "record": {"uri": "nope", "cid": CID}}
            })))
            .is_none()
        );
    }
}
