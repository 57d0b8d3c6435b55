//! Image uri construction for avatars, banners and embedded images

use std::fmt;
use url::Url;
use weft_common::{Cid, Did};

/// Rendition requested from the image service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImagePreset {
    Avatar,
    Banner,
    FeedThumbnail,
    FeedFullsize,
}

impl ImagePreset {
    /// Path segment used by the image service for this preset
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePreset::Avatar => "avatar",
            ImagePreset::Banner => "banner",
            ImagePreset::FeedThumbnail => "feed_thumbnail",
            ImagePreset::FeedFullsize => "feed_fullsize",
        }
    }
}

impl fmt::Display for ImagePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a blob reference into a uri a client can load.
pub trait ImageUriSigner: Send + Sync {
    /// Uri for blob `cid` uploaded by `did`, rendered as `preset`
    fn signed_uri(&self, preset: ImagePreset, did: &Did, cid: &Cid) -> String;
}

impl<T: ImageUriSigner + ?Sized> ImageUriSigner for std::sync::Arc<T> {
    fn signed_uri(&self, preset: ImagePreset, did: &Did, cid: &Cid) -> String {
        self.as_ref().signed_uri(preset, did, cid)
    }
}

/// CDN-style uris: `{base}/img/{preset}/plain/{did}/{cid}@jpeg`
///
/// ```
/// # use weft::images::{CdnUriBuilder, ImagePreset, ImageUriSigner};
/// # use weft_common::{Cid, Did};
/// let cdn = CdnUriBuilder::new("https://cdn.example.com/".parse().unwrap());
/// let did = Did::new("did:plc:alice").unwrap();
/// let cid = Cid::new("bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm").unwrap();
/// assert_eq!(
///     cdn.signed_uri(ImagePreset::Avatar, &did, &cid),
///     "https://cdn.example.com/img/avatar/plain/did:plc:alice/bafyreie5737gdxlw5i64vzichcalba3z2v5n6icifvx5xytvske7mr3hpm@jpeg"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CdnUriBuilder {
    base: String,
}

impl CdnUriBuilder {
    pub fn new(base: Url) -> Self {
        Self {
            base: base.as_str().trim_end_matches('/').to_string(),
        }
    }
}

impl ImageUriSigner for CdnUriBuilder {
    fn signed_uri(&self, preset: ImagePreset, did: &Did, cid: &Cid) -> String {
        format!("{}/img/{}/plain/{}/{}@jpeg", self.base, preset, did, cid)
    }
}
