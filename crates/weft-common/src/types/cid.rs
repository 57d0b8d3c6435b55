use crate::types::AtStrError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use smol_str::{SmolStr, ToSmolStr};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Content identifier in its string (multibase) form.
///
/// Only the shape is checked: base32 CIDv1 (`b...`) or base58 CIDv0
/// (`Qm...`). The pipeline carries CIDs through to views and never decodes
/// the multihash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Cid(SmolStr);

/// CID string shape
pub static CID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(b[a-z2-7]{8,}|Qm[1-9A-HJ-NP-Za-km-z]{44})$").unwrap()
});

impl Cid {
    /// Fallible constructor, validates
    pub fn new(cid: impl AsRef<str>) -> Result<Self, AtStrError> {
        let cid = cid.as_ref();
        if cid.len() > 256 {
            Err(AtStrError::too_long("data-model", cid, 256, cid.len()))
        } else if !CID_REGEX.is_match(cid) {
            Err(AtStrError::regex(
                "data-model",
                cid,
                SmolStr::new_static("not a base32 or base58 CID string"),
            ))
        } else {
            Ok(Self(cid.to_smolstr()))
        }
    }

    /// Get the CID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Cid {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: SmolStr = Deserialize::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
