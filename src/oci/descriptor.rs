use crate::digest::DigestUtils;
use crate::oci::{EMPTY_JSON, MEDIA_TYPE_EMPTY_JSON};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content-addressed pointer to a blob or manifest
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations: None,
            artifact_type: None,
        }
    }

    /// Describe `data`; the digest is the sha256 of the exact bytes
    pub fn from_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, DigestUtils::compute_digest(data), data.len() as u64)
    }

    /// Descriptor of the `{}` config blob
    pub fn empty_json() -> Self {
        Self::from_bytes(MEDIA_TYPE_EMPTY_JSON, EMPTY_JSON)
    }
}

// Two descriptors name the same content iff their digests match.
impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}
