use crate::error::{LockError, Result};
use crate::oci::{ANNOTATION_LOCK_STATE, Descriptor, MEDIA_TYPE_IMAGE_MANIFEST};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lock status encoded in the manifest annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    fn annotation_value(self) -> &'static str {
        match self {
            LockState::Locked => "true",
            LockState::Unlocked => "false",
        }
    }
}

/// OCI image manifest a lockable tag points at.
///
/// A manifest value is never changed after it has been pushed; locking,
/// unlocking and appending a layer all produce a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    /// Fresh manifest with the empty config and no layers
    pub fn empty() -> Self {
        Self {
            schema_version: 2,
            media_type: MEDIA_TYPE_IMAGE_MANIFEST.to_string(),
            artifact_type: None,
            config: Descriptor::empty_json(),
            layers: Vec::new(),
            subject: None,
            annotations: None,
        }
    }

    /// Anything other than `"true"`, including a missing annotation, reads as unlocked
    pub fn lock_state(&self) -> LockState {
        match self
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_LOCK_STATE))
        {
            Some(value) if value == "true" => LockState::Locked,
            _ => LockState::Unlocked,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state() == LockState::Locked
    }

    pub fn with_lock_state(mut self, state: LockState) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(ANNOTATION_LOCK_STATE.to_string(), state.annotation_value().to_string());
        self
    }

    pub fn locked(self) -> Self {
        self.with_lock_state(LockState::Locked)
    }

    pub fn unlocked(self) -> Self {
        self.with_lock_state(LockState::Unlocked)
    }

    /// Append a published state layer; layers are never reordered or pruned
    pub fn with_layer(mut self, layer: Descriptor) -> Self {
        self.layers.push(layer);
        self
    }

    /// Most recently published layer
    pub fn latest_layer(&self) -> Option<&Descriptor> {
        self.layers.last()
    }

    /// Serialize to the exact bytes that get pushed, together with their descriptor
    pub fn to_bytes(&self) -> Result<(Vec<u8>, Descriptor)> {
        let bytes = serde_json::to_vec(self)?;
        let descriptor = Descriptor::from_bytes(MEDIA_TYPE_IMAGE_MANIFEST, &bytes);
        Ok((bytes, descriptor))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(LockError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::STATE_FILE_MEDIA_TYPE;

    #[test]
    fn test_empty_manifest_is_unlocked() {
        let manifest = Manifest::empty();
        assert_eq!(manifest.schema_version, 2);
        assert!(manifest.layers.is_empty());
        assert_eq!(manifest.lock_state(), LockState::Unlocked);
    }

    #[test]
    fn test_lock_and_unlock() {
        let manifest = Manifest::empty().locked();
        assert!(manifest.is_locked());
        assert_eq!(
            manifest.annotations.as_ref().unwrap()[ANNOTATION_LOCK_STATE],
            "true"
        );

        let manifest = manifest.unlocked();
        assert!(!manifest.is_locked());
        assert_eq!(
            manifest.annotations.as_ref().unwrap()[ANNOTATION_LOCK_STATE],
            "false"
        );
    }

    #[test]
    fn test_unknown_annotation_value_is_unlocked() {
        let mut manifest = Manifest::empty();
        manifest.annotations = Some(BTreeMap::from([(
            ANNOTATION_LOCK_STATE.to_string(),
            "yes".to_string(),
        )]));
        assert!(!manifest.is_locked());
    }

    #[test]
    fn test_locking_keeps_other_annotations_and_layers() {
        let layer = Descriptor::from_bytes(STATE_FILE_MEDIA_TYPE, b"state");
        let mut manifest = Manifest::empty().with_layer(layer.clone());
        manifest.annotations = Some(BTreeMap::from([(
            "org.opencontainers.image.created".to_string(),
            "2025-01-01T00:00:00Z".to_string(),
        )]));

        let locked = manifest.locked();
        let annotations = locked.annotations.as_ref().unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(locked.layers, vec![layer]);
    }

    #[test]
    fn test_layers_keep_publish_order() {
        let first = Descriptor::from_bytes(STATE_FILE_MEDIA_TYPE, b"one");
        let second = Descriptor::from_bytes(STATE_FILE_MEDIA_TYPE, b"two");
        let manifest = Manifest::empty()
            .with_layer(first.clone())
            .with_layer(second.clone());
        assert_eq!(manifest.layers, vec![first, second.clone()]);
        assert_eq!(manifest.latest_layer(), Some(&second));
    }

    #[test]
    fn test_wire_format() {
        let (bytes, descriptor) = Manifest::empty().locked().to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], MEDIA_TYPE_IMAGE_MANIFEST);
        assert_eq!(json["layers"], serde_json::json!([]));
        assert_eq!(json["annotations"][ANNOTATION_LOCK_STATE], "true");
        assert_eq!(descriptor.media_type, MEDIA_TYPE_IMAGE_MANIFEST);
        assert_eq!(descriptor.size, bytes.len() as u64);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let (a, da) = Manifest::empty().locked().to_bytes().unwrap();
        let (b, db) = Manifest::empty().locked().to_bytes().unwrap();
        assert_eq!(a, b);
        assert_eq!(da.digest, db.digest);
    }

    #[test]
    fn test_from_bytes_accepts_missing_layers() {
        let raw = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2}}"#;
        let manifest = Manifest::from_bytes(raw).unwrap();
        assert!(manifest.layers.is_empty());
        assert!(!manifest.is_locked());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = Manifest::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, LockError::Serialization(_)));
    }
}
