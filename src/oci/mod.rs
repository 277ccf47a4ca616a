//! OCI data model for lockable state
//!
//! A lockable resource is a single tag whose manifest carries the lock annotation
//! and one layer per published state version. This module provides the
//! [`Descriptor`] and [`Manifest`] types plus the media type and annotation
//! constants shared by the registry client and the lock coordinator.

pub mod descriptor;
pub mod manifest;

pub use descriptor::Descriptor;
pub use manifest::{LockState, Manifest};

/// OCI image manifest, the only manifest type a lockable tag may point at
pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Media type of the empty `{}` blob used as manifest config for lock-only manifests
pub const MEDIA_TYPE_EMPTY_JSON: &str = "application/vnd.oci.empty.v1+json";

/// Media type of published state blobs
pub const STATE_FILE_MEDIA_TYPE: &str = "application/vnd.opentofu.state.v1+json";

/// Manifest annotation holding the lock status (`"true"` / `"false"`)
pub const ANNOTATION_LOCK_STATE: &str = "org.opentofu.state.locked";

/// Content of the empty config blob
pub const EMPTY_JSON: &[u8] = b"{}";
