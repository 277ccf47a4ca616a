//! Lock coordinator
//!
//! Layers single-writer semantics on top of a registry tag. The tag's manifest
//! carries a lock annotation; acquiring the lock pushes a new manifest version
//! with the annotation set, publishing state pushes one with the annotation
//! cleared and the new state appended as a layer.
//!
//! ```text
//!  Uninitialized --acquire--> Locked
//!  Unlocked      --acquire--> Locked
//!  Locked        --acquire(force)--> Locked
//!  Locked        --acquire--> error: Locked
//!  Locked        --push_state--> Unlocked (+1 layer)
//! ```
//!
//! There are no retries and no leases. A rejected acquire is final for that
//! call; the caller decides whether to retry or force.

use crate::config::ExistenceCheck;
use crate::digest::DigestUtils;
use crate::error::{LockError, Result};
use crate::logging::Logger;
use crate::oci::{Descriptor, EMPTY_JSON, MEDIA_TYPE_IMAGE_MANIFEST, Manifest, STATE_FILE_MEDIA_TYPE};
use crate::registry::Repository;
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct Locker {
    repository: Repository,
    existence_check: ExistenceCheck,
    logger: Logger,
}

impl Locker {
    pub fn new(repository: Repository, logger: Logger) -> Self {
        Self {
            repository,
            existence_check: ExistenceCheck::default(),
            logger,
        }
    }

    pub fn with_existence_check(mut self, existence_check: ExistenceCheck) -> Self {
        self.existence_check = existence_check;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    fn tag(&self) -> Result<&str> {
        let tag = self.repository.tag();
        if tag.is_empty() {
            return Err(LockError::InvalidReference("reference is blank".to_string()));
        }
        Ok(tag)
    }

    /// Take the lock on the tag and return the manifest that was pushed.
    ///
    /// Fails with [`LockError::Locked`] when the manifest is already locked and
    /// `force` is not set; nothing is written in that case.
    pub async fn acquire(&self, force: bool) -> Result<Manifest> {
        let tag = self.tag()?;

        if !self.state_initialized(tag).await? {
            return self.initialize(tag).await;
        }

        let current = self.load_manifest(tag).await?;
        if current.is_locked() {
            if !force {
                return Err(LockError::Locked);
            }
            self.logger
                .warning(&format!("Overriding existing lock on {}", self.repository.reference()));
        }

        let manifest = current.locked();
        let pushed = self.publish(tag, &manifest, "locking manifest").await?;
        self.verify_tag(tag, &pushed).await?;

        Ok(manifest)
    }

    /// Publish new state exclusively: upload the blob, take the lock, then push
    /// an unlocked manifest with the blob appended as the newest layer.
    ///
    /// If taking the lock fails, no manifest is written. The uploaded blob may
    /// stay in the registry unreferenced.
    pub async fn push_state<R>(&self, mut reader: R, force: bool) -> Result<Manifest>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.push_state_bytes(data, force).await
    }

    pub async fn push_state_bytes(&self, data: Vec<u8>, force: bool) -> Result<Manifest> {
        let tag = self.tag()?;

        let layer = Descriptor::from_bytes(STATE_FILE_MEDIA_TYPE, &data);
        self.logger.step(&format!(
            "Uploading state {} ({})",
            DigestUtils::format_digest_short(&layer.digest),
            self.logger.format_size(layer.size)
        ));
        self.repository.push_blob(&layer, data).await?;

        let manifest = self.acquire(force).await?;

        let manifest = manifest.unlocked().with_layer(layer.clone());
        let (bytes, descriptor) = manifest.to_bytes()?;
        self.logger.info(&format!(
            "pushing state {} manifest {}",
            layer.digest, descriptor.digest
        ));
        self.repository.push_manifest(&descriptor, bytes, tag).await?;

        Ok(manifest)
    }

    /// The manifest the tag currently points at, `None` if the tag does not exist
    pub async fn current_manifest(&self) -> Result<Option<Manifest>> {
        let tag = self.tag()?;
        match self.load_manifest(tag).await {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Bytes of the most recently published state, `None` if nothing was published yet
    pub async fn pull_state(&self) -> Result<Option<Vec<u8>>> {
        let Some(manifest) = self.current_manifest().await? else {
            return Ok(None);
        };
        match manifest.latest_layer() {
            Some(layer) => Ok(Some(self.repository.fetch_blob(layer).await?)),
            None => Ok(None),
        }
    }

    async fn state_initialized(&self, tag: &str) -> Result<bool> {
        match self.repository.tag_exists(tag).await {
            Ok(found) => Ok(found),
            // Registries answer 404 for repositories that have no tags yet
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => match self.existence_check {
                ExistenceCheck::AssumeAbsent => {
                    self.logger.warning(&format!(
                        "Could not list tags ({}), treating {} as uninitialized",
                        err, tag
                    ));
                    Ok(false)
                }
                ExistenceCheck::Strict => Err(err),
            },
        }
    }

    async fn initialize(&self, tag: &str) -> Result<Manifest> {
        let config = Descriptor::empty_json();
        self.repository.push_blob(&config, EMPTY_JSON.to_vec()).await?;

        let manifest = Manifest::empty().locked();
        let pushed = self.publish(tag, &manifest, "init locked manifest").await?;

        // Also records the new manifest's ETag for the next conditional write
        self.verify_tag(tag, &pushed).await?;

        Ok(manifest)
    }

    async fn load_manifest(&self, tag: &str) -> Result<Manifest> {
        let (descriptor, data) = self.repository.fetch_manifest(tag).await?;
        if descriptor.media_type != MEDIA_TYPE_IMAGE_MANIFEST {
            return Err(LockError::MediaTypeMismatch {
                expected: MEDIA_TYPE_IMAGE_MANIFEST.to_string(),
                actual: descriptor.media_type,
            });
        }
        Manifest::from_bytes(&data)
    }

    async fn publish(&self, tag: &str, manifest: &Manifest, action: &str) -> Result<Descriptor> {
        let (bytes, descriptor) = manifest.to_bytes()?;
        self.logger.info(&format!("{} {}", action, descriptor.digest));
        self.repository.push_manifest(&descriptor, bytes, tag).await?;
        Ok(descriptor)
    }

    /// Fail if the tag no longer points at what we just pushed
    async fn verify_tag(&self, tag: &str, pushed: &Descriptor) -> Result<()> {
        let resolved = self.repository.resolve(tag).await?;
        if resolved.digest != pushed.digest {
            return Err(LockError::DigestMismatch {
                expected: pushed.digest.clone(),
                actual: resolved.digest,
            });
        }
        Ok(())
    }
}
