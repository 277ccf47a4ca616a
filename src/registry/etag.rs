//! ETag interception for manifest writes
//!
//! [`EtagClient`] remembers the last `ETag` the registry reported for every
//! `.../manifests/<tag>` endpoint and attaches it as an `If-Match` precondition
//! when that tag's manifest is written again. A registry that enforces the
//! precondition answers `412 Precondition Failed` when another writer got there
//! first.
//!
//! The precondition is advisory. The reference `distribution` registry ignores
//! conditional headers on manifest PUTs, so against it two writers racing
//! between read and write can both succeed. The lock protocol only detects
//! conflicts it can observe through its own read-then-write sequence there.
//!
//! Entries are keyed by tag name only, not by registry or repository. A cache
//! shared through [`EtagClient::with_cache`] must stay within one repository:
//! coordinators on `a/state:prod` and `b/state:prod` sharing a cache would
//! overwrite each other's `prod` entry and send a foreign `If-Match`.

use crate::error::Result;
use crate::logging::Logger;
use crate::registry::transport::HttpClient;
use async_trait::async_trait;
use reqwest::header::{ETAG, HeaderValue, IF_MATCH};
use reqwest::{Method, Request, Response};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Last observed entity tag per tag name.
///
/// Cloning shares the underlying map. Entries are hints: they are overwritten
/// on every observation and never expire.
#[derive(Debug, Clone, Default)]
pub struct EtagCache {
    etags: Arc<RwLock<HashMap<String, String>>>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<String> {
        // A poisoned map still holds usable hints
        let etags = self.etags.read().unwrap_or_else(PoisonError::into_inner);
        etags.get(tag).cloned()
    }

    pub fn set(&self, tag: &str, etag: &str) {
        let mut etags = self.etags.write().unwrap_or_else(PoisonError::into_inner);
        etags.insert(tag.to_string(), etag.to_string());
    }

    pub fn len(&self) -> usize {
        self.etags.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tag name of a `.../manifests/<tag>` URL
pub fn manifest_tag(url: &Url) -> Option<String> {
    let mut segments = url.path().trim_matches('/').rsplit('/');
    let last = segments.next()?;
    let kind = segments.next()?;
    (kind == "manifests" && !last.is_empty()).then(|| last.to_string())
}

/// Decorator that records manifest ETags and makes manifest writes conditional
pub struct EtagClient<C> {
    inner: C,
    cache: EtagCache,
    logger: Logger,
    conditional_writes: bool,
}

impl<C: HttpClient> EtagClient<C> {
    pub fn new(inner: C, logger: Logger) -> Self {
        Self::with_cache(inner, EtagCache::new(), logger)
    }

    /// Share an existing cache between coordinators on the same repository.
    /// Keys carry no repository, so equal tag names in different repositories collide.
    pub fn with_cache(inner: C, cache: EtagCache, logger: Logger) -> Self {
        Self {
            inner,
            cache,
            logger,
            conditional_writes: true,
        }
    }

    /// Only record ETags, never attach `If-Match`
    pub fn with_conditional_writes(mut self, enabled: bool) -> Self {
        self.conditional_writes = enabled;
        self
    }

    pub fn cache(&self) -> &EtagCache {
        &self.cache
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for EtagClient<C> {
    async fn execute(&self, mut request: Request) -> Result<Response> {
        self.logger
            .trace(&format!("> {} {}", request.method(), request.url()));

        let tag = manifest_tag(request.url());

        if self.conditional_writes && request.method() == Method::PUT {
            if let Some(etag) = tag.as_deref().and_then(|t| self.cache.get(t)) {
                match HeaderValue::from_str(&etag) {
                    Ok(value) => {
                        self.logger.trace(&format!(
                            "> setting If-Match for {} to {}",
                            tag.as_deref().unwrap_or_default(),
                            etag
                        ));
                        request.headers_mut().insert(IF_MATCH, value);
                    }
                    Err(_) => self
                        .logger
                        .warning(&format!("Ignoring unusable ETag {:?}", etag)),
                }
            }
        }

        let response = self.inner.execute(request).await?;

        self.logger.trace(&format!("< {}", response.status()));

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());
        if let Some(etag) = etag {
            self.logger.trace(&format!("< ETag: {}", etag));
            if let Some(tag) = &tag {
                self.logger.trace(&format!("< storing {} as {}", tag, etag));
                self.cache.set(tag, etag);
            }
        }

        Ok(response)
    }
}
