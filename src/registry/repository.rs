//! Repository operations over the OCI distribution API
//!
//! Implements the registry calls the lock coordinator needs:
//! - Blob existence check, upload and download (`/v2/<name>/blobs/...`)
//! - Manifest push, fetch and resolve (`/v2/<name>/manifests/<tag>`)
//! - Paginated tag listing (`/v2/<name>/tags/list`)
//!
//! All requests go through the [`HttpClient`] the repository was built with.

use crate::config::LockConfig;
use crate::digest::DigestUtils;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{LockError, Result};
use crate::logging::Logger;
use crate::oci::{Descriptor, MEDIA_TYPE_IMAGE_MANIFEST};
use crate::reference::Reference;
use crate::registry::auth::AuthClient;
use crate::registry::etag::EtagClient;
use crate::registry::transport::{HttpClient, ReqwestClient};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, LINK, LOCATION};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Handle to one repository on one registry, bound to the tag being locked
#[derive(Clone)]
pub struct Repository {
    client: Arc<dyn HttpClient>,
    reference: Reference,
    base_url: Url,
    logger: Logger,
}

impl Repository {
    /// Build a repository on top of an arbitrary transport
    pub fn new(
        reference: Reference,
        client: Arc<dyn HttpClient>,
        plain_http: bool,
        logger: Logger,
    ) -> Result<Self> {
        let base_url = reference.base_url(plain_http)?;
        Ok(Self {
            client,
            reference,
            base_url,
            logger,
        })
    }

    /// Build the network stack: reqwest, then bearer auth, then the ETag decorator
    pub fn connect(reference: Reference, config: &LockConfig, logger: Logger) -> Result<Self> {
        let transport = ReqwestClient::new(config.timeout_duration())?;
        let auth = AuthClient::new(transport, config.auth.clone(), logger.clone());
        let etag = EtagClient::new(auth, logger.clone()).with_conditional_writes(config.conditional_writes);
        Self::new(reference, Arc::new(etag), config.plain_http, logger)
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn tag(&self) -> &str {
        &self.reference.tag
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("v2/{}/{}", self.reference.repository, path))?)
    }

    async fn send(&self, method: Method, url: Url, headers: HeaderMap, body: Option<Vec<u8>>) -> Result<Response> {
        let mut request = Request::new(method, url);
        *request.headers_mut() = headers;
        if let Some(body) = body {
            request
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
            *request.body_mut() = Some(body.into());
        }
        self.client.execute(request).await
    }

    async fn error_text(response: Response) -> String {
        response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string())
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type without parameters such as `; charset=utf-8`
    fn media_type(response: &Response) -> String {
        Self::header(response, CONTENT_TYPE.as_str())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn manifest_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT));
        headers
    }

    /// Check if a blob is already stored
    pub async fn blob_exists(&self, descriptor: &Descriptor) -> Result<bool> {
        let url = self.url(&format!("blobs/{}", descriptor.digest))?;
        let response = self.send(Method::HEAD, url, HeaderMap::new(), None).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "blob existence check",
            )),
        }
    }

    /// Store a blob. Pushing content that is already present is a no-op.
    pub async fn push_blob(&self, descriptor: &Descriptor, data: Vec<u8>) -> Result<()> {
        DigestUtils::verify(&data, &descriptor.digest)?;

        let short = DigestUtils::format_digest_short(&descriptor.digest);
        if self.blob_exists(descriptor).await? {
            self.logger
                .verbose(&format!("Blob {} already exists, skipping upload", short));
            return Ok(());
        }

        let mut url = self.start_upload().await?;
        url.query_pairs_mut().append_pair("digest", &descriptor.digest);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        let response = self.send(Method::PUT, url, headers, Some(data)).await?;

        if response.status().is_success() {
            self.logger.verbose(&format!("Blob {} uploaded", short));
            Ok(())
        } else {
            let status = response.status();
            Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "blob upload",
            ))
        }
    }

    async fn start_upload(&self) -> Result<Url> {
        let url = self.url("blobs/uploads/")?;
        let response = self.send(Method::POST, url.clone(), HeaderMap::new(), Some(Vec::new())).await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "blob upload start",
            ));
        }

        let location = Self::header(&response, LOCATION.as_str()).ok_or_else(|| LockError::Registry {
            operation: "blob upload start".to_string(),
            status: response.status().as_u16(),
            message: "no Location header in upload response".to_string(),
        })?;

        // Location may be absolute or relative to the registry
        Ok(url.join(location)?)
    }

    /// Download a blob and check it against its descriptor
    pub async fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let url = self.url(&format!("blobs/{}", descriptor.digest))?;
        let response = self.send(Method::GET, url, HeaderMap::new(), None).await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "blob fetch",
            ));
        }

        let data = response.bytes().await?.to_vec();
        DigestUtils::verify(&data, &descriptor.digest)?;
        Ok(data)
    }

    /// Push manifest bytes under `tag`
    pub async fn push_manifest(&self, descriptor: &Descriptor, data: Vec<u8>, tag: &str) -> Result<()> {
        let url = self.url(&format!("manifests/{}", tag))?;
        let mut headers = HeaderMap::new();
        let content_type = HeaderValue::from_str(&descriptor.media_type).map_err(|e| LockError::MediaTypeMismatch {
            expected: MEDIA_TYPE_IMAGE_MANIFEST.to_string(),
            actual: format!("{} ({})", descriptor.media_type, e),
        })?;
        headers.insert(CONTENT_TYPE, content_type);

        let response = self.send(Method::PUT, url, headers, Some(data)).await?;

        if response.status().is_success() {
            self.logger.verbose(&format!(
                "Manifest {} pushed to {}",
                DigestUtils::format_digest_short(&descriptor.digest),
                tag
            ));
            Ok(())
        } else {
            let status = response.status();
            Err(HttpErrorHandler::handle_manifest_put_error(
                status,
                &Self::error_text(response).await,
                tag,
            ))
        }
    }

    /// Fetch the manifest a tag points at. When the registry reports a digest,
    /// the bytes must hash to it.
    pub async fn fetch_manifest(&self, tag: &str) -> Result<(Descriptor, Vec<u8>)> {
        let url = self.url(&format!("manifests/{}", tag))?;
        let response = self.send(Method::GET, url, Self::manifest_headers(), None).await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "manifest fetch",
            ));
        }

        let media_type = Self::media_type(&response);
        let reported = Self::header(&response, DOCKER_CONTENT_DIGEST).map(str::to_string);
        let data = response.bytes().await?.to_vec();

        let descriptor = Descriptor::from_bytes(media_type, &data);
        if let Some(reported) = reported {
            if reported != descriptor.digest {
                return Err(LockError::DigestMismatch {
                    expected: reported,
                    actual: descriptor.digest,
                });
            }
        }

        Ok((descriptor, data))
    }

    /// Resolve a tag to the descriptor of its manifest
    pub async fn resolve(&self, tag: &str) -> Result<Descriptor> {
        let url = self.url(&format!("manifests/{}", tag))?;
        let response = self.send(Method::HEAD, url, Self::manifest_headers(), None).await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &Self::error_text(response).await,
                "manifest resolve",
            ));
        }

        let media_type = Self::media_type(&response);
        let digest = Self::header(&response, DOCKER_CONTENT_DIGEST).map(str::to_string);
        let size = Self::header(&response, CONTENT_LENGTH.as_str()).and_then(|v| v.parse::<u64>().ok());

        match (digest, size) {
            (Some(digest), Some(size)) => Ok(Descriptor::new(media_type, digest, size)),
            _ => {
                // Some registries omit the digest on HEAD; fall back to hashing the body
                self.logger
                    .debug("Resolve response lacks digest or size, fetching manifest");
                let (descriptor, _) = self.fetch_manifest(tag).await?;
                Ok(descriptor)
            }
        }
    }

    /// List tags page by page, calling `visitor` once per page. Pagination
    /// follows `Link: <...>; rel="next"` headers.
    pub async fn tags<F>(&self, last: Option<&str>, mut visitor: F) -> Result<()>
    where
        F: FnMut(&[String]) -> Result<()> + Send,
    {
        let mut url = self.url("tags/list")?;
        if let Some(last) = last.filter(|l| !l.is_empty()) {
            url.query_pairs_mut().append_pair("last", last);
        }

        loop {
            let response = self
                .send(Method::GET, url.clone(), HeaderMap::new(), None)
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(HttpErrorHandler::handle_registry_error(
                    status,
                    &Self::error_text(response).await,
                    "tag listing",
                ));
            }

            let next = Self::header(&response, LINK.as_str()).and_then(parse_next_link);
            let body = response.bytes().await?;
            let page: TagList = serde_json::from_slice(&body)?;
            visitor(&page.tags.unwrap_or_default())?;

            match next {
                Some(link) => url = url.join(&link)?,
                None => return Ok(()),
            }
        }
    }

    /// Whether `tag` appears in the repository's tag list
    pub async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let mut found = false;
        self.tags(None, |tags| {
            if tags.iter().any(|t| t == tag) {
                found = true;
            }
            Ok(())
        })
        .await?;
        Ok(found)
    }
}

/// Extract the target of a `rel="next"` link
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"" || p.trim() == "rel=next");
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        is_next.then(|| target.to_string())
    })
}
