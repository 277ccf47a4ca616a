//! In-memory OCI registry used as the transport in integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use oci_state_lock::digest::DigestUtils;
use oci_state_lock::error::Result;
use oci_state_lock::oci::Manifest;
use oci_state_lock::registry::{EtagCache, EtagClient, HttpClient, Repository};
use oci_state_lock::{ExistenceCheck, Locker, Logger, Reference};
use reqwest::{Method, Request, Response};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const REFERENCE: &str = "registry.test/infra/state:prod";

#[derive(Default)]
struct State {
    blobs: HashMap<String, Vec<u8>>,
    /// (repository, tag) -> (media type, bytes)
    manifests: HashMap<(String, String), (String, Vec<u8>)>,
    uploads: usize,
    log: Vec<(Method, String)>,
    /// Bytes another writer puts under the tag right after the next manifest GET
    interfere_after_get: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    pub fail_tag_listing: AtomicBool,
    pub enforce_if_match: AtomicBool,
    pub etag_on_put: AtomicBool,
    pub tag_page_size: AtomicUsize,
    /// Manifest PUTs never get an answer
    pub hold_manifest_puts: AtomicBool,
    put_held: Notify,
}

fn response(status: u16, headers: &[(&str, String)], body: Vec<u8>) -> Response {
    let mut builder = http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    Response::from(builder.body(body).unwrap())
}

fn etag_of(digest: &str) -> String {
    format!("\"{}\"", digest)
}

impl MemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enforcing() -> Arc<Self> {
        let registry = Self::default();
        registry.enforce_if_match.store(true, Ordering::SeqCst);
        Arc::new(registry)
    }

    pub fn manifest(&self, repository: &str, tag: &str) -> Option<Manifest> {
        let state = self.state.lock().unwrap();
        state
            .manifests
            .get(&(repository.to_string(), tag.to_string()))
            .map(|(_, bytes)| Manifest::from_bytes(bytes).unwrap())
    }

    pub fn manifest_digest(&self, repository: &str, tag: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .manifests
            .get(&(repository.to_string(), tag.to_string()))
            .map(|(_, bytes)| DigestUtils::compute_digest(bytes))
    }

    pub fn set_manifest(&self, repository: &str, tag: &str, media_type: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state
            .manifests
            .insert((repository.to_string(), tag.to_string()), (media_type.to_string(), bytes));
    }

    pub fn blob(&self, digest: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().blobs.get(digest).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.state.lock().unwrap().blobs.len()
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn interfere_after_next_get(&self, bytes: Vec<u8>) {
        self.state.lock().unwrap().interfere_after_get = Some(bytes);
    }

    /// Number of logged requests with `method` whose path contains `fragment`
    pub fn count(&self, method: Method, fragment: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .log
            .iter()
            .filter(|(m, path)| *m == method && path.contains(fragment))
            .count()
    }

    /// Resolves once a manifest PUT is being held
    pub async fn manifest_put_held(&self) {
        self.put_held.notified().await;
    }

    pub fn manifest_writes(&self) -> usize {
        self.count(Method::PUT, "/manifests/")
    }

    fn handle(&self, request: &Request) -> Response {
        let path = request.url().path().to_string();
        let mut state = self.state.lock().unwrap();
        state.log.push((request.method().clone(), path.clone()));

        let Some(rest) = path.strip_prefix("/v2/") else {
            return response(404, &[], Vec::new());
        };

        if let Some(repository) = rest.strip_suffix("/tags/list") {
            return self.list_tags(&state, repository, request);
        }
        if let Some((repository, _id)) = rest.split_once("/blobs/uploads/") {
            return Self::upload(&mut state, repository, request);
        }
        if let Some((repository, tag)) = rest.rsplit_once("/manifests/") {
            return self.manifest_endpoint(&mut state, repository, tag, request);
        }
        if let Some((_, digest)) = rest.rsplit_once("/blobs/") {
            return Self::blob_endpoint(&state, digest, request);
        }
        response(404, &[], Vec::new())
    }

    fn list_tags(&self, state: &State, repository: &str, request: &Request) -> Response {
        if self.fail_tag_listing.load(Ordering::SeqCst) {
            return response(500, &[], b"listing unavailable".to_vec());
        }

        let tags: BTreeSet<&str> = state
            .manifests
            .keys()
            .filter(|(repo, _)| repo == repository)
            .map(|(_, tag)| tag.as_str())
            .collect();
        if tags.is_empty() {
            return response(404, &[], br#"{"errors":[{"code":"NAME_UNKNOWN"}]}"#.to_vec());
        }

        let last = request
            .url()
            .query_pairs()
            .find(|(k, _)| k == "last")
            .map(|(_, v)| v.to_string());
        let remaining: Vec<&str> = tags
            .into_iter()
            .filter(|t| last.as_deref().is_none_or(|l| *t > l))
            .collect();

        let page_size = match self.tag_page_size.load(Ordering::SeqCst) {
            0 => remaining.len(),
            n => n,
        };
        let page: Vec<&str> = remaining.iter().take(page_size).copied().collect();
        let mut headers = vec![("Content-Type", "application/json".to_string())];
        if remaining.len() > page.len() {
            if let Some(last) = page.last() {
                headers.push((
                    "Link",
                    format!("</v2/{}/tags/list?n={}&last={}>; rel=\"next\"", repository, page_size, last),
                ));
            }
        }

        let body = serde_json::json!({ "name": repository, "tags": page });
        response(200, &headers, serde_json::to_vec(&body).unwrap())
    }

    fn upload(state: &mut State, repository: &str, request: &Request) -> Response {
        match *request.method() {
            Method::POST => {
                state.uploads += 1;
                let location = format!("/v2/{}/blobs/uploads/session-{}", repository, state.uploads);
                response(202, &[("Location", location)], Vec::new())
            }
            Method::PUT => {
                let digest = request
                    .url()
                    .query_pairs()
                    .find(|(k, _)| k == "digest")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                let body = request.body().and_then(|b| b.as_bytes()).unwrap_or_default().to_vec();
                if DigestUtils::compute_digest(&body) != digest {
                    return response(400, &[], br#"{"errors":[{"code":"DIGEST_INVALID"}]}"#.to_vec());
                }
                state.blobs.insert(digest.clone(), body);
                response(201, &[("Docker-Content-Digest", digest)], Vec::new())
            }
            _ => response(405, &[], Vec::new()),
        }
    }

    fn blob_endpoint(state: &State, digest: &str, request: &Request) -> Response {
        let Some(blob) = state.blobs.get(digest) else {
            return response(404, &[], Vec::new());
        };
        let headers = [
            ("Content-Length", blob.len().to_string()),
            ("Docker-Content-Digest", digest.to_string()),
        ];
        match *request.method() {
            Method::HEAD => response(200, &headers, Vec::new()),
            Method::GET => response(200, &headers, blob.clone()),
            _ => response(405, &[], Vec::new()),
        }
    }

    fn manifest_endpoint(&self, state: &mut State, repository: &str, tag: &str, request: &Request) -> Response {
        let key = (repository.to_string(), tag.to_string());

        if *request.method() == Method::PUT {
            if self.enforce_if_match.load(Ordering::SeqCst) {
                if let Some(expected) = request.headers().get("If-Match").and_then(|v| v.to_str().ok()) {
                    let current = state
                        .manifests
                        .get(&key)
                        .map(|(_, bytes)| etag_of(&DigestUtils::compute_digest(bytes)));
                    if current.as_deref() != Some(expected) {
                        return response(412, &[], Vec::new());
                    }
                }
            }

            let media_type = request
                .headers()
                .get("Content-Type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = request.body().and_then(|b| b.as_bytes()).unwrap_or_default().to_vec();
            let digest = DigestUtils::compute_digest(&body);
            state.manifests.insert(key, (media_type, body));

            let mut headers = vec![
                ("Docker-Content-Digest", digest.clone()),
                ("Location", format!("/v2/{}/manifests/{}", repository, digest)),
            ];
            if self.etag_on_put.load(Ordering::SeqCst) {
                headers.push(("ETag", etag_of(&digest)));
            }
            return response(201, &headers, Vec::new());
        }

        let Some((media_type, bytes)) = state.manifests.get(&key).cloned() else {
            return response(404, &[], br#"{"errors":[{"code":"MANIFEST_UNKNOWN"}]}"#.to_vec());
        };
        let digest = DigestUtils::compute_digest(&bytes);
        let headers = [
            ("Content-Type", media_type),
            ("Content-Length", bytes.len().to_string()),
            ("Docker-Content-Digest", digest.clone()),
            ("ETag", etag_of(&digest)),
        ];

        match *request.method() {
            Method::HEAD => response(200, &headers, Vec::new()),
            Method::GET => {
                if let Some(replacement) = state.interfere_after_get.take() {
                    let media = headers[0].1.clone();
                    state.manifests.insert(key, (media, replacement));
                }
                response(200, &headers, bytes)
            }
            _ => response(405, &[], Vec::new()),
        }
    }
}

#[async_trait]
impl HttpClient for MemoryRegistry {
    async fn execute(&self, request: Request) -> Result<Response> {
        if request.method() == Method::PUT
            && request.url().path().contains("/manifests/")
            && self.hold_manifest_puts.load(Ordering::SeqCst)
        {
            self.put_held.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(self.handle(&request))
    }
}

pub fn quiet() -> Logger {
    Logger::new_quiet()
}

/// Repository over the in-memory registry, wrapped in its own ETag decorator
pub fn repository(registry: &Arc<MemoryRegistry>, reference: &str) -> (Repository, EtagCache) {
    let client = EtagClient::new(registry.clone(), quiet());
    let cache = client.cache().clone();
    let repository = Repository::new(Reference::parse(reference).unwrap(), Arc::new(client), true, quiet()).unwrap();
    (repository, cache)
}

/// A coordinator with its own ETag cache, as a separate process would have
pub fn locker(registry: &Arc<MemoryRegistry>, reference: &str) -> Locker {
    let (repository, _) = repository(registry, reference);
    Locker::new(repository, quiet())
}

pub fn strict_locker(registry: &Arc<MemoryRegistry>, reference: &str) -> Locker {
    locker(registry, reference).with_existence_check(ExistenceCheck::Strict)
}
