//! Registry authentication
//!
//! [`AuthClient`] answers `401 Unauthorized` challenges. For a `Bearer` challenge
//! it requests a token from the advertised realm, anonymously or with basic
//! credentials, and replays the request once with that token. For a `Basic`
//! challenge it replays the request with the basic credentials.

use crate::config::RegistryAuth;
use crate::error::{LockError, Result};
use crate::logging::Logger;
use crate::registry::transport::HttpClient;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use url::Url;

/// Parsed `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

impl AuthChallenge {
    /// Parse `Bearer realm="...",service="...",scope="repository:x:pull,push"`.
    /// Quoted values may contain commas.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(AuthChallenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_params(rest);
        let realm = params.get("realm")?.clone();
        Some(AuthChallenge::Bearer {
            realm,
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Decorator that retries challenged requests with credentials
pub struct AuthClient<C> {
    inner: C,
    credentials: Option<RegistryAuth>,
    /// Last issued token per host, attached up front to later requests
    tokens: RwLock<HashMap<String, String>>,
    logger: Logger,
}

impl<C: HttpClient> AuthClient<C> {
    pub fn new(inner: C, credentials: Option<RegistryAuth>, logger: Logger) -> Self {
        Self {
            inner,
            credentials,
            tokens: RwLock::new(HashMap::new()),
            logger,
        }
    }

    fn cached_token(&self, host: &str) -> Option<String> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        tokens.get(host).cloned()
    }

    fn store_token(&self, host: &str, token: &str) {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        tokens.insert(host.to_string(), token.to_string());
    }

    fn basic_header(&self) -> Option<HeaderValue> {
        let auth = self.credentials.as_ref()?;
        let encoded = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
        HeaderValue::from_str(&format!("Basic {}", encoded)).ok()
    }

    async fn fetch_token(&self, realm: &str, service: Option<&str>, scope: Option<&str>) -> Result<String> {
        let mut url = Url::parse(realm)
            .map_err(|e| LockError::Auth(format!("invalid token realm {}: {}", realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }

        self.logger.detail(&format!("Requesting token from: {}", url));

        let mut request = Request::new(Method::GET, url);
        if let Some(basic) = self.basic_header() {
            request.headers_mut().insert(AUTHORIZATION, basic);
        }

        let response = self.inner.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LockError::Auth(format!(
                "token request failed with status {}: {}",
                status, error_text
            )));
        }

        let body = response.bytes().await?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| LockError::Auth(format!("failed to parse token response: {}", e)))?;

        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LockError::Auth("token response did not contain a token".to_string()))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for AuthClient<C> {
    async fn execute(&self, mut request: Request) -> Result<Response> {
        let host = request.url().host_str().unwrap_or_default().to_string();

        if !request.headers().contains_key(AUTHORIZATION) {
            if let Some(token) = self.cached_token(&host) {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
            }
        }

        // Bodies are in-memory bytes, so a replay copy is always available
        let replay = request.try_clone();
        let response = self.inner.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(mut replay) = replay else {
            return Ok(response);
        };
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(AuthChallenge::parse);

        let authorization = match challenge {
            Some(AuthChallenge::Bearer { realm, service, scope }) => {
                self.logger.debug(&format!(
                    "Bearer challenge: realm={}, service={:?}, scope={:?}",
                    realm, service, scope
                ));
                let token = self
                    .fetch_token(&realm, service.as_deref(), scope.as_deref())
                    .await?;
                self.store_token(&host, &token);
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| LockError::Auth(format!("unusable token: {}", e)))?
            }
            Some(AuthChallenge::Basic) => match self.basic_header() {
                Some(basic) => basic,
                None => return Ok(response),
            },
            None => return Ok(response),
        };

        replay.headers_mut().insert(AUTHORIZATION, authorization);
        self.inner.execute(replay).await
    }
}
