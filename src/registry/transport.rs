//! HTTP transport seam for registry operations
//!
//! Every outbound registry call goes through an [`HttpClient`]. The concrete
//! [`ReqwestClient`] talks to the network; decorators such as
//! [`EtagClient`](crate::registry::etag::EtagClient) and
//! [`AuthClient`](crate::registry::auth::AuthClient) wrap another client and
//! see every request and response on the way through.

use crate::error::{LockError, Result};
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use std::sync::Arc;
use std::time::Duration;

/// A single-method HTTP transport: send a request, get a response
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn execute(&self, request: Request) -> Result<Response> {
        (**self).execute(request).await
    }
}

/// Network transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oci-state-lock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LockError::Network)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        Ok(self.client.execute(request).await?)
    }
}
