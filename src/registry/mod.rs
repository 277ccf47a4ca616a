//! Registry module for OCI distribution interactions
//!
//! This module provides the transport seam, the ETag and authentication decorators
//! layered on top of it, and the repository operations used by the lock coordinator.

pub mod auth;
pub mod etag;
pub mod repository;
pub mod transport;

pub use auth::{AuthChallenge, AuthClient};
pub use etag::{EtagCache, EtagClient};
pub use repository::Repository;
pub use transport::{HttpClient, ReqwestClient};
