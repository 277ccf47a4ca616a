//! OCI State Lock Library
//!
//! Mutual exclusion for a state blob stored in an OCI registry, using nothing
//! but the registry's tag → manifest pointer as coordination substrate.
//!
//! - [`lock::Locker`] implements acquire / push-state on top of a [`registry::Repository`]
//! - [`registry::EtagClient`] makes manifest writes conditional on the last seen ETag

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod lock;
pub mod logging;
pub mod oci;
pub mod reference;
pub mod registry;

pub use config::{ExistenceCheck, LockConfig, RegistryAuth};
pub use error::{LockError, Result};
pub use lock::Locker;
pub use logging::Logger;
pub use reference::Reference;
