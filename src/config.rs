//! Configuration for registry access and lock behaviour

use crate::error::{LockError, Result};
use crate::error::handlers::ValidationErrorHandler;
use std::env;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Basic credentials, exchanged for a bearer token when the registry asks for one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

impl RegistryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(LockError::Config("username cannot be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(LockError::Config("password cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// What `acquire` does when the tag listing used for its existence check fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistenceCheck {
    /// Treat the tag as absent and initialize it. Registries that do not
    /// implement tag listing still work, at the cost of re-initializing an
    /// existing tag when listing fails transiently.
    #[default]
    AssumeAbsent,
    /// Propagate the listing error
    Strict,
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub plain_http: bool,
    pub timeout: u64,
    pub auth: Option<RegistryAuth>,
    pub existence_check: ExistenceCheck,
    /// Attach `If-Match` to manifest writes when an ETag is known
    pub conditional_writes: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            plain_http: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            auth: None,
            existence_check: ExistenceCheck::default(),
            conditional_writes: true,
            verbose: false,
            quiet: false,
        }
    }
}

impl LockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: Option<RegistryAuth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_existence_check(mut self, existence_check: ExistenceCheck) -> Self {
        self.existence_check = existence_check;
        self
    }

    pub fn with_conditional_writes(mut self, enabled: bool) -> Self {
        self.conditional_writes = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Fill unset values from `OCI_LOCK_*` environment variables
    pub fn from_env(mut self) -> Self {
        if self.auth.is_none() {
            if let (Ok(username), Ok(password)) =
                (env::var("OCI_LOCK_USERNAME"), env::var("OCI_LOCK_PASSWORD"))
            {
                self.auth = Some(RegistryAuth::new(username, password));
            }
        }

        if let Ok(timeout) = env::var("OCI_LOCK_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.timeout = t;
            }
        }

        if env_flag("OCI_LOCK_PLAIN_HTTP") {
            self.plain_http = true;
        }

        if env_flag("OCI_LOCK_VERBOSE") {
            self.verbose = true;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_timeout(self.timeout)?;
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        if self.verbose && self.quiet {
            return Err(LockError::Config(
                "--verbose and --quiet cannot be combined".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
