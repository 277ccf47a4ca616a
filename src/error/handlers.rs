//! Standardized mapping from registry responses and user input to [`LockError`]

use crate::error::{LockError, Result};
use reqwest::StatusCode;
use std::path::Path;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(status: StatusCode, error_text: &str, operation: &str) -> LockError {
        let message = match status.as_u16() {
            401 => format!("unauthorized: {}", error_text),
            403 => format!("forbidden, insufficient permissions: {}", error_text),
            404 => format!("resource not found: {}", error_text),
            429 => format!("rate limited: {}", error_text),
            500 => format!("registry server error: {}", error_text),
            502 | 503 => format!("registry unavailable: {}", error_text),
            _ => error_text.to_string(),
        };

        LockError::Registry {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    /// Handle manifest write errors. A 412 means the registry enforced our
    /// `If-Match` precondition and someone else wrote the tag first.
    pub fn handle_manifest_put_error(status: StatusCode, error_text: &str, reference: &str) -> LockError {
        if status == StatusCode::PRECONDITION_FAILED {
            return LockError::PreconditionFailed {
                reference: reference.to_string(),
            };
        }
        Self::handle_registry_error(status, error_text, "manifest push")
    }
}

/// Validation error utilities
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// The state file must exist and be a regular file
    pub fn validate_state_file(file_path: &Path) -> Result<()> {
        if !file_path.exists() {
            return Err(LockError::Config(format!(
                "state file does not exist: {}",
                file_path.display()
            )));
        }

        if !file_path.is_file() {
            return Err(LockError::Config(format!(
                "state path is not a file: {}",
                file_path.display()
            )));
        }

        Ok(())
    }

    /// Standard credential validation
    pub fn validate_credentials(username: &Option<String>, password: &Option<String>) -> Result<()> {
        match (username, password) {
            (Some(_), None) => Err(LockError::Config(
                "password is required when username is provided".to_string(),
            )),
            (None, Some(_)) => Err(LockError::Config(
                "username is required when password is provided".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(LockError::Config("timeout must be greater than 0".to_string()));
        }

        if timeout > 86400 {
            return Err(LockError::Config(
                "timeout cannot exceed 24 hours (86400 seconds)".to_string(),
            ));
        }

        Ok(())
    }
}
