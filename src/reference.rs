//! Registry reference parsing
//!
//! A lockable resource is addressed as `registry/repository:tag`, for example
//! `localhost:5000/infra/state:prod`. The tag is the unit of mutual exclusion.

use crate::error::{LockError, Result};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl Reference {
    pub fn new(registry: impl Into<String>, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse `registry/repository[:tag]`. A missing tag parses to an empty one;
    /// operations that need a tag reject it later.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        if input.contains('@') {
            return Err(LockError::InvalidReference(format!(
                "{}: digest references cannot be locked, use a tag",
                input
            )));
        }

        let (registry, path) = input.split_once('/').ok_or_else(|| {
            LockError::InvalidReference(format!(
                "{}: expected registry/repository:tag",
                input
            ))
        })?;

        if registry.is_empty() {
            return Err(LockError::InvalidReference(format!("{}: registry is empty", input)));
        }

        // The tag separator is the last ':' after the last '/'
        let last_slash = path.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (repository, tag) = match path[last_slash..].rfind(':') {
            Some(pos) => (&path[..last_slash + pos], &path[last_slash + pos + 1..]),
            None => (path, ""),
        };

        Self::validate_repository(repository)?;
        if !tag.is_empty() {
            Self::validate_tag(tag)?;
        }

        Ok(Self::new(registry, repository, tag))
    }

    fn validate_repository(repository: &str) -> Result<()> {
        if repository.is_empty() {
            return Err(LockError::InvalidReference("repository name cannot be empty".to_string()));
        }
        let valid = repository.split('/').all(|component| {
            !component.is_empty()
                && component
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        });
        if !valid {
            return Err(LockError::InvalidReference(format!(
                "invalid repository name: {}",
                repository
            )));
        }
        Ok(())
    }

    fn validate_tag(tag: &str) -> Result<()> {
        let mut chars = tag.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !first_ok || !rest_ok || tag.len() > 128 {
            return Err(LockError::InvalidReference(format!("invalid tag: {}", tag)));
        }
        Ok(())
    }

    /// Registry base URL, `http` only when plain HTTP was requested
    pub fn base_url(&self, plain_http: bool) -> Result<Url> {
        let scheme = if plain_http { "http" } else { "https" };
        Ok(Url::parse(&format!("{}://{}/", scheme, self.registry))?)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}/{}", self.registry, self.repository)
        } else {
            write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
        }
    }
}

impl std::str::FromStr for Reference {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
