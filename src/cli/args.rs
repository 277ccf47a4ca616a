//! Command-line argument parsing

use crate::config::{DEFAULT_TIMEOUT_SECS, ExistenceCheck, LockConfig, RegistryAuth};
use crate::error::Result;
use crate::error::handlers::ValidationErrorHandler;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oci-state-lock")]
#[command(about = "Lock and publish state files stored in an OCI registry")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Allow insecure connections to registry without SSL check
    #[arg(long = "plain-http", global = true)]
    pub plain_http: bool,

    /// Overwrite an existing lock
    #[arg(long = "force", global = true)]
    pub force: bool,

    /// Registry username
    #[arg(long = "username", short = 'u', global = true)]
    pub username: Option<String>,

    /// Registry password
    #[arg(long = "password", short = 'p', global = true)]
    pub password: Option<String>,

    /// Timeout for network operations in seconds
    #[arg(long = "timeout", short = 't', global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Fail instead of initializing the tag when tag listing fails
    #[arg(long = "strict-tag-listing", global = true)]
    pub strict_tag_listing: bool,

    /// Do not send If-Match preconditions on manifest writes
    #[arg(long = "no-conditional-writes", global = true)]
    pub no_conditional_writes: bool,

    /// Enable verbose output, including request tracing
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(long = "quiet", short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a state file under registry/repository:tag and release the lock
    Push {
        /// Target reference, e.g. localhost:5000/infra/state:prod
        reference: String,
        /// Path to the local state file
        file: PathBuf,
    },
    /// Take the lock on registry/repository:tag
    Lock {
        /// Target reference
        reference: String,
    },
    /// Print the most recently published state
    Pull {
        /// Source reference
        reference: String,
        /// Write the state to a file instead of stdout
        #[arg(long = "output", short = 'o')]
        output: Option<PathBuf>,
    },
}

impl Command {
    pub fn reference(&self) -> &str {
        match self {
            Command::Push { reference, .. }
            | Command::Lock { reference }
            | Command::Pull { reference, .. } => reference,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_credentials(&self.username, &self.password)?;
        if let Command::Push { file, .. } = &self.command {
            ValidationErrorHandler::validate_state_file(file)?;
        }
        Ok(())
    }

    /// Effective configuration from flags and `OCI_LOCK_*` environment variables
    pub fn to_config(&self) -> LockConfig {
        let auth = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(RegistryAuth::new(username, password)),
            _ => None,
        };
        let existence_check = if self.strict_tag_listing {
            ExistenceCheck::Strict
        } else {
            ExistenceCheck::AssumeAbsent
        };

        LockConfig::new()
            .with_plain_http(self.plain_http)
            .with_timeout(self.timeout)
            .with_auth(auth)
            .with_existence_check(existence_check)
            .with_conditional_writes(!self.no_conditional_writes)
            .with_verbose(self.verbose)
            .with_quiet(self.quiet)
            .from_env()
    }
}
