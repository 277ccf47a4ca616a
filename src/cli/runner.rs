//! Runs one CLI command against the registry

use crate::cli::args::{Args, Command};
use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::lock::Locker;
use crate::logging::Logger;
use crate::reference::Reference;
use crate::registry::Repository;
use std::future::Future;
use std::path::Path;

/// Drive `operation` until it finishes or `shutdown` resolves. On shutdown the
/// operation is dropped along with its in-flight registry call.
pub async fn run_until<T, F, S>(operation: F, shutdown: S) -> Result<T>
where
    F: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    tokio::select! {
        result = operation => result,
        _ = shutdown => Err(LockError::Cancelled),
    }
}

pub struct Runner {
    args: Args,
    config: LockConfig,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        let config = args.to_config();
        config.validate()?;
        args.validate()?;

        let mut output = if config.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(config.verbose)
        };
        // stdout carries the state itself
        if matches!(args.command, Command::Pull { output: None, .. }) {
            output = output.with_stderr();
        }

        Ok(Self { args, config, output })
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    fn locker(&self) -> Result<Locker> {
        let reference = Reference::parse(self.args.command.reference())?;
        self.output.summary_kv(
            "Target",
            &[
                ("Registry", reference.registry.clone()),
                ("Repository", reference.repository.clone()),
                ("Tag", reference.tag.clone()),
            ],
        );

        let repository = Repository::connect(reference, &self.config, self.output.clone())?;
        Ok(Locker::new(repository, self.output.clone()).with_existence_check(self.config.existence_check))
    }

    pub async fn run(&self) -> Result<()> {
        let locker = self.locker()?;

        match &self.args.command {
            Command::Push { file, .. } => self.push(&locker, file).await?,
            Command::Lock { .. } => self.lock(&locker).await?,
            Command::Pull { output, .. } => self.pull(&locker, output.as_deref()).await?,
        }

        self.output.success(&format!(
            "Operation completed successfully in {}",
            self.output.format_duration(self.output.elapsed())
        ));
        Ok(())
    }

    async fn push(&self, locker: &Locker, file: &Path) -> Result<()> {
        self.output.section("Pushing state");
        let reader = tokio::fs::File::open(file).await?;
        let manifest = locker.push_state(reader, self.args.force).await?;
        self.output.success(&format!(
            "Published {} ({} versions), lock released",
            locker.repository().reference(),
            manifest.layers.len()
        ));
        Ok(())
    }

    async fn lock(&self, locker: &Locker) -> Result<()> {
        self.output.section("Acquiring lock");
        let manifest = locker.acquire(self.args.force).await?;
        self.output.success(&format!(
            "Locked {} ({} versions)",
            locker.repository().reference(),
            manifest.layers.len()
        ));
        Ok(())
    }

    async fn pull(&self, locker: &Locker, output: Option<&Path>) -> Result<()> {
        let Some(state) = locker.pull_state().await? else {
            self.output
                .warning(&format!("No state published for {}", locker.repository().reference()));
            return Ok(());
        };

        match output {
            Some(path) => {
                tokio::fs::write(path, &state).await?;
                self.output.info(&format!(
                    "Wrote {} to {}",
                    self.output.format_size(state.len() as u64),
                    path.display()
                ));
            }
            None => {
                use tokio::io::AsyncWriteExt;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&state).await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }
}
