use oci_state_lock::cli::{Args, Runner, run_until, shutdown_signal};
use oci_state_lock::error::Result;
use oci_state_lock::logging::Logger;
use std::process::ExitCode;

async fn run(args: Args) -> Result<()> {
    let runner = Runner::new(args)?;
    run_until(runner.run(), shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            Logger::default().error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
