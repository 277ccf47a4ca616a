//! Command line interface module
//!
//! Argument parsing, validation, and the runner that executes one command.

pub mod args;
pub mod runner;
pub mod signal;

pub use args::{Args, Command};
pub use runner::{Runner, run_until};
pub use signal::shutdown_signal;
