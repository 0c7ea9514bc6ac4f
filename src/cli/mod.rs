//! Command Line Interface (CLI) layer for covermap.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the `run`, `composite`,
//! `validate`, `legend` and `init-config` subcommands. It wires
//! user-provided options to the library functionality exposed via
//! `covermap::api`.
//!
//! If you are embedding covermap into another application, prefer using
//! the high-level `covermap::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
