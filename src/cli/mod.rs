//! CLI module for goalrun - command-line interface and event rendering.
//!
//! Provides the subcommands for running and resuming goal runs, plus listings
//! of goals, tools, checkpoints and finished runs.

pub mod commands;
pub mod render;

pub use commands::Cli;
