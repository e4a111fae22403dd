//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: create and drive a run to completion
//! - resume: continue a checkpointed run with a human decision
//! - goals / tools: list what a run can use
//! - checkpoints / history: inspect persisted runs

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Goalrun - iterate an agent against a goal until it is met
#[derive(Parser, Debug)]
#[command(name = "goalrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a run against a goal and follow it until it ends
    Run {
        /// Goal name (see `goalrun goals`)
        goal: String,

        /// Project directory the run works in
        #[arg(short = 'C', long, default_value = ".")]
        cwd: PathBuf,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Iteration budget override
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Pause for approval after every unsuccessful iteration
        #[arg(long)]
        hitl: bool,

        /// Explicit run id
        #[arg(long)]
        run_id: Option<String>,

        /// Append every event to this JSONL file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// Continue a suspended run from its checkpoint
    #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
    Resume {
        /// Run ID to resume
        run_id: String,

        /// Approve another iteration
        #[arg(long)]
        approve: bool,

        /// Reject and end the run
        #[arg(long)]
        reject: bool,

        /// Append every event to this JSONL file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// List registered goals
    Goals,

    /// List available tools
    Tools,

    /// List suspended runs waiting for a decision
    Checkpoints,

    /// Show finished runs, newest first
    History {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}
