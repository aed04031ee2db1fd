// src/cli/mod.rs — CLI definition (clap derive)

pub mod progress;
pub mod run;
pub mod skills;
pub mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::budget::Budget;
use crate::infra::config::Config;

#[derive(Parser)]
#[command(
    name = "ouroboros",
    about = "Adversarial build/attack/judge loop that learns reusable skills",
    version
)]
pub struct Cli {
    /// Task objective (default command when no subcommand given)
    #[arg(trailing_var_arg = true)]
    pub task: Vec<String>,

    /// Constraint the solution must satisfy (repeatable)
    #[arg(short = 'c', long = "constraint")]
    pub constraints: Vec<String>,

    /// Category recorded on skills learned from this task
    #[arg(long)]
    pub category: Option<String>,

    /// Max attempts per cycle (overrides [budget].max_attempts)
    #[arg(short = 'n', long)]
    pub max_attempts: Option<u32>,

    /// Max spend per cycle in USD (overrides [budget].max_spend_usd)
    #[arg(long)]
    pub max_spend: Option<f64>,

    /// Wall-clock deadline per cycle in seconds (overrides [budget].deadline_seconds)
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Keep running cycles until Ctrl-C (self-generated tasks when none given)
    #[arg(long = "loop")]
    pub continuous: bool,

    /// File with one task objective per line
    #[arg(long)]
    pub tasks_file: Option<PathBuf>,

    /// Keep learned skills in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Suppress progress output (only emit the solution)
    #[arg(long)]
    pub quiet: bool,

    /// Read task from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Log at info level (RUST_LOG still wins)
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect the skill library
    Skills {
        #[command(subcommand)]
        action: SkillsAction,
    },
    /// Show lifetime cycle history and spend
    Status {
        /// Number of recent cycles to list
        #[arg(long, default_value = "10")]
        recent: u32,
    },
}

#[derive(Subcommand, Clone)]
pub enum SkillsAction {
    /// List stored skills, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Find skills similar to a query
    Search {
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
        /// Number of results (defaults to [retrieval].top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },
}

impl Cli {
    /// Configured budget with command-line overrides applied.
    pub fn budget(&self, config: &Config) -> Budget {
        let mut budget = Budget::from(&config.budget);
        if let Some(n) = self.max_attempts {
            budget = budget.with_max_attempts(n);
        }
        if let Some(usd) = self.max_spend {
            budget = budget.with_max_spend(usd);
        }
        if let Some(secs) = self.deadline {
            budget = budget.with_deadline(Duration::from_secs(secs));
        }
        budget
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    /// Objective from the positional words, if any were given.
    pub fn objective(&self) -> Option<String> {
        let joined = self.task.join(" ");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
