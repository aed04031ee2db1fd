// src/main.rs — ouroboros entry point

use clap::Parser;
use std::io::Read;

use ouroboros::cli::run::{self, RunOptions};
use ouroboros::cli::{Cli, Commands, SkillsAction};
use ouroboros::infra::config::Config;
use ouroboros::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logger::init_logging(cli.log_level());

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Skills { ref action }) => match action {
            SkillsAction::List { limit } => {
                ouroboros::cli::skills::list_skills(&config, *limit).await
            }
            SkillsAction::Search { query, k } => {
                ouroboros::cli::skills::search_skills(&config, &query.join(" "), *k).await
            }
        },
        Some(Commands::Status { recent }) => {
            ouroboros::cli::status::show_status(&config, recent).await
        }
        None => {
            let objectives = collect_objectives(&cli)?;
            let options = RunOptions {
                budget: cli.budget(&config),
                constraints: cli.constraints.clone(),
                category: cli.category.clone(),
                continuous: cli.continuous,
                ephemeral: cli.ephemeral,
                quiet: cli.quiet,
            };
            run::run_tasks(objectives, options, &config).await
        }
    }
}

/// Objectives from --tasks-file, --stdin, or the positional words, in that order.
fn collect_objectives(cli: &Cli) -> anyhow::Result<Vec<String>> {
    if let Some(ref path) = cli.tasks_file {
        return run::load_task_list(path);
    }
    if cli.stdin {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        let trimmed = input.trim();
        return Ok(if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        });
    }
    Ok(cli.objective().into_iter().collect())
}
