use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use goalrun::domain::{HumanDecision, RunConfig, RunStatus};
use goalrun::events::{Subscription, spawn_event_log};
use goalrun::llm::AnthropicReasoner;
use goalrun::manager::{RunManager, RunSnapshot};
use goalrun::storage::{CheckpointStore, FileCheckpointStore, HistoryStore};
use tokio::task::JoinHandle;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use cli::render::{render_checkpoint, render_event, render_record};
use config::Config;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("goalrun")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("goalrun.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the config level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_manager(config: &Config) -> Result<RunManager> {
    let reasoner = AnthropicReasoner::new(config.anthropic_config()).context("Failed to create reasoner")?;
    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_dir).context("Failed to open checkpoint store")?;
    let history = HistoryStore::new(&config.storage.history_dir).context("Failed to open history store")?;

    Ok(RunManager::new(
        Arc::new(reasoner),
        config.goal_registry(),
        config.tool_registry(),
        config.run_manager_config(),
    )
    .with_safety(config.safety_guard())
    .with_checkpoint_store(Arc::new(checkpoints))
    .with_history_store(Arc::new(history)))
}

fn spawn_renderer(mut subscription: Subscription, verbose: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if let Some(line) = render_event(&event, verbose) {
                println!("{}", line);
            }
        }
        if subscription.dropped() > 0 {
            println!("{}", format!("({} events not shown)", subscription.dropped()).dimmed());
        }
    })
}

async fn prompt_decision(snapshot: &RunSnapshot) -> Result<HumanDecision> {
    println!();
    println!(
        "{} iteration {}/{}: {}",
        "Waiting for approval".yellow().bold(),
        snapshot.iteration,
        snapshot.config.max_iterations,
        snapshot.goal_reason.lines().next().unwrap_or("")
    );
    print!("Continue? [y/N] ");
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(HumanDecision::from_text(&line))
}

/// Follow a run until it is terminal, answering human checks from stdin.
/// Ctrl-C aborts the run.
async fn follow(manager: &RunManager, run_id: &str) -> Result<RunStatus> {
    loop {
        let status = tokio::select! {
            status = manager.wait(run_id) => status?,
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupted, aborting run...".yellow());
                if let Err(e) = manager.abort(run_id).await {
                    log::warn!("abort after interrupt failed: {}", e);
                }
                continue;
            }
        };
        if status != RunStatus::Suspended {
            return Ok(status);
        }

        let snapshot = manager.get(run_id).await?;
        let decision = prompt_decision(&snapshot).await?;
        manager.resume(run_id, decision).await?;
    }
}

/// Attach observers, apply `launch`, then follow the run to the end
async fn observe(
    manager: &RunManager,
    run_id: &str,
    event_log: Option<&Path>,
    verbose: bool,
    launch: impl AsyncFnOnce(&RunManager) -> goalrun::Result<()>,
) -> Result<RunStatus> {
    let renderer = spawn_renderer(manager.subscribe(run_id).await?, verbose);
    let recorder = match event_log {
        Some(path) => Some(spawn_event_log(manager.subscribe(run_id).await?, path)),
        None => None,
    };

    launch(manager).await?;
    let status = follow(manager, run_id).await?;

    renderer.await?;
    if let Some(recorder) = recorder {
        let written = recorder.await??;
        info!("wrote {} events for run {}", written, run_id);
    }
    Ok(status)
}

#[allow(clippy::too_many_arguments)]
async fn handle_run_command(
    cli: &Cli,
    config: &Config,
    goal: &str,
    cwd: &Path,
    model: Option<&str>,
    max_iterations: Option<u32>,
    hitl: bool,
    run_id: Option<&str>,
    event_log: Option<&Path>,
) -> Result<RunStatus> {
    let cwd = fs::canonicalize(cwd).context(format!("Invalid working directory {}", cwd.display()))?;
    let mut run_config = RunConfig::new(goal, cwd)
        .with_model(model.unwrap_or(&config.llm.model))
        .with_max_iterations(max_iterations.unwrap_or(config.run.max_iterations))
        .with_human_in_the_loop(hitl || config.run.human_in_the_loop);
    if let Some(id) = run_id {
        run_config = run_config.with_run_id(id);
    }

    let manager = build_manager(config)?;
    let id = manager.create(run_config).await?;
    println!("{} {} ({})", "Starting run".green().bold(), id.bold(), goal);
    info!("Starting run {} for goal {}", id, goal);

    observe(&manager, &id, event_log, cli.is_verbose(), async |m: &RunManager| m.start(&id).await).await
}

async fn handle_resume_command(
    cli: &Cli,
    config: &Config,
    run_id: &str,
    decision: HumanDecision,
    event_log: Option<&Path>,
) -> Result<RunStatus> {
    let manager = build_manager(config)?;
    manager.restore(run_id).await?;
    println!("{} {} ({})", "Resuming run".green().bold(), run_id.bold(), decision.as_str());
    info!("Resuming run {} with {}", run_id, decision.as_str());

    observe(&manager, run_id, event_log, cli.is_verbose(), async |m: &RunManager| {
        m.resume(run_id, decision).await
    })
    .await
}

fn handle_goals_command(config: &Config) {
    for name in config.goal_registry().names() {
        println!("{}", name);
    }
}

fn handle_tools_command(config: &Config) {
    for definition in config.tool_registry().definitions() {
        println!("{:<16} {}", definition.name.bold(), definition.description);
    }
}

fn handle_checkpoints_command(config: &Config) -> Result<()> {
    let store = FileCheckpointStore::new(&config.storage.checkpoint_dir)?;
    let checkpoints = store.list()?;
    if checkpoints.is_empty() {
        println!("{}", "No suspended runs".dimmed());
    }
    for checkpoint in &checkpoints {
        println!("{}", render_checkpoint(checkpoint));
    }
    Ok(())
}

fn handle_history_command(config: &Config, limit: usize) -> Result<()> {
    let store = HistoryStore::new(&config.storage.history_dir)?;
    let records = store.recent(limit)?;
    if records.is_empty() {
        println!("{}", "No finished runs".dimmed());
    }
    for record in &records {
        println!("{}", render_record(record));
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<Option<RunStatus>> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            goal,
            cwd,
            model,
            max_iterations,
            hitl,
            run_id,
            event_log,
        } => handle_run_command(
            cli,
            config,
            goal,
            cwd,
            model.as_deref(),
            *max_iterations,
            *hitl,
            run_id.as_deref(),
            event_log.as_deref(),
        )
        .await
        .map(Some),
        Commands::Resume {
            run_id,
            approve,
            event_log,
            ..
        } => {
            let decision = if *approve {
                HumanDecision::Approve
            } else {
                HumanDecision::Reject
            };
            handle_resume_command(cli, config, run_id, decision, event_log.as_deref())
                .await
                .map(Some)
        }
        Commands::Goals => {
            handle_goals_command(config);
            Ok(None)
        }
        Commands::Tools => {
            handle_tools_command(config);
            Ok(None)
        }
        Commands::Checkpoints => handle_checkpoints_command(config).map(|_| None),
        Commands::History { limit } => handle_history_command(config, *limit).map(|_| None),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let status = runtime
        .block_on(run_application(&cli, &config))
        .context("Application failed")?;

    // Anything but an achieved run is a failing exit
    if let Some(status) = status
        && status != RunStatus::Achieved
    {
        drop(runtime);
        std::process::exit(1);
    }
    Ok(())
}
