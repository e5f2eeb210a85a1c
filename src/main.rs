use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use std::io;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vsproj_watch::capabilities::TracingLog;
use vsproj_watch::cli::Cli;
use vsproj_watch::config::Settings;
use vsproj_watch::sync::{Capabilities, SyncEngine};
use vsproj_watch::watch::NotifyWatchSource;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        print_completions(shell, &mut cmd);
        return Ok(());
    }

    init_tracing(cli.log_filter());

    let settings = match cli.config.clone().or_else(Settings::default_path) {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };

    let capabilities = Capabilities::default().with_log(Arc::new(TracingLog));
    let engine = SyncEngine::new(NotifyWatchSource::new(), settings)
        .with_capabilities(capabilities);

    let running = engine.start(&cli.watch_config())?;
    running.wait().context("Watcher stopped unexpectedly")?;
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
