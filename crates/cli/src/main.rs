mod cli;
mod config;
mod listing;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use overflow_core::{load_dotenv, Registry, SessionPolicy, Settings};
use overflow_mcp::{ProcessLauncher, ProtocolFrontend, SessionManager, StdioTransport};

use crate::cli::CliArgs;
use crate::config::CliConfig;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_dotenv();

    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Priority: CLI flag > config file > environment > default
    let config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let mut settings = Settings::from_env().context("invalid environment settings")?;
    config
        .apply(&mut settings)
        .context("invalid configuration file")?;
    if let Some(ref registry) = args.registry {
        settings.registry_path = registry.into();
    }
    settings.log_summary();

    let registry = Registry::load(&settings.registry_path)
        .context("failed to load backend registry")?;
    let launcher = Arc::new(ProcessLauncher::new(settings.shutdown_grace));
    let sessions = Arc::new(SessionManager::from_settings(launcher, &settings));
    let frontend = ProtocolFrontend::new(
        Arc::new(registry),
        Arc::new(config.exclusions()),
        Arc::clone(&sessions),
        settings.max_concurrency,
    );

    let outcome = if args.test {
        list_tools(&frontend).await
    } else {
        serve(&frontend, &sessions, &settings).await
    };

    sessions.shutdown().await;
    outcome
}

/// Serve MCP on stdin/stdout until the client closes its end.
async fn serve(
    frontend: &ProtocolFrontend,
    sessions: &Arc<SessionManager>,
    settings: &Settings,
) -> Result<ExitCode> {
    let evictor = (settings.session_policy == SessionPolicy::Pooled).then(|| {
        let sessions = Arc::clone(sessions);
        let period = (settings.pool_idle_timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                sessions.evict_idle().await;
            }
        })
    });

    let mut transport = StdioTransport::stdio();
    let result = frontend.run(&mut transport).await;

    if let Some(handle) = evictor {
        handle.abort();
    }
    result.context("MCP server loop failed")?;

    info!("Upstream client disconnected");
    Ok(ExitCode::SUCCESS)
}

/// Print the overflow catalog once. Fails if any backend could not be
/// queried.
async fn list_tools(frontend: &ProtocolFrontend) -> Result<ExitCode> {
    let catalog = frontend.overflow_catalog().await;
    let healthy = listing::write_listing(
        &catalog,
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
    )
    .context("failed to write tool listing")?;

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
