use anyhow::Context;
use clap::Parser;
use std::time::Duration;

mod cli;
mod logging;
mod task_cmd;

use cli::*;
use logging::init_tracing;
use task_cmd::handle_task_command;

use prcraft_config::{Config, ConfigLoader, ServerConfig};
use prcraft_github::{AccessGuard, GitHostFactory, GitHubClientFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    let mut config = loader.load_all(&cli.project)?;

    let (log_path, _guard) = init_tracing(config.log_level.as_deref(), cli.log_dir.as_deref())?;
    if let Some(path) = log_path {
        eprintln!("Logging to {}", path.display());
    }
    for path in loader.config_paths() {
        tracing::debug!(path = %path.display(), "config source");
    }

    match cli.command {
        Commands::Serve {
            hostname,
            port,
            cors,
        } => {
            let mut overrides = Config {
                server: Some(ServerConfig {
                    hostname,
                    port,
                    cors: None,
                }),
                ..Default::default()
            };
            if !cors.is_empty() {
                let mut origins = config.cors_origins();
                origins.extend(cors);
                if let Some(server) = overrides.server.as_mut() {
                    server.cors = Some(origins);
                }
            }
            config.merge(overrides);
            run_serve(&config).await?;
        }
        Commands::Validate { token, repo } => {
            let token = token
                .or_else(|| std::env::var("GITHUB_TOKEN").ok())
                .context("pass --token or set GITHUB_TOKEN")?;
            run_validate(&config, &token, repo.as_deref()).await?;
        }
        Commands::Task { action } => handle_task_command(&config, action).await?,
        Commands::Config => {
            for path in loader.config_paths() {
                eprintln!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        database = %config.database_path().display(),
        api = config.api_base(),
        "starting server"
    );
    prcraft_server::run_server(config).await
}

async fn run_validate(config: &Config, token: &str, repo: Option<&str>) -> anyhow::Result<()> {
    let hosts = GitHubClientFactory::new(
        config.api_base(),
        config.user_agent(),
        Duration::from_secs(config.timeout_secs()),
    )?;
    let host = hosts.connect(token)?;
    let report = AccessGuard::new(host.as_ref(), config.probe_prefix())
        .probe(repo)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
