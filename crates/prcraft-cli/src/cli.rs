use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prcraft")]
#[command(about = "Publish AI task patches as GitHub pull requests", long_about = None)]
pub(crate) struct Cli {
    /// Directory searched for `prcraft.json{c}` and `.prcraft/`.
    #[arg(long, global = true, default_value = ".")]
    pub(crate) project: PathBuf,
    /// Write logs to a timestamped file in this directory instead of stderr.
    #[arg(long = "log-dir", global = true)]
    pub(crate) log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    #[command(about = "Start the HTTP server")]
    Serve {
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        cors: Vec<String>,
    },
    #[command(about = "Check what a GitHub token can do")]
    Validate {
        /// Falls back to `GITHUB_TOKEN`.
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        repo: Option<String>,
    },
    #[command(about = "Manage stored tasks")]
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },
    #[command(about = "Print the merged configuration")]
    Config,
}

#[derive(Subcommand)]
pub(crate) enum TaskCommands {
    #[command(about = "Import tasks from a JSON file (one object or an array)")]
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Owner recorded on every imported task.
        #[arg(long)]
        user: Option<String>,
    },
    #[command(about = "List a user's tasks")]
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        project_id: Option<i64>,
    },
}
