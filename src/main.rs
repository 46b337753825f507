mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loam")]
#[command(about = "Hybrid retrieval for markdown note vaults", long_about = None)]
#[command(version)]
struct Cli {
    /// Vault root (defaults to the current directory)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the vault
    Search {
        query: String,
        #[arg(short = 'k', long, default_value_t = 10, help = "Result cap")]
        limit: usize,
        #[arg(long, help = "Skip the semantic stage")]
        no_semantic: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    /// Manage the persistent chunk index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show vault statistics
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the whole index
    Build,
    /// Re-embed one note after an edit
    Update { path: String },
    /// Delete all partitions
    Clear,
    /// Record and partition counts
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let vault = match cli.vault {
        Some(vault) => vault,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Search {
            query,
            limit,
            no_semantic,
            json,
        } => commands::search::run(&vault, &query, limit, no_semantic, json).await,

        Commands::Index { action } => match action {
            IndexAction::Build => commands::index::build(&vault).await,
            IndexAction::Update { path } => commands::index::update(&vault, &path).await,
            IndexAction::Clear => commands::index::clear(&vault).await,
            IndexAction::Status { json } => commands::index::status(&vault, json).await,
        },

        Commands::Status { json } => commands::status::run(&vault, json),
    }
}
