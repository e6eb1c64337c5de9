//! # Knowledge Index CLI (`kidx`)
//!
//! Manages the lifecycle of a file-backed semantic index and queries it.
//!
//! ## Usage
//!
//! ```bash
//! kidx --config ./config/kidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kidx info` | Collection status and knowledge file listing |
//! | `kidx rebuild [--force]` | Rebuild the index from the knowledge directory |
//! | `kidx backup` | Copy the index storage to a timestamped sibling |
//! | `kidx restore -b <path>` | Replace the index storage with a backup |
//! | `kidx delete [--confirm]` | Remove the index storage |
//! | `kidx collections` | List collections in the index |
//! | `kidx query "<question>"` | Retrieve relevant passages |

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use knowledge_index::config::{self, Config};
use knowledge_index::embedding::create_embedder;
use knowledge_index::manager::{CollectionInfo, IndexManager, IndexSettings, RebuildOutcome};
use knowledge_index::retriever::{RetrievalParams, Retriever};
use knowledge_index::store::SqliteIndex;

/// Knowledge index manager: build, inspect, back up and query a semantic
/// index over a directory of text files.
#[derive(Parser)]
#[command(
    name = "kidx",
    about = "Build, maintain and query a file-backed semantic knowledge index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/kidx.toml")]
    config: PathBuf,

    /// Directory containing knowledge text files.
    #[arg(long = "knowledge-dir", short = 'k', global = true)]
    knowledge_dir: Option<PathBuf>,

    /// Directory for the vector index.
    #[arg(long = "db-path", short = 'd', global = true)]
    db_path: Option<PathBuf>,

    /// Collection name.
    #[arg(long, short = 'c', global = true)]
    collection: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show collection status and the knowledge files it is built from.
    Info,

    /// Rebuild the index from the knowledge directory.
    ///
    /// Without `--force` the rebuild is skipped when no source file changed
    /// since the last successful build.
    Rebuild {
        /// Rebuild even if the index is up to date.
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Copy the index storage to `<db-path>_backup_<timestamp>`.
    Backup,

    /// Replace the index storage with a backup.
    Restore {
        /// Path to the backup directory.
        #[arg(long = "backup-path", short = 'b')]
        backup_path: PathBuf,
    },

    /// Delete the index storage.
    Delete {
        /// Skip the confirmation prompt.
        #[arg(long)]
        confirm: bool,
    },

    /// List all collections in the index.
    Collections,

    /// Retrieve passages relevant to a question.
    Query {
        /// The question to search for.
        question: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,knowledge_index=info",
        1 => "info,knowledge_index=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = config::load_config(&cli.config, true)?;
    if let Some(dir) = &cli.knowledge_dir {
        cfg.knowledge.dir = dir.clone();
    }
    if let Some(path) = &cli.db_path {
        cfg.index.path = path.clone();
    }
    if let Some(name) = &cli.collection {
        cfg.index.collection = name.clone();
    }
    config::validate(&cfg)?;
    Ok(cfg)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = resolve_config(&cli)?;

    let embedder = create_embedder(&cfg.embedding)?;
    let index = Arc::new(SqliteIndex::in_dir(&cfg.index.path));
    let manager = Arc::new(IndexManager::new(
        IndexSettings::from_config(&cfg),
        embedder,
        index,
    ));

    match cli.command {
        Commands::Info => run_info(&manager).await?,
        Commands::Rebuild { force } => {
            println!("Rebuilding index at {}...", cfg.index.path.display());
            let report = manager.rebuild(force).await;
            for skipped in &report.skipped_files {
                println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            match report.outcome {
                RebuildOutcome::Failed(ref e) => anyhow::bail!("{}", e),
                _ => {
                    println!("{}", report.message());
                    println!("Time taken: {:.2} seconds", report.elapsed.as_secs_f64());
                }
            }
        }
        Commands::Backup => {
            println!("Creating index backup...");
            let backup = manager.backup().await?;
            println!("Backup created at {}", backup.backup_path.display());
        }
        Commands::Restore { backup_path } => {
            println!("Restoring index from {}...", backup_path.display());
            let restored = manager.restore(&backup_path).await?;
            println!(
                "Index restored from {} ({} files)",
                restored.restored_from.display(),
                restored.files_copied
            );
        }
        Commands::Delete { confirm } => {
            if !confirm && !prompt_yes_no(&format!(
                "Are you sure you want to delete the index at {}? (y/N): ",
                cfg.index.path.display()
            ))? {
                println!("Deletion cancelled.");
                return Ok(());
            }
            let deleted = manager.delete().await?;
            if deleted.deleted {
                println!("Index at {} has been deleted", deleted.path.display());
            } else {
                println!("Index at {} does not exist", deleted.path.display());
            }
        }
        Commands::Collections => {
            let names = manager.list_collections().await;
            println!("=== Collections ===");
            if names.is_empty() {
                println!("No collections found.");
            }
            for (i, name) in names.iter().enumerate() {
                println!("{}. {}", i + 1, name);
            }
        }
        Commands::Query { question } => {
            let retriever = Retriever::new(manager, RetrievalParams::from_config(&cfg.retrieval));
            let retrieval = retriever.retrieve(&question).await?;
            println!("{}", knowledge_index::retriever::render(&retrieval));
        }
    }

    Ok(())
}

async fn run_info(manager: &IndexManager) -> anyhow::Result<()> {
    let info = manager.info(None).await;
    println!("=== Knowledge Index Info ===");
    println!("Collection: {}", info.name());
    println!("Status: {}", info.status());
    match &info {
        CollectionInfo::Active {
            record_count,
            vector_size,
            ..
        } => {
            println!("Vector count: {}", record_count);
            println!("Vector size: {}", vector_size);
        }
        CollectionInfo::NotFound { error, .. } => println!("Error: {}", error),
    }
    if let Some(built) = manager.last_build_time() {
        println!("Last build: {}", format_local(built));
    }

    let dir = &manager.settings().knowledge_dir;
    println!();
    println!("Knowledge directory: {}", dir.display());
    match manager.knowledge_files() {
        Ok(files) => {
            println!("Text files: {}", files.len());
            for file in files {
                println!(
                    " - {} ({:.1} KB, modified: {})",
                    file.filename,
                    file.byte_size as f64 / 1024.0,
                    format_local(file.modified_time)
                );
            }
        }
        Err(e) => println!("Error: {}", e),
    }
    Ok(())
}

fn format_local(secs: f64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| secs.to_string())
}

fn prompt_yes_no(question: &str) -> anyhow::Result<bool> {
    print!("{}", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
