use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tokio::fs;

use replistore::engine::CopyStatus;
use replistore::{Config, FileId, OwnerId, ReplicaStore, StoreOutcome};

#[derive(Parser)]
#[command(name = "replistore")]
#[command(about = "Chunked file store with synchronous replication across local nodes", long_about = None)]
pub struct Cli {
    /// TOML configuration; overrides --base-dir
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the catalog and the default three nodes
    #[arg(short, long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file to storage
    Upload {
        #[arg(short, long)]
        file: PathBuf,

        /// Owner recorded with the file
        #[arg(short, long)]
        owner: Option<String>,

        /// Display name, defaults to the file's own name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download a file from storage
    Download {
        #[arg(short = 'i', long = "file-id")]
        file_id: FileId,

        /// Defaults to the final component of the stored name, in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List files in storage
    List,

    /// Show chunk copies grouped by node
    Nodes,

    /// Verify every copy of a file's chunks
    Audit {
        #[arg(short = 'i', long = "file-id")]
        file_id: FileId,
    },

    /// Delete a file from storage
    Delete {
        #[arg(short = 'i', long = "file-id")]
        file_id: FileId,
    },
}

impl Cli {
    pub async fn load_config(&self) -> anyhow::Result<Config> {
        match (&self.config, &self.base_dir) {
            (Some(path), _) => Config::load(path)
                .await
                .with_context(|| format!("loading config from {}", path.display())),
            (None, Some(base)) => Ok(Config::with_base_dir(base)),
            (None, None) => Ok(Config::with_base_dir(Config::default_base_dir())),
        }
    }
}

pub async fn execute_command(storage: &ReplicaStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { file, owner, name } => {
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let owner = owner.map(OwnerId);
            let reader = fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;

            match storage.store(&name, owner.as_ref(), reader).await? {
                StoreOutcome::Stored(id) => println!("stored {} as {}", name, id),
                StoreOutcome::Duplicate(id) => println!("duplicate of {}, nothing stored", id),
            }
        }
        Commands::Download { file_id, output } => {
            let output = match output {
                Some(output) => output,
                None => PathBuf::from(file_name(Path::new(&storage.get_file(&file_id).await?.name))?),
            };
            let data = storage.retrieve(&file_id).await?;

            let partial = output.with_extension("download");
            fs::write(&partial, &data).await?;
            fs::rename(&partial, &output).await?;
            println!("{} bytes written to {}", data.len(), output.display());
        }
        Commands::List => {
            for file in storage.list_files().await? {
                let owner = file.owner.as_ref().map(|o| o.0.as_str()).unwrap_or("-");
                let state = if file.is_committed() { "" } else { " (pending)" };
                println!(
                    "{}  {}  {} bytes  {}  owner={}  sha256={}{}",
                    file.id,
                    file.name,
                    file.size,
                    file.created_at.format("%Y-%m-%d %H:%M:%S"),
                    owner,
                    file.checksum,
                    state
                );
            }
        }
        Commands::Nodes => {
            for usage in storage.chunks_by_node().await? {
                let root = usage
                    .root
                    .as_ref()
                    .map(|r| r.display().to_string())
                    .unwrap_or_else(|| "unregistered".to_string());
                println!("{} ({}): load {}, {} copies", usage.node, root, usage.load, usage.chunks.len());
                for chunk in usage.chunks {
                    println!("  {} chunk {} [{}] {}", chunk.file_id, chunk.index, chunk.role, chunk.path.display());
                }
            }
        }
        Commands::Audit { file_id } => {
            let audit = storage.audit(&file_id).await?;
            for chunk in &audit.chunks {
                for copy in &chunk.copies {
                    let status = match copy.status {
                        CopyStatus::Intact => "ok",
                        CopyStatus::Missing => "MISSING",
                        CopyStatus::Corrupt => "CORRUPT",
                    };
                    let marker = if chunk.selected.as_ref() == Some(&copy.chunk) { "*" } else { " " };
                    println!("{}chunk {} {} on {}: {}", marker, chunk.index, copy.chunk.role, copy.node, status);
                }
            }
            if audit.is_healthy() {
                println!("{}: healthy", audit.file.name);
            } else if audit.is_recoverable() {
                println!("{}: degraded, {} damaged copies", audit.file.name, audit.damaged_copies());
            } else {
                return Err(anyhow!("{}: unrecoverable", audit.file.name));
            }
        }
        Commands::Delete { file_id } => {
            storage.delete(&file_id).await?;
            println!("deleted {}", file_id);
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid filename: {}", path.display()))
}
