use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use gcsfs::cadapter::localfs::LocalFsBackend;
use gcsfs::meta::SqliteRecordStore;
use gcsfs::{FileStat, Gcsfs, GcsfsConfig, OpenMode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "gcsfs", version, about = "Bucket-backed file operations with a metadata cache")]
struct Cli {
    /// YAML configuration file; gcsfs.yml / /etc/gcsfs/config.yml when unset
    #[arg(short, long, env = "GCSFS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Serve the bucket from a local directory instead of the S3 endpoint
    #[arg(long, env = "GCSFS_LOCAL_ROOT", global = true)]
    local: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show file or directory status
    Stat { uri: String },
    /// List the immediate children of a directory
    Ls { uri: String },
    /// Print an object to stdout
    Cat { uri: String },
    /// Upload a local file
    Put { src: PathBuf, uri: String },
    /// Delete objects
    Rm {
        #[arg(required = true)]
        uris: Vec<String>,
    },
    /// Rename an object
    Mv { from: String, to: String },
    /// Create a directory
    Mkdir {
        uri: String,
        #[arg(short, long)]
        parents: bool,
    },
    /// Remove an empty directory
    Rmdir { uri: String },
    /// Show the cached metadata record
    Info { uri: String },
    /// Print the public URL of an object
    Url { uri: String },
}

fn load_config(cli: &Cli) -> Result<GcsfsConfig> {
    match (&cli.config, &cli.local) {
        (Some(path), _) => GcsfsConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        (None, Some(_)) => Ok(GcsfsConfig::from_default_path().unwrap_or_else(|_| GcsfsConfig {
            bucket_name: "local".to_string(),
            ..Default::default()
        })),
        (None, None) => Ok(GcsfsConfig::from_default_path()?),
    }
}

async fn build(cli: &Cli) -> Result<Gcsfs> {
    let config = load_config(cli)?;
    let Some(root) = &cli.local else {
        return Ok(Gcsfs::connect(config).await?);
    };

    config.validate()?;
    let db = root.join(".gcsfs-metadata.db");
    tokio::fs::create_dir_all(root).await?;
    let store = SqliteRecordStore::connect(&format!("sqlite://{}?mode=rwc", db.display())).await?;
    info!(root = %root.display(), "using local directory backend");
    Ok(Gcsfs::with_backend(
        Arc::new(config),
        Arc::new(LocalFsBackend::new(root)),
        Arc::new(store),
    ))
}

fn print_stat(uri: &str, stat: &FileStat) {
    let kind = if stat.is_dir() { "directory" } else { "file" };
    println!("{uri}: {kind} mode={:o} size={} mtime={}", stat.mode, stat.size, stat.mtime);
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let fs = build(&cli).await?;

    match &cli.command {
        Commands::Stat { uri } => match fs.stat(uri).await? {
            Some(stat) => print_stat(uri, &stat),
            None => return Err(anyhow!("{uri}: no such file or directory")),
        },
        Commands::Ls { uri } => {
            for name in fs.list_directory(uri).await? {
                println!("{name}");
            }
        }
        Commands::Cat { uri } => {
            let mut handle = fs.open(uri, OpenMode::Read).await?;
            let data = handle.read_to_end()?;
            handle.close().await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Commands::Put { src, uri } => {
            let data = tokio::fs::read(src)
                .await
                .with_context(|| format!("failed to read {}", src.display()))?;
            let mut handle = fs.open(uri, OpenMode::Write).await?;
            handle.write(&data)?;
            handle.close().await?;
            println!("{uri}: {} bytes", data.len());
        }
        Commands::Rm { uris } => {
            futures::future::try_join_all(uris.iter().map(|uri| fs.unlink(uri))).await?;
        }
        Commands::Mv { from, to } => {
            fs.rename(from, to).await?;
        }
        Commands::Mkdir { uri, parents } => {
            fs.mkdir(uri, *parents).await?;
        }
        Commands::Rmdir { uri } => {
            if !fs.rmdir(uri).await? {
                return Err(anyhow!("{uri}: directory not empty"));
            }
        }
        Commands::Info { uri } => match fs.get_file_info(uri).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => return Err(anyhow!("{uri}: not found")),
        },
        Commands::Url { uri } => match fs.external_url(uri).await? {
            Some(url) => println!("{url}"),
            None => return Err(anyhow!("{uri}: no public URL")),
        },
    }
    Ok(())
}
