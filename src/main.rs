//! Depot CLI
//!
//! Provision the storage layout and poke at individual primitives from the
//! command line. Every command provisions first, so running any of them
//! against a fresh backend leaves it fully set up.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use depot::models::Customer;
use depot::{FacadeConfig, Payload, StorageService, APP_NAME, APP_VERSION};

// =============================================================================
// CLI
// =============================================================================

/// Depot - storage facade over tables, blobs, queues and file shares
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(version)]
struct Cli {
    /// Backend connection string (falls back to DEPOT_CONNECTION_STRING).
    /// `memory://` state lasts for a single invocation only.
    #[arg(long, global = true)]
    connection_string: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure every table, container, queue and share exists
    Provision,

    /// Queue operations
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Blob operations
    #[command(subcommand)]
    Blob(BlobCommand),

    /// File share operations
    #[command(subcommand)]
    Share(ShareCommand),

    /// Customer table operations
    #[command(subcommand)]
    Customers(CustomersCommand),
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Send a message
    Send { queue: String, text: String },
    /// Receive and delete one message
    Receive { queue: String },
}

#[derive(Subcommand, Debug)]
enum BlobCommand {
    /// Upload a product image under a generated name
    UploadImage { path: PathBuf },
    /// Upload a payment proof under a timestamped name
    UploadProof { path: PathBuf },
    /// Delete a blob (absent blobs are ignored)
    Delete { container: String, name: String },
}

#[derive(Subcommand, Debug)]
enum ShareCommand {
    /// Upload a file under a timestamped name
    Upload {
        path: PathBuf,
        #[arg(long)]
        share: Option<String>,
        #[arg(long)]
        directory: Option<String>,
    },
    /// Download a file to a local path
    Download {
        file_name: String,
        output: PathBuf,
        #[arg(long)]
        share: Option<String>,
        #[arg(long)]
        directory: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CustomersCommand {
    /// Print every customer as JSON lines
    List,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("Depot v{}", APP_VERSION);

    let config = FacadeConfig::resolve(cli.connection_string)?;
    if config.is_ephemeral() && !matches!(cli.command, Command::Provision) {
        tracing::warn!("memory:// backend: nothing written by this run survives it");
    }
    let service = StorageService::connect(config).await?;

    match cli.command {
        Command::Provision => {
            for descriptor in service.layout().descriptors() {
                println!("{descriptor}");
            }
        }
        Command::Queue(QueueCommand::Send { queue, text }) => {
            service.send(&queue, &text).await?;
        }
        Command::Queue(QueueCommand::Receive { queue }) => match service.receive(&queue).await? {
            Some(text) => println!("{text}"),
            None => tracing::info!(queue = %queue, "Queue is empty"),
        },
        Command::Blob(BlobCommand::UploadImage { path }) => {
            let blob = service.upload_image(Payload::from_path(&path).await?).await?;
            println!("{}", blob.url);
        }
        Command::Blob(BlobCommand::UploadProof { path }) => {
            let blob = service.upload_proof(Payload::from_path(&path).await?).await?;
            println!("{}", blob.name);
        }
        Command::Blob(BlobCommand::Delete { container, name }) => {
            service.delete_blob(&container, &name).await?;
        }
        Command::Share(ShareCommand::Upload {
            path,
            share,
            directory,
        }) => {
            let share = share.unwrap_or_else(|| service.layout().documents_share.clone());
            let payload = Payload::from_path(&path).await?;
            let name = service
                .upload_file(payload, &share, directory.as_deref())
                .await?;
            println!("{name}");
        }
        Command::Share(ShareCommand::Download {
            file_name,
            output,
            share,
            directory,
        }) => {
            let share = share.unwrap_or_else(|| service.layout().documents_share.clone());
            let data = service
                .download_file(&share, &file_name, directory.as_deref())
                .await?;
            tokio::fs::write(&output, &data).await?;
            tracing::info!(output = %output.display(), size_bytes = data.len(), "Downloaded file");
        }
        Command::Customers(CustomersCommand::List) => {
            for customer in service.list::<Customer>().await? {
                println!("{}", serde_json::to_string(&customer)?);
            }
        }
    }

    Ok(())
}
