use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use view_data_client::api_client::{BucketCreationData, Manifest};
use view_data_client::{urn, CancellationToken, ClientConfig, ItemKind, PollOutcome, ViewDataClient};

#[derive(Parser)]
#[command(name = "view-data")]
#[command(about = "Upload, translate and download models with the View & Data API")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request an access token and print it
    Token,

    /// Show the configured bucket
    Bucket {
        /// Create the bucket (transient policy) if it does not exist
        #[arg(long)]
        create: bool,
    },

    /// List buckets
    Buckets,

    /// Upload a file to the configured bucket
    Upload {
        file: PathBuf,

        /// Object key (defaults to the file name)
        #[arg(long)]
        key: Option<String>,

        /// Upload in chunks
        #[arg(long)]
        resumable: bool,
    },

    /// Register a model URN for translation
    Register {
        urn: String,

        /// Translate again even if derivatives exist
        #[arg(long)]
        force: bool,
    },

    /// Print the current translation status
    Status { urn: String },

    /// Wait for a translation to finish
    Wait { urn: String },

    /// Save the thumbnail of a translated model
    Thumbnail {
        urn: String,
        output: PathBuf,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,
    },

    /// Download all derivatives of a translated model
    Download {
        urn: String,

        /// Target directory (defaults to DOWNLOAD_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Bucket, resumable upload, register, wait, thumbnail and download in one go
    Workflow { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "view_data_client=info,view_data=info,poll_until=info".into()),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Service: {}", config.base_url);

    let client = ViewDataClient::new(config).context("Failed to create API client")?;

    // Ctrl-C cancels an in-flight translation wait
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match args.command {
        Command::Token => {
            let token = client.get_token().await?;
            println!("{}", serde_json::to_string_pretty(&token)?);
        }
        Command::Bucket { create } => {
            let bucket_key = bucket_key(&client)?;
            let details = client
                .get_bucket(&bucket_key, create, &BucketCreationData::transient(&bucket_key))
                .await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Buckets => {
            for bucket in client.list_buckets().await? {
                println!("{}", bucket.bucket_key);
            }
        }
        Command::Upload { file, key, resumable } => {
            let urn = upload(&client, &file, key, resumable).await?;
            println!("{}", urn);
        }
        Command::Register { urn, force } => {
            let response = client.register(&urn, force).await?;
            println!("{}", response.result);
        }
        Command::Status { urn } => {
            let manifest = client.get_status(&urn).await?;
            println!("{} ({})", manifest.status, manifest.progress);
        }
        Command::Wait { urn } => {
            wait(&client, &urn, &cancel).await?;
        }
        Command::Thumbnail {
            urn,
            output,
            width,
            height,
        } => {
            let bytes = client.get_thumbnail(&urn, width, height).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Thumbnail size: {} bytes", bytes.len());
        }
        Command::Download { urn, dir } => {
            let dir = dir.unwrap_or_else(|| client.config().download_dir.clone());
            download(&client, &urn, &dir).await?;
        }
        Command::Workflow { file } => {
            workflow(&client, &file, &cancel).await?;
        }
    }

    Ok(())
}

fn bucket_key(client: &ViewDataClient) -> Result<String> {
    let key = client.config().default_bucket_key.clone();
    if key.is_empty() {
        anyhow::bail!("FORGE_BUCKET_KEY must be set for this command");
    }
    Ok(key)
}

/// Upload `file` to the configured bucket and return its URN
async fn upload(
    client: &ViewDataClient,
    file: &Path,
    key: Option<String>,
    resumable: bool,
) -> Result<String> {
    let bucket_key = bucket_key(client)?;
    let object_key = match key {
        Some(key) => key,
        None => file
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .context("Cannot derive object key from file name, pass --key")?,
    };

    let object_id = if resumable {
        let upload = client.resumable_upload(file, &bucket_key, &object_key).await?;
        info!("Uploaded {} chunk(s)", upload.chunks.len());
        upload
            .object()
            .map(|object| object.id.clone())
            .context("Resumable upload finished without object details")?
    } else {
        client
            .upload(file, &bucket_key, &object_key)
            .await?
            .object_id()
            .map(|id| id.to_string())
            .context("Upload response has no objects")?
    };

    Ok(urn::to_base64(&object_id))
}

async fn wait(client: &ViewDataClient, urn: &str, cancel: &CancellationToken) -> Result<Manifest> {
    let mut report = |manifest: &Manifest| info!("Translating: {}", manifest.progress);
    let observer: &mut (dyn FnMut(&Manifest) + Send) = &mut report;

    match client.wait_for_translation(urn, Some(observer), cancel).await? {
        PollOutcome::Completed(manifest) => Ok(manifest),
        PollOutcome::Failed(manifest) => {
            anyhow::bail!("Translation failed: {} ({})", manifest.status, manifest.progress)
        }
        PollOutcome::TimedOut => anyhow::bail!("Translation did not finish in time"),
    }
}

async fn download(client: &ViewDataClient, urn: &str, dir: &Path) -> Result<()> {
    let items = client.download(urn, dir).await?;
    info!("Model downloaded successfully ({} files)", items.len());

    for item in items.iter().filter(|item| item.kind == ItemKind::ThreeD) {
        println!("3d {}", item.path.display());
    }
    for item in items.iter().filter(|item| item.kind == ItemKind::TwoD) {
        println!("2d {}", item.path.display());
    }

    Ok(())
}

async fn workflow(client: &ViewDataClient, file: &Path, cancel: &CancellationToken) -> Result<()> {
    client.initialize().await?;

    let bucket_key = bucket_key(client)?;
    client
        .get_bucket(&bucket_key, true, &BucketCreationData::transient(&bucket_key))
        .await?;

    let urn = upload(client, file, None, true).await?;
    info!("URN: {}", urn);

    let registered = client.register(&urn, true).await?;
    if !registered.is_accepted() {
        anyhow::bail!("Translation not started: {:?}", registered.result);
    }
    wait(client, &urn, cancel).await?;

    let thumbnail = client.get_thumbnail(&urn, None, None).await?;
    info!("Thumbnail size: {} bytes", thumbnail.len());

    let dir = client.config().download_dir.join(&urn);
    download(client, &urn, &dir).await
}
