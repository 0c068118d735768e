use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use objstore::bucket::{Bucket, MetricsRegistry};
use objstore::config::{self, Config, SignatureVersion};
use objstore::context::Context;
use prometheus::{Encoder, Registry, TextEncoder};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "objstore")]
#[command(version, about = "Directory-style access to S3-compatible object storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file (defaults to S3_* environment variables)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Bucket name
    #[arg(long = "s3.bucket", global = true, env = "S3_BUCKET")]
    bucket: Option<String>,

    /// S3 endpoint (host[:port], no scheme)
    #[arg(long = "s3.endpoint", global = true, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    /// Access key. The secret key is read from S3_SECRET_KEY only.
    #[arg(long = "s3.access-key", global = true, env = "S3_ACCESS_KEY")]
    access_key: Option<String>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long = "s3.insecure", global = true, env = "S3_INSECURE")]
    insecure: bool,

    /// Sign requests with the legacy V2 scheme
    #[arg(long = "s3.signature-version2", global = true, env = "S3_SIGNATURE_VERSION2")]
    signature_version2: bool,

    /// Request SSE-S3 encryption for uploads
    #[arg(long = "s3.encrypt-sse", global = true, env = "S3_SSE_ENCRYPTION")]
    encrypt_sse: bool,

    /// Region used for V4 signing
    #[arg(long = "s3.region", global = true, env = "S3_REGION")]
    region: Option<String>,

    /// Abort the operation after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print operation counters (prometheus text format) to stderr on exit
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries directly under a directory
    Ls {
        /// Directory (empty for the bucket root)
        #[arg(default_value = "")]
        dir: String,
    },

    /// Write an object (or part of it) to stdout
    Cat {
        key: String,

        /// First byte to read
        #[arg(long, requires = "length", allow_negative_numbers = true)]
        offset: Option<i64>,

        /// Number of bytes to read
        #[arg(long, requires = "offset", allow_negative_numbers = true)]
        length: Option<i64>,
    },

    /// Upload a file (or stdin) to a key
    Put {
        key: String,

        /// Source file; stdin when omitted
        file: Option<String>,
    },

    /// Report whether a key exists
    Stat { key: String },

    /// Delete a key
    Rm { key: String },
}

impl Cli {
    /// Command line flags override the loaded configuration.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(access_key) = &self.access_key {
            config.access_key = access_key.clone();
        }
        if let Ok(secret_key) = std::env::var("S3_SECRET_KEY") {
            if !secret_key.is_empty() {
                config.secret_key = secret_key;
            }
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        config.insecure |= self.insecure;
        config.sse_encryption |= self.encrypt_sse;
        if self.signature_version2 {
            config.signature_version = SignatureVersion::V2;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // One operation at a time: current_thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = config::load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let registry = Registry::new();
    let bucket = Bucket::new(&config, &MetricsRegistry::new(registry.clone()), "cli")
        .context("Failed to create bucket client")?;

    let root = Context::new();
    let ctx = match cli.timeout {
        Some(secs) => root.with_timeout(Duration::from_secs(secs)),
        None => root.child(),
    };

    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let result = run_command(&bucket, &ctx, cli.command).await;

    if cli.print_metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        eprint!("{}", String::from_utf8_lossy(&buffer));
    }

    result
}

async fn run_command(bucket: &Bucket, ctx: &Context, command: Commands) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    match command {
        Commands::Ls { dir } => {
            let mut entries = Vec::new();
            bucket
                .iter(ctx, &dir, |entry| {
                    entries.push(entry.to_string());
                    Ok(())
                })
                .await
                .with_context(|| format!("Failed to list '{}'", dir))?;

            for entry in entries {
                stdout.write_all(entry.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
        Commands::Cat {
            key,
            offset,
            length,
        } => {
            let mut reader = match (offset, length) {
                (Some(offset), Some(length)) => bucket.get_range(ctx, &key, offset, length).await,
                _ => bucket.get(ctx, &key).await,
            }
            .with_context(|| format!("Failed to read '{}'", key))?;

            let copied = ctx
                .run(tokio::io::copy(&mut reader, &mut stdout))
                .await
                .map_err(|reason| anyhow::anyhow!("{}", reason))??;
            debug!(key = %key, bytes = copied, "object written to stdout");
        }
        Commands::Put { key, file } => {
            let uploaded = match file {
                Some(path) => {
                    let mut source = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open '{}'", path))?;
                    bucket.upload(ctx, &key, &mut source).await
                }
                None => bucket.upload(ctx, &key, &mut tokio::io::stdin()).await,
            };
            uploaded.with_context(|| format!("Failed to upload '{}'", key))?;
            info!(key = %key, "uploaded");
        }
        Commands::Stat { key } => {
            let exists = bucket
                .exists(ctx, &key)
                .await
                .with_context(|| format!("Failed to stat '{}'", key))?;
            let line = if exists { "exists" } else { "not found" };
            stdout.write_all(format!("{}: {}\n", key, line).as_bytes()).await?;
        }
        Commands::Rm { key } => {
            bucket
                .delete(ctx, &key)
                .await
                .with_context(|| format!("Failed to delete '{}'", key))?;
            info!(key = %key, "deleted");
        }
    }

    stdout.flush().await?;
    Ok(())
}
