//! s3mount binary: mount an S3 bucket at a local path.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fuser::MountOption;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use object_store::{Bucket, S3Bucket};
use s3mount_daemon::fs::Node;
use s3mount_daemon::{build_tree, BucketFs, Database};

#[derive(Debug, Parser)]
#[command(name = "s3mount", about = "Mount an S3 bucket as a local filesystem", version)]
struct Cli {
    /// SQLite database backing path timestamps
    #[arg(long, env = "S3MOUNT_DB")]
    db: PathBuf,

    /// S3 bucket to mount
    #[arg(long, env = "S3MOUNT_BUCKET")]
    bucket: String,

    /// Mountpoint for the bucket
    #[arg(long, env = "S3MOUNT_MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Enable trace logging for every crate
    #[arg(long)]
    verbose: bool,

    /// Concurrency level for ranged downloads (default: available parallelism)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "trace"
    } else if cli.debug {
        "s3mount=debug,s3mount_daemon=debug,object_store=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let concurrency = cli.concurrency.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(Into::into)
            .unwrap_or(1)
    });

    let bucket: Arc<dyn Bucket> = Arc::new(S3Bucket::from_env(&cli.bucket, concurrency).await);
    let db = Database::connect(&cli.db)
        .await
        .context("opening metadata database")?;

    info!(bucket = %cli.bucket, "listing bucket and populating tree");
    let root = build_tree(bucket, db)
        .await
        .context("populating filesystem tree")?;

    let fs = BucketFs::new(tokio::runtime::Handle::current(), Node::Directory(root));
    let options = [
        MountOption::FSName("s3mount".to_string()),
        MountOption::AutoUnmount,
    ];
    let session = fuser::spawn_mount2(fs, &cli.mountpoint, &options)
        .context("mounting filesystem")?;

    info!(
        mountpoint = %cli.mountpoint.display(),
        "mounted; unmount with ctrl-c or 'fusermount -u'"
    );

    let mut sigterm = signal(SignalKind::terminate()).context("installing signal handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }

    info!("unmounting");
    drop(session);
    Ok(())
}
