//! Command execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chunkup_http::HttpTransport;
use chunkup_protocol::STATUS_OK;
use chunkup_transfer::LocalFile;
use chunkup_uploader::{MemoryEndpoint, Transport, UploadEntry, UploadManager};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::CliConfig;
use crate::{Cli, Command};

pub async fn run(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    let transport: Arc<dyn Transport> = if cli.memory {
        info!("using process-local endpoint");
        Arc::new(MemoryEndpoint::new())
    } else {
        Arc::new(HttpTransport::with_timeout(
            &config.endpoint,
            Duration::from_secs(config.request_timeout_secs),
        )?)
    };

    match cli.command {
        Command::Upload { files, dest } => upload(transport, config, &files, &dest).await,
        Command::List => list(transport).await,
        Command::Delete { path } => delete(transport, config, &path).await,
    }
}

async fn upload(
    transport: Arc<dyn Transport>,
    config: CliConfig,
    files: &[PathBuf],
    dest: &str,
) -> anyhow::Result<()> {
    let manager = UploadManager::with_background(transport, config.uploader)?;

    match manager.restore().await {
        Ok(0) => {}
        Ok(restored) => info!(restored, "found partial uploads on endpoint"),
        Err(e) => warn!(error = %e, "could not list partial uploads, starting fresh"),
    }

    let mut targets = Vec::with_capacity(files.len());
    for local in files {
        let remote = remote_path(dest, local)?;
        let handle = LocalFile::handle(local)
            .with_context(|| format!("opening {}", local.display()))?;
        manager
            .add(handle, &remote)
            .with_context(|| format!("queueing {}", local.display()))?;
        info!(local = %local.display(), remote = %remote, "queued");
        targets.push(remote);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<UploadEntry>>();
    manager.set_status_callback(Arc::new(move |queue| {
        let _ = tx.send(queue);
    }));
    manager.start();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let queue = loop {
        tokio::select! {
            Some(queue) = rx.recv() => {
                for entry in queue.iter().filter(|e| e.runnable) {
                    info!(
                        path = %entry.file_path,
                        uploaded = entry.uploaded,
                        size = entry.size,
                        percent = entry.uploaded * 100 / entry.size.max(1),
                        "progress"
                    );
                }
                if !queue.iter().any(|e| e.runnable) {
                    break queue;
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted, partial uploads stay resumable");
                manager.shutdown();
                return Ok(());
            }
        }
    };
    manager.shutdown();

    let failed: Vec<&UploadEntry> = queue
        .iter()
        .filter(|e| targets.contains(&e.file_path) && !e.err.is_empty())
        .collect();
    for entry in &failed {
        warn!(path = %entry.file_path, uploaded = entry.uploaded, error = %entry.err, "upload failed");
    }
    if !failed.is_empty() {
        bail!("{} of {} uploads failed", failed.len(), targets.len());
    }

    info!(count = targets.len(), "all uploads complete");
    Ok(())
}

async fn list(transport: Arc<dyn Transport>) -> anyhow::Result<()> {
    let resp = transport.list_uploadings().await?;
    if resp.status != STATUS_OK {
        bail!("endpoint answered {}", resp.status);
    }

    let infos = resp.body.unwrap_or_default().upload_infos;
    if infos.is_empty() {
        println!("no partial uploads");
    }
    for info in infos {
        println!("{}\t{}/{} bytes", info.real_file_path, info.uploaded, info.size);
    }
    Ok(())
}

async fn delete(transport: Arc<dyn Transport>, config: CliConfig, path: &str) -> anyhow::Result<()> {
    let manager = UploadManager::with_background(transport, config.uploader)?;
    manager.restore().await?;
    manager
        .delete(path)
        .await
        .with_context(|| format!("deleting {path}"))?;
    manager.shutdown();
    println!("deleted {path}");
    Ok(())
}

/// Joins `dest` and the file name of `local` into a remote path.
fn remote_path(dest: &str, local: &Path) -> anyhow::Result<String> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no usable file name in {}", local.display()))?;

    let dest = dest.trim_matches('/');
    Ok(if dest.is_empty() {
        name.to_string()
    } else {
        format!("{dest}/{name}")
    })
}
