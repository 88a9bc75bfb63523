mod archive;
mod batch;
mod capture_time;
mod config;
mod error;
#[cfg(test)]
mod fixtures;
mod http;
mod location;
mod naming;
mod pipeline;
mod progress;
mod scheduler;
mod staging;
#[cfg(feature = "embed_ui")]
mod ui;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config first so we can honor logging.filter directive.
    let shared = config::ConfigManager::load(None).await?;
    let cfg_snapshot = config::ConfigManager::to_struct(&shared).await?;
    let filter_directive = cfg_snapshot
        .logging
        .as_ref()
        .and_then(|l| l.filter.clone())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,photo_renamer_server=debug".to_string());
    fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .init();
    tracing::info!(
        config = %config::ConfigManager::path(&shared).await.display(),
        staging = %cfg_snapshot.staging_dir().display(),
        "configuration loaded"
    );

    let progress = Arc::new(progress::ProgressTracker::new(cfg_snapshot.progress_ttl()));
    let scheduler = scheduler::SweepScheduler::new(progress.clone()).await?;
    scheduler.populate(&cfg_snapshot.sweep_cron()).await?;
    scheduler.start().await?;

    let state = http::AppState {
        cfg: shared,
        progress,
        reader: Arc::new(capture_time::ExifCaptureTime),
    };
    let app = http::router(state, cfg_snapshot.upload_limits().max_batch_bytes);
    http::serve(app, cfg_snapshot.bind_address()).await?;
    Ok(())
}
