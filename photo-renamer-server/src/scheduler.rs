use crate::progress::SharedProgress;
use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Background jobs. Currently only evicts expired progress sessions.
pub struct SweepScheduler {
    sched: JobScheduler,
    progress: SharedProgress,
}

impl SweepScheduler {
    pub async fn new(progress: SharedProgress) -> Result<Self> {
        let sched = JobScheduler::new().await?;
        Ok(Self { sched, progress })
    }

    /// Register the sweep job on a six-field cron expression.
    pub async fn populate(&self, cron: &str) -> Result<()> {
        let progress = Arc::clone(&self.progress);
        let job = Job::new_async(cron, move |_uuid, _l| {
            let progress = Arc::clone(&progress);
            Box::pin(async move {
                let removed = progress.sweep();
                if removed > 0 {
                    info!(
                        removed,
                        active = progress.active_sessions(),
                        "expired progress sessions swept"
                    );
                }
            })
        })?;
        self.sched.add(job).await?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.sched.start().await?;
        Ok(())
    }
}
