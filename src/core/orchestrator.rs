use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::context::AppContext;
use crate::core::error::{CopyError, MigrationError};
use crate::core::models::{CopyOutcome, CopyStatus, MountTarget, PathPair, SUPPORTED_TOOL};
use crate::core::mount::MountManager;
use crate::core::transfer_engine::{TransferRequest, TransferStatus};

/// Result of a completed run, one outcome per mapping entry in declared order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub outcomes: Vec<CopyOutcome>,
}

/// Drives a migration job: mounts both endpoints and copies the mapping one entry at a time.
///
/// Every failure is fatal for the run. Nothing is retried and nothing already mounted or
/// copied is rolled back.
pub struct MigrationEngine {
    ctx: AppContext,
    mounts: MountManager,
}

impl MigrationEngine {
    pub fn new(ctx: AppContext) -> Self {
        let mounts = MountManager::new(
            ctx.runner.clone(),
            ctx.mount_table.clone(),
            ctx.job.dry_run,
        );
        Self { ctx, mounts }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Mount the source, then the destination.
    pub async fn mount_all(&self) -> Result<(), MigrationError> {
        info!("Mounting directories");
        for (side, target) in self.endpoints() {
            if self.ctx.cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
            debug!(side, kind = %target.kind(), "Mounting");
            self.mounts.mount(target, &self.ctx.cancel).await?;
        }
        Ok(())
    }

    /// Unmount the source, then the destination.
    pub async fn unmount_all(&self) -> Result<(), MigrationError> {
        info!("Unmounting directories");
        for (side, target) in self.endpoints() {
            if self.ctx.cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
            debug!(side, kind = %target.kind(), "Unmounting");
            self.mounts.unmount(target, &self.ctx.cancel).await?;
        }
        Ok(())
    }

    /// Copy every mapping entry in order, stopping at the first failure.
    pub async fn run(&self) -> Result<RunSummary, MigrationError> {
        let job = self.ctx.job.clone();
        let span = info_span!("migration", run_id = %self.ctx.run_id);

        async {
            if job.mapping.is_empty() {
                error!("No mapping found in configuration");
                return Err(MigrationError::NoMapping);
            }
            if job.tools.kind != SUPPORTED_TOOL {
                error!(tool = %job.tools.kind, "Unsupported tool");
                return Err(MigrationError::UnsupportedTool(job.tools.kind.clone()));
            }

            if job.dry_run {
                info!("Performing dry run");
            }
            info!(entries = job.mapping.len(), "Running migration");

            self.ctx
                .progress
                .register(job.mapping.iter().map(PathPair::label))
                .await;

            for (index, pair) in job.mapping.iter().enumerate() {
                if self.ctx.cancel.is_cancelled() {
                    warn!("Migration cancelled before all entries were copied");
                    return Err(MigrationError::Cancelled);
                }
                self.copy_entry(index, pair).await?;
            }

            info!("Migration complete");
            Ok(RunSummary {
                run_id: self.ctx.run_id.clone(),
                dry_run: job.dry_run,
                outcomes: self.ctx.progress.get_all().await,
            })
        }
        .instrument(span)
        .await
    }

    async fn copy_entry(&self, index: usize, pair: &PathPair) -> Result<(), MigrationError> {
        let (source, destination) = pair.normalized();
        let label = pair.label();
        debug!(label = %label, "Copying {} to {}", source.display(), destination.display());

        let req = TransferRequest {
            label: label.clone(),
            source,
            destination,
            options: self.ctx.job.tools.options.clone(),
            dry_run: self.ctx.job.dry_run,
        };

        let (tx, mut rx) = mpsc::channel(64);
        let transfer = self.ctx.engine.transfer(&req, tx, self.ctx.cancel.clone());

        let progress = self.ctx.progress.clone();
        let drain = async move {
            while let Some(status) = rx.recv().await {
                progress.update(index, status).await;
            }
        };

        let (result, ()) = tokio::join!(transfer, drain);

        match result {
            Ok(result) => {
                debug!(
                    label = %label,
                    command = %result.command,
                    duration_secs = result.duration_secs,
                    "Entry finished"
                );
                Ok(())
            }
            Err(e) => {
                self.settle_failure(index, &e).await;
                if !matches!(e, CopyError::Cancelled) {
                    error!(label = %label, error = %e, "Copy failed, stopping migration");
                }
                Err(MigrationError::Copy { label, source: e })
            }
        }
    }

    /// Make sure a failed entry is not left looking like it is still running.
    async fn settle_failure(&self, index: usize, e: &CopyError) {
        let still_open = matches!(
            self.ctx.progress.get(index).await.map(|o| o.status),
            Some(CopyStatus::Pending | CopyStatus::Running)
        );
        if !still_open {
            return;
        }

        let status = match e {
            CopyError::Cancelled => TransferStatus::Cancelled,
            CopyError::Failed { exit_code, stderr } => TransferStatus::Failed {
                exit_code: *exit_code,
                message: stderr.clone(),
            },
            other => TransferStatus::Failed {
                exit_code: None,
                message: other.to_string(),
            },
        };
        self.ctx.progress.update(index, status).await;
    }

    fn endpoints(&self) -> [(&'static str, &MountTarget); 2] {
        [
            ("source", &self.ctx.job.source),
            ("destination", &self.ctx.job.destination),
        ]
    }
}
