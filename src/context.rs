use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::{self, CommandRunner, MountTable};
use crate::core::models::MigrationJob;
use crate::core::transfer_engine::{self, TransferEngine};
use crate::core::ProgressTracker;

/// Everything a run needs, shared by the mount and copy stages.
#[derive(Clone)]
pub struct AppContext {
    pub run_id: String,
    pub job: Arc<MigrationJob>,
    pub runner: Arc<dyn CommandRunner>,
    pub mount_table: Arc<dyn MountTable>,
    pub engine: Arc<dyn TransferEngine>,
    pub progress: ProgressTracker,
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(job: MigrationJob, simulation: bool) -> Self {
        let engine = transfer_engine::create_engine(&job.tools, simulation);
        Self::with_adapters(
            job,
            adapters::get_runner(simulation),
            adapters::get_mount_table(simulation),
            engine,
        )
    }

    pub fn with_adapters(
        job: MigrationJob,
        runner: Arc<dyn CommandRunner>,
        mount_table: Arc<dyn MountTable>,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            job: Arc::new(job),
            runner,
            mount_table,
            engine,
            progress: ProgressTracker::new(),
            cancel: CancellationToken::new(),
        }
    }
}
