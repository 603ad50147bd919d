use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{CommandRunner, MountTable, RunOutcome};
use crate::process::CommandLine;

/// Records commands instead of running them. Exit codes can be scripted per program.
#[derive(Clone, Default)]
pub struct SimulatedRunner {
    calls: Arc<Mutex<Vec<CommandLine>>>,
    failures: Arc<Mutex<HashMap<String, (i32, String)>>>,
}

impl SimulatedRunner {
    /// Every command whose program is `program` exits with `code` and `stderr`.
    pub fn fail_program(&self, program: &str, code: i32, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(program.to_string(), (code, stderr.to_string()));
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_strings(&self) -> Vec<Vec<String>> {
        self.calls().iter().map(CommandLine::to_strings).collect()
    }
}

#[async_trait]
impl CommandRunner for SimulatedRunner {
    async fn run(
        &self,
        cmd: &CommandLine,
        cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        info!(command = %cmd, "(Simulated) Running command");
        self.calls.lock().unwrap().push(cmd.clone());

        let program = cmd.program.to_string_lossy().into_owned();
        let outcome = match self.failures.lock().unwrap().get(&program) {
            Some((code, stderr)) => RunOutcome::Exited {
                code: Some(*code),
                stderr: stderr.clone(),
            },
            None => RunOutcome::success(),
        };
        Ok(outcome)
    }
}

/// In-memory mount table.
#[derive(Clone, Default)]
pub struct SimulatedMountTable {
    mounted: Arc<Mutex<HashSet<PathBuf>>>,
}

impl SimulatedMountTable {
    pub fn insert(&self, path: impl Into<PathBuf>) {
        self.mounted.lock().unwrap().insert(path.into());
    }
}

impl MountTable for SimulatedMountTable {
    fn is_mounted(&self, path: &Path) -> std::io::Result<bool> {
        Ok(self.mounted.lock().unwrap().contains(path))
    }
}
