use crate::core::error::CopyError;
use crate::core::progress::ProgressParser;
use crate::core::transfer_engine::{
    TransferEngine, TransferRequest, TransferResult, TransferStatus, sync_command,
};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Replays scripted sync tool output instead of copying anything.
///
/// Lines go through the same `ProgressParser` as real output. Transfers can be made to fail
/// by label, and every request is recorded.
#[derive(Clone)]
pub struct SimulatedEngine {
    pub program: PathBuf,
    pub line_delay: Duration,
    script: Option<Vec<String>>,
    failures: Arc<Mutex<HashMap<String, (i32, String)>>>,
    requests: Arc<Mutex<Vec<TransferRequest>>>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rsync"),
            line_delay: Duration::from_millis(200),
            script: None,
            failures: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl SimulatedEngine {
    /// An engine that emits `lines` for every transfer, without pauses.
    pub fn with_script<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line_delay: Duration::ZERO,
            script: Some(lines.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Report commands as if `program` were the sync tool.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Transfers labelled `label` exit with `code` after replaying their output.
    pub fn fail_label(&self, label: &str, code: i32, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(label.to_string(), (code, stderr.to_string()));
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn lines_for(&self, req: &TransferRequest) -> Vec<String> {
        if let Some(script) = &self.script {
            return script.clone();
        }
        let name = req
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        vec![
            "sending incremental file list".to_string(),
            format!("{}/simulated_file.dat", name),
            "     262,144,000  50%   100.00MB/s    0:00:02".to_string(),
            "     524,288,000 100%   100.00MB/s    0:00:05 (xfr#1, to-chk=0/1)".to_string(),
        ]
    }
}

impl TransferEngine for SimulatedEngine {
    fn transfer(
        &self,
        req: &TransferRequest,
        tx: mpsc::Sender<TransferStatus>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, CopyError>> + Send>> {
        let req = req.clone();
        self.requests.lock().unwrap().push(req.clone());

        let command = sync_command(&self.program, &req.options, &req.source, &req.destination);
        let lines = self.lines_for(&req);
        let failure = self.failures.lock().unwrap().get(&req.label).cloned();
        let delay = self.line_delay;

        Box::pin(async move {
            if req.dry_run {
                warn!(label = %req.label, command = %command, "(Simulated) Dry run, would copy");
                let _ = tx
                    .send(TransferStatus::DryRun {
                        command: command.to_string(),
                    })
                    .await;
                return Ok(TransferResult {
                    command,
                    dry_run: true,
                    duration_secs: 0,
                });
            }

            info!(label = %req.label, command = %command, "(Simulated) Copy started");
            let start_time = Instant::now();
            let _ = tx.send(TransferStatus::Ready).await;

            let mut parser = ProgressParser::new();
            for line in &lines {
                if let Some(event) = parser.feed(line) {
                    let _ = tx
                        .send(TransferStatus::InProgress {
                            current_file: event.file,
                            percentage: event.percentage,
                        })
                        .await;
                }

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        let _ = tx.send(TransferStatus::Cancelled).await;
                        return Err(CopyError::Cancelled);
                    }
                }
            }

            if let Some((code, stderr)) = failure {
                let _ = tx
                    .send(TransferStatus::Failed {
                        exit_code: Some(code),
                        message: stderr.clone(),
                    })
                    .await;
                return Err(CopyError::Failed {
                    exit_code: Some(code),
                    stderr,
                });
            }

            let _ = tx.send(TransferStatus::Complete).await;
            Ok(TransferResult {
                command,
                dry_run: false,
                duration_secs: start_time.elapsed().as_secs(),
            })
        })
    }
}
