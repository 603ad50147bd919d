use crate::core::error::CopyError;
use crate::core::progress::ProgressParser;
use crate::core::transfer_engine::{
    TransferEngine, TransferRequest, TransferResult, TransferStatus, sync_command,
};
use crate::process::{self, TERMINATE_GRACE};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Runs the external sync tool and follows its progress output.
pub struct RsyncEngine {
    pub program: PathBuf,
}

impl Default for RsyncEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rsync"),
        }
    }
}

impl RsyncEngine {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TransferEngine for RsyncEngine {
    fn transfer(
        &self,
        req: &TransferRequest,
        tx: mpsc::Sender<TransferStatus>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, CopyError>> + Send>> {
        let req = req.clone();
        let command = sync_command(&self.program, &req.options, &req.source, &req.destination);
        let span = info_span!("copy", label = %req.label);

        Box::pin(
            async move {
                debug!(command = %command, "Prepared sync command");

                if req.dry_run {
                    warn!(
                        source = %req.source.display(),
                        destination = %req.destination.display(),
                        command = %command,
                        "Dry run, would copy"
                    );
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

                let start_time = Instant::now();
                let _ = tx.send(TransferStatus::Ready).await;

                let mut child = match command
                    .to_command()
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                {
                    Ok(child) => child,
                    Err(source) => {
                        let _ = tx
                            .send(TransferStatus::Failed {
                                exit_code: None,
                                message: source.to_string(),
                            })
                            .await;
                        return Err(CopyError::Spawn {
                            command: command.to_string(),
                            source,
                        });
                    }
                };

                let Some(stdout) = child.stdout.take() else {
                    let e = std::io::Error::other("Failed to get stdout");
                    return Err(abandon(&mut child, &tx, e).await);
                };

                // Drained concurrently so a chatty tool cannot block on a full stderr pipe.
                let stderr = child.stderr.take();
                let stderr_task = tokio::spawn(async move {
                    let mut buf = String::new();
                    if let Some(mut pipe) = stderr {
                        let _ = pipe.read_to_string(&mut buf).await;
                    }
                    buf
                });

                info!(
                    source = %req.source.display(),
                    destination = %req.destination.display(),
                    "Copy started"
                );

                let finished = tokio::select! {
                    status = async {
                        match pump_progress(stdout, &tx).await {
                            Ok(()) => child.wait().await,
                            Err(e) => Err(e),
                        }
                    } => Some(status),
                    _ = cancel.cancelled() => None,
                };

                let status = match finished {
                    Some(Ok(status)) => status,
                    Some(Err(e)) => {
                        stderr_task.abort();
                        return Err(abandon(&mut child, &tx, e).await);
                    }
                    None => {
                        warn!("Copy cancelled, stopping sync tool");
                        process::terminate(&mut child, TERMINATE_GRACE).await?;
                        stderr_task.abort();
                        let _ = tx.send(TransferStatus::Cancelled).await;
                        return Err(CopyError::Cancelled);
                    }
                };

                let duration_secs = start_time.elapsed().as_secs();

                if status.success() {
                    let _ = tx.send(TransferStatus::Complete).await;
                    info!(duration_secs, "Copy complete");
                    return Ok(TransferResult {
                        command,
                        dry_run: false,
                        duration_secs,
                    });
                }

                let stderr = stderr_task.await.unwrap_or_default().trim().to_string();
                error!(
                    command = %command,
                    exit_code = ?status.code(),
                    stderr = %stderr,
                    "Sync tool failed"
                );
                let _ = tx
                    .send(TransferStatus::Failed {
                        exit_code: status.code(),
                        message: stderr.clone(),
                    })
                    .await;
                Err(CopyError::Failed {
                    exit_code: status.code(),
                    stderr,
                })
            }
            .instrument(span),
        )
    }
}

/// Stop a child whose output can no longer be followed and report the failure.
async fn abandon(
    child: &mut Child,
    tx: &mpsc::Sender<TransferStatus>,
    e: std::io::Error,
) -> CopyError {
    error!(error = %e, "Lost sync tool output, stopping it");
    if let Err(kill_err) = process::terminate(child, TERMINATE_GRACE).await {
        warn!(error = %kill_err, "Failed to stop sync tool");
    }
    let _ = tx
        .send(TransferStatus::Failed {
            exit_code: None,
            message: e.to_string(),
        })
        .await;
    CopyError::Io(e)
}

/// Read stdout until EOF, splitting on `\r` as well as `\n` since the tool redraws
/// progress lines in place.
async fn pump_progress(
    mut stdout: ChildStdout,
    tx: &mpsc::Sender<TransferStatus>,
) -> std::io::Result<()> {
    let mut parser = ProgressParser::new();
    let mut line_buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = stdout.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        for &b in &chunk[..n] {
            if b == b'\r' || b == b'\n' {
                if !line_buffer.is_empty() {
                    handle_line(&mut parser, &line_buffer, tx).await;
                    line_buffer.clear();
                }
            } else {
                line_buffer.push(b);
            }
        }
    }

    if !line_buffer.is_empty() {
        handle_line(&mut parser, &line_buffer, tx).await;
    }
    Ok(())
}

async fn handle_line(
    parser: &mut ProgressParser,
    raw: &[u8],
    tx: &mpsc::Sender<TransferStatus>,
) {
    let line = String::from_utf8_lossy(raw);
    let previous = parser.current_file().map(str::to_owned);

    match parser.feed(&line) {
        Some(event) => {
            let _ = tx
                .send(TransferStatus::InProgress {
                    current_file: event.file,
                    percentage: event.percentage,
                })
                .await;
        }
        None => {
            if parser.current_file() != previous.as_deref() {
                debug!(file = parser.current_file().unwrap_or_default(), "Current file");
            }
        }
    }
}
