//! Progress of copy tasks.
//!
//! `ProgressParser` turns the sync tool's `--progress` output into per-file percentages.
//! `ProgressTracker` holds one `CopyOutcome` per mapping entry for the lifetime of a run.
//! Nothing here is persisted.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{CopyOutcome, CopyStatus};
use super::transfer_engine::TransferStatus;
use crate::logging::LogThrottle;

static PERCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)%").unwrap());

/// Header lines printed by the sync tool before any file.
const BANNERS: &[&str] = &[
    "sending incremental file list",
    "receiving incremental file list",
    "building file list",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub file: Option<String>,
    pub percentage: u8,
}

/// Line-oriented parser for `--progress` output.
///
/// Any non-empty line without a percentage that is not a banner names the current file.
/// A percentage line applies to the most recently named file. Statistics printed at the end
/// of a transfer ("sent ... bytes", "total size is ...") carry no percentage and are therefore
/// taken as file names too.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current_file: Option<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Feed one line. Returns an event when the line carries a percentage.
    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(caps) = PERCENT.captures(line) {
            // Too many digits for u32 clamps like any other value above 100.
            let percentage = caps[1].parse::<u32>().map_or(100, |p| p.min(100)) as u8;
            return Some(ProgressEvent {
                file: self.current_file.clone(),
                percentage,
            });
        }

        // A stray `%` never names a file.
        if line.contains('%') || BANNERS.iter().any(|banner| line.starts_with(banner)) {
            return None;
        }

        let name = Path::new(line)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| line.to_string());
        self.current_file = Some(name);
        None
    }
}

/// Shared in-memory store of copy outcomes, in mapping order.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<RwLock<Vec<CopyOutcome>>>,
    throttle: Arc<LogThrottle>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            throttle: Arc::new(LogThrottle::new(Duration::from_millis(500))),
        }
    }

    /// Start a new run: one pending outcome per label.
    pub async fn register<I, S>(&self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut outcomes = self.inner.write().await;
        *outcomes = labels.into_iter().map(CopyOutcome::pending).collect();
    }

    /// Apply a status event from a transfer engine to entry `index`.
    pub async fn update(&self, index: usize, status: TransferStatus) {
        let mut outcomes = self.inner.write().await;
        let Some(outcome) = outcomes.get_mut(index) else {
            return;
        };

        match status {
            TransferStatus::Ready => outcome.status = CopyStatus::Running,
            TransferStatus::InProgress {
                current_file,
                percentage,
            } => {
                outcome.status = CopyStatus::Running;
                outcome.percent_complete = percentage;
                if current_file.is_some() {
                    outcome.current_file = current_file;
                }
                if self.throttle.should_log() {
                    debug!(
                        label = %outcome.label,
                        file = outcome.current_file.as_deref().unwrap_or("-"),
                        percentage,
                        "Copy progress"
                    );
                }
            }
            TransferStatus::DryRun { .. } => outcome.status = CopyStatus::Succeeded,
            TransferStatus::Complete => {
                outcome.percent_complete = 100;
                outcome.status = CopyStatus::Succeeded;
                self.throttle.reset();
            }
            TransferStatus::Failed { exit_code, message } => {
                outcome.status = CopyStatus::Failed { exit_code, message };
            }
            TransferStatus::Cancelled => outcome.status = CopyStatus::Cancelled,
        }
    }

    pub async fn get(&self, index: usize) -> Option<CopyOutcome> {
        self.inner.read().await.get(index).cloned()
    }

    pub async fn get_all(&self) -> Vec<CopyOutcome> {
        self.inner.read().await.clone()
    }

    /// Entries currently running.
    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .iter()
            .filter(|o| o.status == CopyStatus::Running)
            .count()
    }
}
