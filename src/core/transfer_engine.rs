pub mod rsync;
pub mod simulated;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::CopyError;
use crate::core::models::ToolConfig;
use crate::process::CommandLine;

pub use rsync::RsyncEngine;
pub use simulated::SimulatedEngine;

/// Flag that makes the sync tool print per-file progress.
pub const PROGRESS_FLAG: &str = "--progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub label: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub options: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Ready,
    InProgress {
        current_file: Option<String>,
        percentage: u8,
    },
    /// Nothing was run; `command` is what would have been.
    DryRun {
        command: String,
    },
    Complete,
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub command: CommandLine,
    pub dry_run: bool,
    pub duration_secs: u64,
}

/// Copies one source tree into one destination, reporting progress on `tx`.
///
/// Implementations do not coordinate with each other; callers decide how many run at once.
pub trait TransferEngine: Send + Sync {
    fn transfer(
        &self,
        req: &TransferRequest,
        tx: mpsc::Sender<TransferStatus>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, CopyError>> + Send>>;
}

/// `<program> <options...> --progress <source> <destination>`
///
/// Options are split on whitespace so that `-aKhz --delete` reaches the tool as two arguments.
pub fn sync_command(
    program: &Path,
    options: &str,
    source: &Path,
    destination: &Path,
) -> CommandLine {
    let mut cmd = CommandLine::new(program.as_os_str());
    for option in options.split_whitespace() {
        cmd = cmd.arg(option);
    }
    cmd.arg(PROGRESS_FLAG)
        .path_arg(source)
        .path_arg(destination)
}

pub fn create_engine(tools: &ToolConfig, simulation: bool) -> Arc<dyn TransferEngine> {
    if simulation {
        return match &tools.binary {
            Some(binary) => Arc::new(SimulatedEngine::with_program(binary.clone())),
            None => Arc::new(SimulatedEngine::default()),
        };
    }

    match &tools.binary {
        Some(binary) => Arc::new(RsyncEngine::with_program(binary.clone())),
        None => Arc::new(RsyncEngine::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_command_shape() {
        let cmd = sync_command(
            Path::new("rsync"),
            "-aKhz",
            Path::new("/migration/source/pvc-1/"),
            Path::new("/migration/dest/app/"),
        );
        assert_eq!(
            cmd.to_string(),
            "rsync -aKhz --progress /migration/source/pvc-1/ /migration/dest/app/"
        );
    }

    #[test]
    fn sync_command_splits_options() {
        let cmd = sync_command(Path::new("rsync"), " -a  --delete ", Path::new("/a/"), Path::new("/b/"));
        assert_eq!(
            cmd.to_strings(),
            vec!["rsync", "-a", "--delete", "--progress", "/a/", "/b/"]
        );

        let bare = sync_command(Path::new("rsync"), "", Path::new("/a/"), Path::new("/b/"));
        assert_eq!(bare.to_strings(), vec!["rsync", "--progress", "/a/", "/b/"]);
    }

    #[tokio::test]
    async fn simulated_dry_run_reports_configured_binary() {
        let tools = ToolConfig {
            kind: "rsync".to_string(),
            options: "-a".to_string(),
            binary: Some(PathBuf::from("/opt/rsync/bin/rsync")),
        };
        let req = TransferRequest {
            label: "pvc-1".to_string(),
            source: PathBuf::from("/a/"),
            destination: PathBuf::from("/b/"),
            options: tools.options.clone(),
            dry_run: true,
        };
        let (tx, _rx) = mpsc::channel(4);

        let result = create_engine(&tools, true)
            .transfer(&req, tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(
            result.command.to_string(),
            "/opt/rsync/bin/rsync -a --progress /a/ /b/"
        );
    }
}
