use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CommandRunner, MountTable, RunOutcome};
use crate::process::{self, CommandLine, TERMINATE_GRACE};

/// Runs commands as real child processes.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        cmd: &CommandLine,
        cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome> {
        let mut child = cmd
            .to_command()
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr = child.stderr.take();
        let read_stderr = async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        };

        tokio::select! {
            (status, stderr) = async { tokio::join!(child.wait(), read_stderr) } => {
                let status = status?;
                debug!(command = %cmd, status = %status, "Command finished");
                Ok(RunOutcome::Exited {
                    code: status.code(),
                    stderr: stderr.trim().to_string(),
                })
            }
            _ = cancel.cancelled() => {
                process::terminate(&mut child, TERMINATE_GRACE).await?;
                Ok(RunOutcome::Cancelled)
            }
        }
    }
}

/// Mount table backed by `/proc/mounts` (or any file in the same format).
pub struct ProcMounts {
    path: PathBuf,
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/mounts"),
        }
    }
}

impl ProcMounts {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MountTable for ProcMounts {
    fn is_mounted(&self, path: &Path) -> std::io::Result<bool> {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let table = std::fs::read_to_string(&self.path)?;
        let mounted = parse_mount_points(&table).any(|p| p == canonical);
        debug!(path = %canonical.display(), mounted, "Checked mount table");
        Ok(mounted)
    }
}

/// Mount points (second field) of a `/proc/mounts` formatted table, with octal escapes decoded.
pub fn parse_mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_octal(field)))
}

fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, tempdir};

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
10.0.0.2:/srv/nfs /migration/source nfs4 rw,relatime 0 0
root@10.0.0.5:/opt/docker /mnt/with\\040space fuse.sshfs rw 0 0
";

    #[test]
    fn parses_mount_points_and_escapes() {
        let points: Vec<PathBuf> = parse_mount_points(TABLE).collect();
        assert_eq!(
            points,
            vec![
                PathBuf::from("/sys"),
                PathBuf::from("/migration/source"),
                PathBuf::from("/mnt/with space"),
            ]
        );
    }

    #[test]
    fn prefix_of_a_mount_point_is_not_mounted() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TABLE).unwrap();
        let table = ProcMounts::with_path(file.path());

        assert!(table.is_mounted(Path::new("/migration/source")).unwrap());
        assert!(!table.is_mounted(Path::new("/migration")).unwrap());
    }

    #[test]
    fn path_is_canonicalized_before_lookup() {
        let dir = tempdir().unwrap();
        let real = std::fs::canonicalize(dir.path()).unwrap();
        let table_file = NamedTempFile::new().unwrap();
        std::fs::write(
            table_file.path(),
            format!("srv:/x {} nfs rw 0 0\n", real.display()),
        )
        .unwrap();

        let table = ProcMounts::with_path(table_file.path());
        let indirect = real.join(".");
        assert!(table.is_mounted(&indirect).unwrap());
    }

    #[tokio::test]
    async fn runner_reports_exit_code_and_stderr() {
        let cancel = CancellationToken::new();
        let cmd = CommandLine::new("sh").arg("-c").arg("echo boom >&2; exit 3");

        let outcome = SystemRunner.run(&cmd, &cancel).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Exited {
                code: Some(3),
                stderr: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn runner_terminates_on_cancel() {
        let cancel = CancellationToken::new();
        let cmd = CommandLine::new("sleep").arg("30");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = SystemRunner.run(&cmd, &cancel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
    }
}
