//! Mounting and unmounting of migration endpoints.
//!
//! `MountManager` matches on the target's kind and hands off to the backend for that
//! transport. Backends only build command lines; running them, dry-run suppression and
//! error mapping happen here so every kind behaves the same way.

mod local;
mod nfs;
mod sshfs;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{CommandRunner, MountTable, RunOutcome};
use crate::core::error::MountError;
use crate::core::models::{MountKind, MountTarget};
use crate::process::CommandLine;

pub struct MountManager {
    runner: Arc<dyn CommandRunner>,
    mount_table: Arc<dyn MountTable>,
    dry_run: bool,
}

impl MountManager {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        mount_table: Arc<dyn MountTable>,
        dry_run: bool,
    ) -> Self {
        Self {
            runner,
            mount_table,
            dry_run,
        }
    }

    /// Mount `target`. An already mounted path is not detected here; the mount tool reports it.
    pub async fn mount(
        &self,
        target: &MountTarget,
        cancel: &CancellationToken,
    ) -> Result<(), MountError> {
        let commands = match target {
            MountTarget::Local { mount_path } => {
                local::mount(mount_path);
                return Ok(());
            }
            MountTarget::Nfs {
                mount_path,
                server,
                server_path,
            } => vec![nfs::mount_command(server, server_path, mount_path)],
            MountTarget::Sshfs {
                mount_path,
                hosts,
                options,
            } => {
                if hosts.len() > 1 {
                    warn!(
                        hosts = hosts.len(),
                        path = %mount_path.display(),
                        "Mounting several sshfs hosts on the same path"
                    );
                }
                sshfs::mount_commands(hosts, options, mount_path)
            }
        };

        for cmd in &commands {
            self.execute(target.kind(), cmd, cancel).await?;
        }

        info!(kind = %target.kind(), path = %target.mount_path().display(), "Mounted");
        Ok(())
    }

    /// Unmount `target`. A path missing from the mount table is left alone, so this is idempotent.
    pub async fn unmount(
        &self,
        target: &MountTarget,
        cancel: &CancellationToken,
    ) -> Result<(), MountError> {
        let cmd = match target {
            MountTarget::Local { mount_path } => {
                local::unmount(mount_path);
                return Ok(());
            }
            MountTarget::Nfs { mount_path, .. } => nfs::unmount_command(mount_path),
            MountTarget::Sshfs { mount_path, .. } => sshfs::unmount_command(mount_path),
        };

        let mount_path = target.mount_path();
        let mounted = self
            .mount_table
            .is_mounted(mount_path)
            .map_err(MountError::MountTable)?;
        if !mounted {
            info!(path = %mount_path.display(), "Not mounted, skipping unmount");
            return Ok(());
        }

        self.execute(target.kind(), &cmd, cancel).await?;
        info!(kind = %target.kind(), path = %mount_path.display(), "Unmounted");
        Ok(())
    }

    async fn execute(
        &self,
        kind: MountKind,
        cmd: &CommandLine,
        cancel: &CancellationToken,
    ) -> Result<(), MountError> {
        if self.dry_run {
            warn!(kind = %kind, command = %cmd, "Dry run, would execute");
            return Ok(());
        }

        info!(kind = %kind, command = %cmd, "Executing");

        let outcome = self
            .runner
            .run(cmd, cancel)
            .await
            .map_err(|source| MountError::Io {
                kind,
                command: cmd.to_string(),
                source,
            })?;

        match outcome {
            RunOutcome::Exited { code: Some(0), .. } => Ok(()),
            RunOutcome::Exited { code, stderr } => {
                error!(kind = %kind, command = %cmd, exit_code = ?code, stderr = %stderr, "Command failed");
                Err(MountError::CommandFailed {
                    kind,
                    command: cmd.to_string(),
                    exit_code: code,
                    stderr,
                })
            }
            RunOutcome::Cancelled => Err(MountError::Cancelled {
                kind,
                command: cmd.to_string(),
            }),
        }
    }
}
