use std::path::Path;

use crate::core::models::SshHost;
use crate::process::CommandLine;

/// One `sshfs -oPort=<port> -o<options> <user>@<address>:<remoteMountPath> <mountPath>` per host.
///
/// Every host binds to the same local mount path. `-o<options>` is left out when no options
/// are configured, since `sshfs` rejects a bare `-o`.
pub fn mount_commands(hosts: &[SshHost], options: &str, mount_path: &Path) -> Vec<CommandLine> {
    hosts
        .iter()
        .map(|host| {
            let mut cmd = CommandLine::new("sshfs").arg(format!("-oPort={}", host.port));
            if !options.is_empty() {
                cmd = cmd.arg(format!("-o{}", options));
            }
            cmd.arg(remote_location(host)).path_arg(mount_path)
        })
        .collect()
}

/// `fusermount -u <mountPath>`
pub fn unmount_command(mount_path: &Path) -> CommandLine {
    CommandLine::new("fusermount").arg("-u").path_arg(mount_path)
}

fn remote_location(host: &SshHost) -> String {
    format!("{}@{}:{}", host.user, host.address, host.remote_mount_path)
}
