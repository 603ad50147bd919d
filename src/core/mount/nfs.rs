use std::path::Path;

use crate::process::CommandLine;

/// `mount -t nfs <server>:<serverPath> <mountPath>`
pub fn mount_command(server: &str, server_path: &str, mount_path: &Path) -> CommandLine {
    CommandLine::new("mount")
        .arg("-t")
        .arg("nfs")
        .arg(format!("{}:{}", server, server_path))
        .path_arg(mount_path)
}

/// `umount <mountPath>`
pub fn unmount_command(mount_path: &Path) -> CommandLine {
    CommandLine::new("umount").path_arg(mount_path)
}
