use std::path::Path;

use tracing::debug;

// Local paths are assumed to be reachable already.

pub fn mount(mount_path: &Path) {
    debug!(path = %mount_path.display(), "Skipping mount of local directory");
}

pub fn unmount(mount_path: &Path) {
    debug!(path = %mount_path.display(), "Skipping unmount of local directory");
}
