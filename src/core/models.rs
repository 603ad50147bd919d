use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The only sync tool the engine knows how to drive.
pub const SUPPORTED_TOOL: &str = "rsync";

/// A filesystem location reachable through one transport, exposed at a local mount path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountTarget {
    /// Already reachable on this machine; mount and unmount do nothing.
    Local {
        #[serde(rename = "mountPath")]
        mount_path: PathBuf,
    },
    /// Network file share mounted with `mount -t nfs`.
    Nfs {
        #[serde(rename = "mountPath")]
        mount_path: PathBuf,
        server: String,
        #[serde(rename = "serverPath")]
        server_path: String,
    },
    /// Remote filesystem over SSH mounted with `sshfs`, once per host.
    Sshfs {
        #[serde(rename = "mountPath")]
        mount_path: PathBuf,
        hosts: Vec<SshHost>,
        #[serde(default)]
        options: String,
    },
}

impl MountTarget {
    pub fn mount_path(&self) -> &Path {
        match self {
            Self::Local { mount_path } => mount_path,
            Self::Nfs { mount_path, .. } => mount_path,
            Self::Sshfs { mount_path, .. } => mount_path,
        }
    }

    pub fn kind(&self) -> MountKind {
        match self {
            Self::Local { .. } => MountKind::Local,
            Self::Nfs { .. } => MountKind::Nfs,
            Self::Sshfs { .. } => MountKind::Sshfs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Local,
    Nfs,
    Sshfs,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Nfs => "nfs",
            Self::Sshfs => "sshfs",
        }
    }
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshHost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "ip", alias = "address")]
    pub address: String,
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(rename = "mountPath")]
    pub remote_mount_path: String,
}

fn default_ssh_port() -> u16 {
    22
}

/// One declared unit of copy work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub from: PathBuf,
    pub to: PathBuf,
}

impl PathPair {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Label shown in logs and progress: the entry name, or its source path.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.from.display().to_string(),
        }
    }

    /// Both sides with "directory contents" semantics for the sync tool.
    pub fn normalized(&self) -> (PathBuf, PathBuf) {
        (with_trailing_separator(&self.from), with_trailing_separator(&self.to))
    }
}

/// Append exactly one `/` unless the path already ends with one.
pub fn with_trailing_separator(path: &Path) -> PathBuf {
    if path.as_os_str().as_encoded_bytes().ends_with(b"/") {
        return path.to_path_buf();
    }
    let mut raw = OsString::from(path.as_os_str());
    raw.push("/");
    PathBuf::from(raw)
}

/// Sync tool selection and its pass-through options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
}

/// Immutable description of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationJob {
    pub source: MountTarget,
    pub destination: MountTarget,
    pub tools: ToolConfig,
    pub mapping: Vec<PathPair>,
    pub dry_run: bool,
}

/// Live state of one mapping entry's copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyOutcome {
    pub label: String,
    pub percent_complete: u8,
    pub current_file: Option<String>,
    pub status: CopyStatus,
}

impl CopyOutcome {
    pub fn pending(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            percent_complete: 0,
            current_file: None,
            status: CopyStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CopyStatus {
    Pending,
    Running,
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_separator_is_appended_once() {
        let pair = PathPair::new("/migration/source/pvc-1", "/migration/dest/app/");
        let (from, to) = pair.normalized();
        assert_eq!(from, PathBuf::from("/migration/source/pvc-1/"));
        assert_eq!(to, PathBuf::from("/migration/dest/app/"));
        assert_eq!(with_trailing_separator(&to), to);
    }

    #[test]
    fn label_prefers_name() {
        let mut pair = PathPair::new("/a", "/b");
        assert_eq!(pair.label(), "/a");
        pair.name = Some("postgres-data".to_string());
        assert_eq!(pair.label(), "postgres-data");
    }

    #[test]
    fn mount_target_parses_tagged_kinds() {
        let target: MountTarget = toml::from_str(
            r#"
            type = "sshfs"
            mountPath = "/migration/source"
            options = "allow_other,reconnect"

            [[hosts]]
            ip = "10.0.0.5"
            user = "root"
            mountPath = "/opt/docker"
            "#,
        )
        .unwrap();

        match target {
            MountTarget::Sshfs { hosts, options, .. } => {
                assert_eq!(options, "allow_other,reconnect");
                assert_eq!(hosts[0].port, 22);
                assert_eq!(hosts[0].address, "10.0.0.5");
            }
            other => panic!("Expected sshfs target, got {:?}", other),
        }
    }

    #[test]
    fn unknown_mount_kind_is_rejected() {
        let result: Result<MountTarget, _> = toml::from_str(
            r#"
            type = "smb"
            mountPath = "/mnt"
            "#,
        );
        assert!(result.is_err());
    }
}
