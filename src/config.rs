//! Migration configuration: loading, validation and mapping persistence.
//!
//! The file is TOML. Environment variables prefixed with `KMIGRATE_` override keys,
//! with `__` separating nesting levels (`KMIGRATE_TOOLS__OPTIONS="-aH"`).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::ConfigError;
use crate::core::models::{MigrationJob, MountTarget, PathPair, ToolConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "KMIGRATE_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeys {
    #[serde(rename = "pub")]
    pub public_key: PathBuf,
    #[serde(rename = "priv")]
    pub private_key: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source: MountTarget,
    pub destination: MountTarget,
    pub tools: ToolConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshKeys>,
    #[serde(default)]
    pub mapping: Vec<PathPair>,
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!("Validating configuration");

        let uses_sshfs = [&self.source, &self.destination]
            .iter()
            .any(|t| matches!(t, MountTarget::Sshfs { .. }));
        if uses_sshfs && self.ssh.is_none() {
            return Err(ConfigError::Invalid(
                "ssh configuration is required when source or destination is sshfs".to_string(),
            ));
        }

        for (side, target) in [("source", &self.source), ("destination", &self.destination)] {
            if target.mount_path().as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{} mountPath is empty", side)));
            }
            if let MountTarget::Sshfs { hosts, .. } = target {
                if hosts.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{} is sshfs but declares no hosts",
                        side
                    )));
                }
            }
        }

        for (index, pair) in self.mapping.iter().enumerate() {
            if pair.from.as_os_str().is_empty() || pair.to.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mapping entry {} has an empty from or to path",
                    index
                )));
            }
        }

        debug!("Configuration is valid");
        Ok(())
    }

    pub fn into_job(self, dry_run: bool) -> MigrationJob {
        MigrationJob {
            source: self.source,
            destination: self.destination,
            tools: self.tools,
            mapping: self.mapping,
            dry_run,
        }
    }
}

/// The configuration file on disk.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MigrationConfig, ConfigError> {
        debug!(path = %self.path.display(), "Loading configuration");

        if !self.path.exists() {
            return Err(self.load_error("file not found"));
        }

        let config: MigrationConfig = Figment::new()
            .merge(Toml::file_exact(&self.path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| self.load_error(e))?;

        debug!(
            source = %config.source.kind(),
            destination = %config.destination.kind(),
            entries = config.mapping.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Replace the `mapping` list in the file, leaving every other key untouched.
    pub fn save_mapping(&self, mapping: &[PathPair]) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.save_error(e))?;
        let mut table: toml::Table = content.parse().map_err(|e| self.save_error(e))?;

        let value = toml::Value::try_from(mapping).map_err(|e| self.save_error(e))?;
        table.insert("mapping".to_string(), value);

        let rendered = toml::to_string_pretty(&table).map_err(|e| self.save_error(e))?;
        std::fs::write(&self.path, rendered).map_err(|e| self.save_error(e))?;

        info!(path = %self.path.display(), entries = mapping.len(), "Mapping saved");
        Ok(())
    }

    fn load_error(&self, message: impl ToString) -> ConfigError {
        ConfigError::Load {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    fn save_error(&self, message: impl ToString) -> ConfigError {
        ConfigError::Save {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

/// Parse `"<source> -> <destination>"`.
pub fn parse_mapping_entry(entry: &str) -> Result<PathPair, ConfigError> {
    let parts: Vec<&str> = entry.split("->").map(str::trim).collect();
    match parts.as_slice() {
        [from, to] if !from.is_empty() && !to.is_empty() => Ok(PathPair::new(*from, *to)),
        _ => Err(ConfigError::Invalid(format!(
            "invalid mapping {:?}, expected \"<source> -> <destination>\"",
            entry
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[source]
type = "sshfs"
mountPath = "/migration/source"
options = "allow_other,reconnect"

[[source.hosts]]
hostname = "node1"
ip = "10.0.0.5"
user = "root"
port = 2222
mountPath = "/opt/docker"

[destination]
type = "local"
mountPath = "/migration/dest"

[tools]
type = "rsync"
options = "-aKhz"

[ssh]
pub = "~/.ssh/id_rsa.pub"
priv = "~/.ssh/id_rsa"

[[mapping]]
from = "/migration/source/pvc-1"
to = "/migration/dest/app"
"#;

    fn write_config(content: &str) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn loads_and_validates_sample() {
        let (_dir, store) = write_config(SAMPLE);
        let config = store.load().unwrap();
        config.validate().unwrap();

        assert_eq!(config.tools.kind, "rsync");
        assert_eq!(config.mapping.len(), 1);
        assert!(matches!(config.destination, MountTarget::Local { .. }));

        let job = config.into_job(true);
        assert!(job.dry_run);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let store = ConfigStore::new("/nonexistent/kmigrate/config.toml");
        assert!(matches!(store.load(), Err(ConfigError::Load { .. })));
    }

    #[test]
    fn unsupported_mount_kind_fails_to_load() {
        let (_dir, store) = write_config(&SAMPLE.replace("type = \"local\"", "type = \"smb\""));
        assert!(matches!(store.load(), Err(ConfigError::Load { .. })));
    }

    #[test]
    fn sshfs_requires_ssh_keys() {
        let without_ssh = SAMPLE.replace(
            "[ssh]\npub = \"~/.ssh/id_rsa.pub\"\npriv = \"~/.ssh/id_rsa\"\n",
            "",
        );
        let (_dir, store) = write_config(&without_ssh);
        let config = store.load().unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unsupported_tool_is_left_to_the_engine() {
        let (_dir, store) = write_config(&SAMPLE.replace("type = \"rsync\"", "type = \"rclone\""));
        let config = store.load().unwrap();
        config.validate().unwrap();
        assert_eq!(config.tools.kind, "rclone");
    }

    #[test]
    fn empty_mapping_path_is_rejected() {
        let empty_from = SAMPLE.replace(
            "from = \"/migration/source/pvc-1\"",
            "from = \"\"",
        );
        let (_dir, store) = write_config(&empty_from);
        let config = store.load().unwrap();
        match config.validate() {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("mapping entry 0")),
            other => panic!("Expected Invalid, got {:?}", other),
        }

        let mut config = store.load().unwrap();
        config.mapping = vec![
            PathPair::new("/migration/source/a", "/migration/dest/a"),
            PathPair::new("/migration/source/b", ""),
        ];
        match config.validate() {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("mapping entry 1")),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn save_mapping_keeps_other_keys() {
        let (_dir, store) = write_config(SAMPLE);
        let mapping = vec![
            PathPair::new("/migration/source/a", "/migration/dest/a"),
            PathPair::new("/migration/source/b", "/migration/dest/b/"),
        ];

        store.save_mapping(&mapping).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.mapping, mapping);
        assert_eq!(reloaded.tools.options, "-aKhz");
        assert!(reloaded.ssh.is_some());
    }

    #[test]
    fn parses_arrow_mapping() {
        let pair = parse_mapping_entry(" /src/a ->  /dst/a ").unwrap();
        assert_eq!(pair, PathPair::new("/src/a", "/dst/a"));

        assert!(parse_mapping_entry("/src/a").is_err());
        assert!(parse_mapping_entry("/a -> /b -> /c").is_err());
        assert!(parse_mapping_entry(" -> /b").is_err());
    }
}
