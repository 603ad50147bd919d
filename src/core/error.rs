use std::path::PathBuf;
use thiserror::Error;

use super::models::MountKind;

/// Problems with the configuration itself, detected before anything runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration to {path}: {message}")]
    Save { path: PathBuf, message: String },
}

/// An external mount or unmount command failed.
#[derive(Error, Debug)]
pub enum MountError {
    #[error("{kind} command `{command}` exited with {}: {stderr}", display_code(.exit_code))]
    CommandFailed {
        kind: MountKind,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{kind} command `{command}` could not be run: {source}")]
    Io {
        kind: MountKind,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read mount table: {0}")]
    MountTable(#[source] std::io::Error),

    #[error("{kind} command `{command}` was cancelled")]
    Cancelled { kind: MountKind, command: String },
}

/// The sync tool could not finish a copy.
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while supervising copy: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync tool exited with {}: {stderr}", display_code(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Copy was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("No mapping found in configuration, add entries with `kmigrate map add`")]
    NoMapping,

    #[error("Unsupported tool {0}")]
    UnsupportedTool(String),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error("Copy of {label} failed: {source}")]
    Copy {
        label: String,
        #[source]
        source: CopyError,
    },

    #[error("Migration was cancelled")]
    Cancelled,
}

impl MigrationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Mount(MountError::Cancelled { .. })
                | Self::Copy {
                    source: CopyError::Cancelled,
                    ..
                }
        )
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (killed by signal)".to_string(),
    }
}
