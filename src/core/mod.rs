pub mod error;
pub mod models;
pub mod mount;
pub mod orchestrator;
pub mod progress;
pub mod transfer_engine;

pub use error::{ConfigError, CopyError, MigrationError, MountError};
pub use models::{CopyOutcome, CopyStatus, MigrationJob, MountKind, MountTarget, PathPair, SshHost};
pub use mount::MountManager;
pub use orchestrator::{MigrationEngine, RunSummary};
pub use progress::{ProgressEvent, ProgressParser, ProgressTracker};
