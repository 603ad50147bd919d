//! End-to-end runs: configuration file -> MigrationEngine -> sync tool.
//!
//! The sync tool is either a recording shell script or, when installed, real rsync.

use kmigrate::adapters::{SimulatedMountTable, SimulatedRunner};
use kmigrate::config::ConfigStore;
use kmigrate::context::AppContext;
use kmigrate::core::transfer_engine::create_engine;
use kmigrate::core::{CopyError, CopyStatus, MigrationEngine, MigrationError, PathPair};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

fn has_rsync() -> bool {
    Command::new("rsync").arg("--version").output().is_ok()
}

/// Helper to write an executable `/bin/sh` script
fn fake_tool(dir: &Path, body: &str) -> String {
    let path = dir.join("fake-rsync");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.display().to_string()
}

fn write_config(dir: &Path, binary: Option<&str>, mapping: &[(String, String)]) -> ConfigStore {
    let mut content = format!(
        r#"
[source]
type = "local"
mountPath = "{src}"

[destination]
type = "local"
mountPath = "{dst}"

[tools]
type = "rsync"
options = "-a"
"#,
        src = dir.join("source").display(),
        dst = dir.join("dest").display(),
    );
    if let Some(binary) = binary {
        content.push_str(&format!("binary = \"{}\"\n", binary));
    }
    for (from, to) in mapping {
        content.push_str(&format!("\n[[mapping]]\nfrom = \"{}\"\nto = \"{}\"\n", from, to));
    }

    let path = dir.join("config.toml");
    std::fs::write(&path, content).unwrap();
    ConfigStore::new(path)
}

fn engine_from(store: &ConfigStore, dry_run: bool) -> MigrationEngine {
    let config = store.load().unwrap();
    config.validate().unwrap();
    let job = config.into_job(dry_run);
    let engine = create_engine(&job.tools, false);
    let ctx = AppContext::with_adapters(
        job,
        Arc::new(SimulatedRunner::default()),
        Arc::new(SimulatedMountTable::default()),
        engine,
    );
    MigrationEngine::new(ctx)
}

#[tokio::test]
async fn second_failure_stops_the_third_copy() {
    let temp = tempdir().unwrap();
    let log = temp.path().join("invocations");
    let tool = fake_tool(
        temp.path(),
        &format!(
            r#"echo "$3" >> "{log}"
case "$3" in
  */b/) echo "rsync: change_dir failed" >&2; exit 23 ;;
esac
printf '%s\n' "data.bin" "  100%""#,
            log = log.display()
        ),
    );
    let mapping = ["a", "b", "c"]
        .iter()
        .map(|n| (format!("/src/{}", n), format!("/dst/{}", n)))
        .collect::<Vec<_>>();
    let store = write_config(temp.path(), Some(&tool), &mapping);

    let engine = engine_from(&store, false);
    let err = engine.run().await.unwrap_err();

    match err {
        MigrationError::Copy { label, source } => {
            assert_eq!(label, "/src/b");
            assert!(matches!(
                source,
                CopyError::Failed {
                    exit_code: Some(23),
                    ..
                }
            ));
        }
        other => panic!("Expected a copy failure, got {:?}", other),
    }

    let invoked = std::fs::read_to_string(&log).unwrap();
    assert_eq!(invoked.lines().collect::<Vec<_>>(), vec!["/src/a/", "/src/b/"]);

    let outcomes = engine.context().progress.get_all().await;
    assert_eq!(outcomes[0].status, CopyStatus::Succeeded);
    assert_eq!(outcomes[0].current_file.as_deref(), Some("data.bin"));
    assert_eq!(outcomes[2].status, CopyStatus::Pending);
}

#[tokio::test]
async fn dry_run_never_starts_the_tool() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("ran");
    let tool = fake_tool(temp.path(), &format!(r#"touch "{}""#, marker.display()));
    let store = write_config(
        temp.path(),
        Some(&tool),
        &[("/src/a".to_string(), "/dst/a".to_string())],
    );

    let summary = engine_from(&store, true).run().await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.outcomes[0].status, CopyStatus::Succeeded);
    assert!(!marker.exists());
}

#[tokio::test]
async fn saved_mapping_drives_the_next_run() {
    let temp = tempdir().unwrap();
    let log = temp.path().join("invocations");
    let tool = fake_tool(
        temp.path(),
        &format!(r#"echo "$3 $4" >> "{}""#, log.display()),
    );
    let store = write_config(temp.path(), Some(&tool), &[]);

    assert!(matches!(
        engine_from(&store, false).run().await,
        Err(MigrationError::NoMapping)
    ));
    assert!(!log.exists());

    store
        .save_mapping(&[PathPair::new("/src/x", "/dst/y/")])
        .unwrap();
    engine_from(&store, false).run().await.unwrap();

    let invoked = std::fs::read_to_string(&log).unwrap();
    assert_eq!(invoked.trim(), "/src/x/ /dst/y/");
}

#[tokio::test]
async fn real_rsync_copies_directory_contents() {
    if !has_rsync() {
        eprintln!("Skipping: rsync not installed");
        return;
    }

    let temp = tempdir().unwrap();
    let source = temp.path().join("source").join("pvc-1");
    let dest = temp.path().join("dest").join("app");
    std::fs::create_dir_all(source.join("nested")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("top.txt"), b"top").unwrap();
    std::fs::write(source.join("nested/inner.txt"), vec![0xAB; 64 * 1024]).unwrap();

    let store = write_config(
        temp.path(),
        None,
        &[(source.display().to_string(), dest.display().to_string())],
    );

    let summary = engine_from(&store, false).run().await.unwrap();

    assert_eq!(summary.outcomes[0].status, CopyStatus::Succeeded);
    assert_eq!(summary.outcomes[0].percent_complete, 100);
    // Contents land directly in the destination, not in dest/pvc-1.
    assert_eq!(std::fs::read(dest.join("top.txt")).unwrap(), b"top");
    assert!(dest.join("nested/inner.txt").exists());
    assert!(!dest.join("pvc-1").exists());
}
