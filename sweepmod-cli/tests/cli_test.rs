//! Integration tests for the sweepmod CLI internals.

use std::path::Path;
use std::time::Duration;
use sweepmod_cli::check::check;
use sweepmod_cli::watch::{watch_until, WatchOptions};
use sweepmod_runtime::API_VERSION;
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

fn write_mod(dir: &Path, namespace: &str, extra: &str) {
    let mod_dir = dir.join(namespace);
    std::fs::create_dir_all(&mod_dir).unwrap();
    std::fs::write(
        mod_dir.join("mod.toml"),
        format!(
            r#"[mod]
name = "{namespace}"
version = "1.0.0"
api_version = "1.0.0"
namespace = "{namespace}"
{extra}"#
        ),
    )
    .unwrap();
}

fn options(dir: &Path) -> WatchOptions {
    WatchOptions {
        search_paths: vec![dir.to_path_buf()],
        include_user_dir: false,
        api_version: API_VERSION,
        interval: Duration::from_millis(20),
    }
}

// ==============================================================================
// Check
// ==============================================================================

#[test]
fn test_check_reports_order_and_failures() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(temp_dir.path(), "base", "load_priority = 5\n");
    write_mod(
        temp_dir.path(),
        "addon",
        "\n[[dependencies]]\nnamespace = \"base\"\nkind = \"required\"\n",
    );
    write_mod(
        temp_dir.path(),
        "orphan",
        "\n[[dependencies]]\nnamespace = \"ghost\"\nkind = \"required\"\n",
    );
    std::fs::create_dir_all(temp_dir.path().join("broken")).unwrap();
    std::fs::write(temp_dir.path().join("broken/mod.toml"), "not [valid").unwrap();

    let report = check(&[temp_dir.path().to_path_buf()], false, API_VERSION).unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.load_order, vec!["base", "addon"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].namespace, "orphan");
    assert!(report.failures[0].reason.contains("ghost"));
    assert_eq!(report.manifest_errors.len(), 1);
    assert!(!report.is_clean());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["load_order"][0], "base");
}

#[test]
fn test_check_clean_directory() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(temp_dir.path(), "solo", "");

    let report = check(&[temp_dir.path().to_path_buf()], false, API_VERSION).unwrap();
    assert!(report.is_clean());
    assert!(report.render().contains("solo"));
}

// ==============================================================================
// Watch
// ==============================================================================

#[tokio::test]
async fn test_watch_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(temp_dir.path(), "solo", "");

    let summary = watch_until(
        options(temp_dir.path()),
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert!(summary.scans >= 1);
    assert_eq!(summary.changes, 0);
    assert_eq!(summary.last.unwrap().load_order, vec!["solo"]);
}

#[tokio::test]
async fn test_watch_notices_new_mods() {
    let temp_dir = TempDir::new().unwrap();
    write_mod(temp_dir.path(), "first", "");
    let root = temp_dir.path().to_path_buf();

    let shutdown = async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        write_mod(&root, "second", "");
        tokio::time::sleep(Duration::from_millis(150)).await;
    };

    let summary = watch_until(options(temp_dir.path()), shutdown).await.unwrap();

    assert!(summary.changes >= 1);
    assert_eq!(summary.last.unwrap().load_order, vec!["first", "second"]);
}
