// Integration tests for version activation, reset and rollback.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotswap_engine::config::ServerConfig;
use hotswap_engine::engine::UpdateOrchestrator;
use hotswap_engine::error::{LoadFailure, OrchestratorError};
use hotswap_engine::server::{LocalServer, ServerEvent};

use common::{fetch, index_html, served_version, write_version};

/// Tracked directories are reported in canonical form.
fn canon(dir: &Path) -> PathBuf {
    fs::canonicalize(dir).unwrap()
}

fn orchestrator(config: ServerConfig, baseline: Option<&Path>) -> UpdateOrchestrator {
    let server = Arc::new(LocalServer::new(config.clone()));
    UpdateOrchestrator::new(server, config, baseline.map(Path::to_path_buf), "")
}

#[tokio::test]
async fn test_activate_restart_reset_roundtrip() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(
        root.path(),
        "a",
        Some("1.0"),
        &[
            ("index.html", index_html("index 1.0").as_str()),
            ("app.js", "app.js contents"),
        ],
    );
    let b = write_version(
        root.path(),
        "b",
        Some("1.1"),
        &[("index.html", index_html("index 1.1").as_str())],
    );

    let orch = orchestrator(ServerConfig::default(), None);

    let port = match orch.activate(&a, None).await.unwrap() {
        ServerEvent::Ready { port } => port,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(fetch(port, "/app.js").await.text().await.unwrap(), "app.js contents");
    assert_eq!(served_version(port).await, "1.0");

    let event = orch.activate(&b, Some(&a)).await.unwrap();
    assert_eq!(event, ServerEvent::Swapped { port });
    assert_eq!(orch.get_directory().as_deref(), Some(canon(&b).as_path()));
    assert_eq!(orch.get_parent_directory().as_deref(), Some(canon(&a).as_path()));
    assert_eq!(fetch(port, "/app.js").await.status(), 200);
    assert_eq!(served_version(port).await, "1.1");

    orch.reset().unwrap();
    assert_eq!(orch.get_directory().as_deref(), Some(canon(&a).as_path()));
    assert_eq!(orch.get_parent_directory(), None);
    assert!(orch.is_untrusted(&b));
    // Reset alone does not change what is served.
    assert_eq!(served_version(port).await, "1.1");

    let event = orch.activate_current().await.unwrap();
    assert_eq!(event.port(), port);
    assert_eq!(served_version(port).await, "1.0");

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_reset_without_any_target_fails() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(root.path(), "a", Some("1.0"), &[("index.html", "a")]);

    let orch = orchestrator(ServerConfig::default(), None);
    assert!(matches!(orch.reset(), Err(OrchestratorError::NoRollbackTarget)));

    orch.activate(&a, None).await.unwrap();
    assert!(matches!(orch.reset(), Err(OrchestratorError::NoRollbackTarget)));
    // The failed reset left the tracked state alone.
    assert_eq!(orch.get_directory().as_deref(), Some(canon(&a).as_path()));
    assert!(!orch.is_untrusted(&a));

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_reset_falls_back_to_baseline() {
    let root = tempfile::tempdir().unwrap();
    let base = write_version(
        root.path(),
        "baseline",
        Some("0.9"),
        &[("index.html", index_html("baseline").as_str()), ("app.js", "base app")],
    );
    let update = write_version(root.path(), "update", Some("2.0"), &[("app.js", "new app")]);

    let orch = orchestrator(ServerConfig::default(), Some(&base));
    let port = orch.activate(&update, Some(&base)).await.unwrap().port();
    assert_eq!(served_version(port).await, "2.0");
    assert_eq!(fetch(port, "/app.js").await.text().await.unwrap(), "new app");

    orch.reset().unwrap();
    assert_eq!(orch.get_directory().as_deref(), Some(canon(&base).as_path()));
    // The baseline is never its own parent.
    assert_eq!(orch.get_parent_directory(), None);

    orch.activate_current().await.unwrap();
    assert_eq!(served_version(port).await, "0.9");
    assert_eq!(fetch(port, "/app.js").await.text().await.unwrap(), "base app");

    // Nothing is tracked before a rollback target exists on a fresh orchestrator,
    // but the baseline is still a valid reset target.
    let fresh = orchestrator(ServerConfig::default(), Some(&base));
    fresh.reset().unwrap();
    assert_eq!(fresh.get_directory().as_deref(), Some(canon(&base).as_path()));
    assert_eq!(fresh.baseline_directory(), Some(canon(&base).as_path()));

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_discarded_version_is_not_reactivated() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(root.path(), "a", Some("1.0"), &[("index.html", "a")]);
    let b = write_version(root.path(), "b", Some("1.1"), &[("index.html", "b")]);

    let orch = orchestrator(ServerConfig::default(), None);
    orch.activate(&a, None).await.unwrap();
    orch.activate(&b, Some(&a)).await.unwrap();
    orch.reset().unwrap();

    let err = orch.activate(&b, Some(&a)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UntrustedVersion(_)));

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_discarded_version_refused_under_alias_path() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(root.path(), "a", Some("1.0"), &[("index.html", "a")]);
    let b = write_version(root.path(), "b", Some("1.1"), &[("index.html", "b")]);
    fs::create_dir(root.path().join("x")).unwrap();

    let orch = orchestrator(ServerConfig::default(), None);
    orch.activate(&a, None).await.unwrap();
    orch.activate(&b, Some(&a)).await.unwrap();
    orch.reset().unwrap();

    let alias = root.path().join("x").join("..").join("b");
    assert!(orch.is_untrusted(&alias));
    let err = orch.activate(&alias, Some(&a)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UntrustedVersion(_)));
    assert_eq!(orch.get_directory().as_deref(), Some(canon(&a).as_path()));

    // An aliased base directory is tracked under its canonical path too.
    let dotted_base = root.path().join(".").join("a");
    let c = write_version(root.path(), "c", Some("1.2"), &[("app.js", "c")]);
    orch.activate(&c, Some(&dotted_base)).await.unwrap();
    assert_eq!(orch.get_parent_directory().as_deref(), Some(canon(&a).as_path()));

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_bundle_load_error_never_goes_live() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(root.path(), "a", Some("1.0"), &[("index.html", "a")]);
    let broken = root.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("manifest.json"), "[1, 2").unwrap();
    let empty = root.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let orch = orchestrator(ServerConfig::default(), None);
    let port = orch.activate(&a, None).await.unwrap().port();

    match orch.activate(&broken, Some(&a)).await.unwrap_err() {
        OrchestratorError::BundleLoad(e) => assert_eq!(e.reason(), LoadFailure::Corrupt),
        other => panic!("unexpected {:?}", other),
    }
    match orch.activate(&empty, Some(&a)).await.unwrap_err() {
        OrchestratorError::BundleLoad(e) => assert_eq!(e.reason(), LoadFailure::Missing),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(orch.get_directory().as_deref(), Some(canon(&a).as_path()));
    assert_eq!(orch.get_parent_directory(), None);
    assert_eq!(served_version(port).await, "1.0");
    assert_eq!(orch.server().stats().swaps, 0);

    orch.server().shutdown().await;
}

#[tokio::test]
async fn test_hash_verification_blocks_tampered_update() {
    let root = tempfile::tempdir().unwrap();
    let a = write_version(root.path(), "a", Some("1.0"), &[("index.html", "a")]);
    let b = write_version(
        root.path(),
        "b",
        Some("1.1"),
        &[("index.html", "b"), ("app.js", "good")],
    );
    fs::write(b.join("app.js"), "evil").unwrap();

    let config = ServerConfig {
        verify_hashes_on_load: true,
        ..ServerConfig::default()
    };
    let orch = orchestrator(config, None);
    let port = orch.activate(&a, None).await.unwrap().port();

    match orch.activate(&b, Some(&a)).await.unwrap_err() {
        OrchestratorError::IntegrityMismatch { files, .. } => {
            assert_eq!(files, vec!["app.js".to_string()])
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(served_version(port).await, "1.0");

    orch.server().shutdown().await;
}
