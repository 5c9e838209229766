// Shared fixtures: version directories with manifests written on the fly.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use hotswap_engine::bundle::integrity::sha256_hex;
use hotswap_engine::server::bootstrap::extract_runtime_config;

/// Entry document with the runtime-config placeholder, tagged with `label`.
pub fn index_html(label: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>t</title><!-- runtime-config --></head><body>{}</body></html>",
        label
    )
}

/// Write `files` and a matching manifest into `root/name`.
pub fn write_version(
    root: &Path,
    name: &str,
    version: Option<&str>,
    files: &[(&str, &str)],
) -> PathBuf {
    write_version_with_config(root, name, version, files, Map::new())
}

pub fn write_version_with_config(
    root: &Path,
    name: &str,
    version: Option<&str>,
    files: &[(&str, &str)],
    runtime_config: Map<String, Value>,
) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();

    let mut assets = Vec::new();
    for (path, contents) in files {
        let file = dir.join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&file, contents).unwrap();
        assets.push(json!({
            "path": path,
            "hash": sha256_hex(contents.as_bytes()),
            "size": contents.len(),
        }));
    }

    let mut manifest = json!({ "assets": assets, "runtime_config": runtime_config });
    if let Some(version) = version {
        manifest["version"] = json!(version);
    }
    fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
    dir
}

pub async fn fetch(port: u16, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://127.0.0.1:{}{}", port, path))
        .await
        .unwrap()
}

/// Version reported by the bootstrap document at `/`.
pub async fn served_version(port: u16) -> String {
    served_version_at(port, "/").await
}

pub async fn served_version_at(port: u16, path: &str) -> String {
    let resp = fetch(port, path).await;
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.contains("text/html"));
    let body = resp.text().await.unwrap();
    let config = extract_runtime_config(&body).expect("runtime config in bootstrap document");
    config["version"].as_str().unwrap().to_string()
}
