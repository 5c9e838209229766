// Version manifest parsing and structural validation.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::BundleLoadError;

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    version: Option<String>,
    #[serde(default)]
    runtime_config: Option<Map<String, Value>>,
    assets: Vec<RawEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    path: String,
    url: Option<String>,
    hash: String,
    size: u64,
}

/// One file described by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the version directory.
    pub path: String,
    /// URL path (always starting with `/`) the asset is served under.
    pub url: String,
    /// Lowercase hex SHA-256 of the file contents.
    pub hash: String,
    /// Byte length of the file.
    pub size: u64,
}

/// Parsed, validated manifest of a single version directory.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub version: Option<String>,
    pub runtime_config: Map<String, Value>,
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    /// Read and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, BundleLoadError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BundleLoadError::Missing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(BundleLoadError::corrupt(path, format!("unreadable: {e}"))),
        };
        Self::parse(&text).map_err(|detail| BundleLoadError::corrupt(path, detail))
    }

    /// Parse manifest JSON. Errors are returned as a human-readable detail string.
    pub fn parse(text: &str) -> Result<Self, String> {
        let raw: RawManifest = serde_json::from_str(text).map_err(|e| e.to_string())?;

        if let Some(version) = &raw.version {
            if version.trim().is_empty() {
                return Err("version is empty".to_string());
            }
        }

        let mut entries = HashMap::with_capacity(raw.assets.len());
        for entry in raw.assets {
            validate_relative_path(&entry.path)?;
            if entry.hash.trim().is_empty() {
                return Err(format!("asset {} has an empty hash", entry.path));
            }
            let url = match entry.url {
                Some(url) => normalize_url(&url),
                None => normalize_url(&entry.path),
            };
            if url == "/" {
                return Err(format!("asset {} maps to the bootstrap path", entry.path));
            }
            let record = ManifestEntry {
                path: entry.path,
                url: url.clone(),
                hash: entry.hash.to_ascii_lowercase(),
                size: entry.size,
            };
            if entries.insert(url.clone(), record).is_some() {
                return Err(format!("duplicate asset url {url}"));
            }
        }

        Ok(Self {
            version: raw.version,
            runtime_config: raw.runtime_config.unwrap_or_default(),
            entries,
        })
    }

    /// Look up an entry by URL path (with or without a leading `/`).
    pub fn get(&self, url: &str) -> Option<&ManifestEntry> {
        if url.starts_with('/') {
            self.entries.get(url)
        } else {
            self.entries.get(&normalize_url(url))
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_url(url: &str) -> String {
    format!("/{}", url.trim_start_matches('/'))
}

/// Reject anything that could escape the version directory.
fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("asset with empty path".to_string());
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("asset path {path} is not a plain relative path")),
        }
    }
    Ok(())
}
