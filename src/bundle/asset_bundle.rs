// Immutable, file-backed asset set for one version, with parent-chain fallback.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::integrity::sha256_file;
use super::manifest::Manifest;
use crate::config::{DEFAULT_ENTRY_FILE, DEFAULT_MANIFEST_FILE, MAX_CHAIN_DEPTH};
use crate::error::BundleLoadError;

/// Knobs that control how a version directory is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub manifest_file: String,
    pub entry_file: String,
    pub max_chain_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            max_chain_depth: MAX_CHAIN_DEPTH,
        }
    }
}

/// A successful lookup through the bundle chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub absolute_path: PathBuf,
    pub hash: String,
    pub size: u64,
    /// Version of the bundle that owns the file.
    pub version: String,
}

#[derive(Debug)]
pub struct AssetBundle {
    version: String,
    root_directory: PathBuf,
    manifest: Manifest,
    entry_file: String,
    parent: Option<Arc<AssetBundle>>,
    depth: usize,
    max_chain_depth: usize,
}

impl AssetBundle {
    /// Load the bundle in `directory` with default options.
    pub fn construct(
        directory: impl AsRef<Path>,
        explicit_version: Option<&str>,
        parent: Option<Arc<AssetBundle>>,
    ) -> Result<Self, BundleLoadError> {
        Self::construct_with(directory, explicit_version, parent, &LoadOptions::default())
    }

    /// Load the bundle in `directory`.
    ///
    /// Reads the manifest, checks every own asset exists with the declared size
    /// and requires the entry document to resolve somewhere in the chain.
    pub fn construct_with(
        directory: impl AsRef<Path>,
        explicit_version: Option<&str>,
        parent: Option<Arc<AssetBundle>>,
        options: &LoadOptions,
    ) -> Result<Self, BundleLoadError> {
        let root_directory = fs::canonicalize(directory.as_ref()).map_err(|_| {
            BundleLoadError::Missing {
                path: directory.as_ref().join(&options.manifest_file),
            }
        })?;
        let manifest_path = root_directory.join(&options.manifest_file);
        let manifest = Manifest::load(&manifest_path)?;

        let version = match explicit_version.or(manifest.version.as_deref()) {
            Some(version) => version.to_string(),
            None => {
                return Err(BundleLoadError::corrupt(
                    &manifest_path,
                    "no version in manifest and none given",
                ))
            }
        };

        let depth = parent.as_ref().map_or(1, |p| p.depth + 1);
        if depth > options.max_chain_depth {
            return Err(BundleLoadError::corrupt(
                &manifest_path,
                format!(
                    "parent chain depth {} exceeds limit {}",
                    depth, options.max_chain_depth
                ),
            ));
        }

        for entry in manifest.entries() {
            let file = root_directory.join(&entry.path);
            let meta = fs::metadata(&file).map_err(|e| {
                BundleLoadError::corrupt(&manifest_path, format!("asset {}: {e}", entry.path))
            })?;
            if !meta.is_file() || meta.len() != entry.size {
                return Err(BundleLoadError::corrupt(
                    &manifest_path,
                    format!(
                        "asset {} is {} bytes on disk, manifest says {}",
                        entry.path,
                        meta.len(),
                        entry.size
                    ),
                ));
            }
        }

        let bundle = Self {
            version,
            root_directory,
            manifest,
            entry_file: options.entry_file.clone(),
            parent,
            depth,
            max_chain_depth: options.max_chain_depth,
        };

        if bundle.resolve(&bundle.entry_file).is_none() {
            return Err(BundleLoadError::corrupt(
                &manifest_path,
                format!("entry document {} not found in bundle chain", bundle.entry_file),
            ));
        }

        info!(
            "loaded bundle version={} dir={} assets={} depth={}",
            bundle.version,
            bundle.root_directory.display(),
            bundle.manifest.len(),
            bundle.depth
        );
        Ok(bundle)
    }

    /// Resolve a URL path against this bundle, falling back through parents.
    pub fn resolve(&self, path: &str) -> Option<ResolvedAsset> {
        let mut current = Some(self);
        let mut hops = 0;
        while let Some(bundle) = current {
            if hops >= self.max_chain_depth {
                debug!("resolve {} stopped at chain depth limit", path);
                return None;
            }
            if let Some(entry) = bundle.manifest.get(path) {
                return Some(ResolvedAsset {
                    absolute_path: bundle.root_directory.join(&entry.path),
                    hash: entry.hash.clone(),
                    size: entry.size,
                    version: bundle.version.clone(),
                });
            }
            current = bundle.parent.as_deref();
            hops += 1;
        }
        None
    }

    /// Resolve the bootstrap document.
    pub fn resolve_entry(&self) -> Option<ResolvedAsset> {
        self.resolve(&self.entry_file)
    }

    /// Runtime configuration: bundle-defined keys plus `version`.
    pub fn runtime_config(&self) -> Map<String, Value> {
        let mut config = self.manifest.runtime_config.clone();
        config.insert("version".to_string(), Value::String(self.version.clone()));
        config
    }

    /// Recompute content hashes of this bundle's own files.
    ///
    /// Returns the paths whose contents do not match the manifest. Parents are
    /// not checked; they were verified when they were activated.
    pub fn verify_hashes(&self) -> Vec<String> {
        let mut mismatched: Vec<String> = self
            .manifest
            .entries()
            .filter(|entry| {
                match sha256_file(&self.root_directory.join(&entry.path)) {
                    Ok(actual) => actual != entry.hash,
                    Err(_) => true,
                }
            })
            .map(|entry| entry.path.clone())
            .collect();
        mismatched.sort();
        mismatched
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn parent(&self) -> Option<&Arc<AssetBundle>> {
        self.parent.as_ref()
    }

    /// Number of bundles in the chain starting at this one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn own_asset_count(&self) -> usize {
        self.manifest.len()
    }

    pub fn entry_file(&self) -> &str {
        &self.entry_file
    }
}
