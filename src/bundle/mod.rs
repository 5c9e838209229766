// Versioned asset bundles: manifest loading, chained resolution, integrity checks.

pub mod asset_bundle;
pub mod integrity;
pub mod manifest;

pub use asset_bundle::{AssetBundle, LoadOptions, ResolvedAsset};
pub use manifest::{Manifest, ManifestEntry};
