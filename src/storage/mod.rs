use std::{
    fs,
    io,
    path::PathBuf,
};

use crate::media::MediaManifest;

const MANIFEST_FILE: &str = "manifest.json";

/// The vault-side surface the import pipeline writes through. Path naming
/// below the adapter's root is the adapter's business.
pub trait MediaStorage: Send + Sync {
    fn create_folder(&self, path: &str) -> io::Result<()>;
    fn exists(&self, path: &str) -> bool;
    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;
    fn save_manifest(&self, manifest: &MediaManifest) -> io::Result<()>;
    fn load_manifest(&self, base_path: &str) -> io::Result<Option<MediaManifest>>;
}

/// Filesystem adapter rooted at a base directory.
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskStorage { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn manifest_path(&self, base_path: &str) -> PathBuf {
        self.resolve(base_path).join(MANIFEST_FILE)
    }
}

impl MediaStorage for DiskStorage {
    fn create_folder(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)
    }

    fn save_manifest(&self, manifest: &MediaManifest) -> io::Result<()> {
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let path = self.manifest_path(&manifest.base_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, json)?;
        println!("Manifest saved to: {}", path.display());
        Ok(())
    }

    fn load_manifest(&self, base_path: &str) -> io::Result<Option<MediaManifest>> {
        let path = self.manifest_path(base_path);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(manifest))
    }
}
