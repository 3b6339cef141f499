use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use uuid::Uuid;

use crate::{
    core::{
        models::MediaKind,
        DecantError,
    },
    storage::MediaStorage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub original_name: String,
    pub saved_path: String,
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub content_hash: String,
}

/// Record of every media asset persisted during an import, mapping original
/// filenames to where they landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaManifest {
    pub base_path: String,
    pub entries: Vec<ManifestEntry>,
}

impl MediaManifest {
    pub fn find(&self, original_name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.original_name == original_name)
    }
}

#[derive(Debug, Clone)]
pub struct MediaError {
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct MediaStats {
    pub written: usize,
    pub duplicated: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct MediaOutcome {
    pub manifest: MediaManifest,
    pub errors: Vec<MediaError>,
    pub stats: MediaStats,
}

/// Persists the archive's media files into a folder scoped to the imported
/// collection. Dedup is by destination-path existence, not a global hash
/// index: re-importing the same name reuses the existing file, while the
/// same bytes under a new name are written again. Per-file failures are
/// collected, and the manifest is persisted even when some files failed.
pub fn process_media(
    media: &HashMap<String, Vec<u8>>,
    collection_name: &str,
    storage: &dyn MediaStorage,
) -> Result<MediaOutcome, DecantError> {
    let base_path = sanitize_component(collection_name);
    storage.create_folder(&base_path)?;

    let mut manifest = MediaManifest { base_path: base_path.clone(), entries: Vec::new() };
    let mut errors = Vec::new();
    let mut stats = MediaStats::default();

    // Stable iteration order
    let mut names: Vec<&String> = media.keys().collect();
    names.sort();

    for name in names {
        let bytes = &media[name];
        let saved_path = format!("{}/{}", base_path, sanitize_component(name));

        if storage.exists(&saved_path) {
            stats.duplicated += 1;
        } else if let Err(e) = storage.write(&saved_path, bytes) {
            errors.push(MediaError { file_name: name.clone(), message: e.to_string() });
            stats.failed += 1;
            continue;
        } else {
            stats.written += 1;
        }

        manifest.entries.push(ManifestEntry {
            id: Uuid::new_v4().to_string(),
            original_name: name.clone(),
            saved_path,
            kind: MediaKind::from_name(name),
            size_bytes: bytes.len() as u64,
            content_hash: format!("{:x}", Sha256::digest(bytes)),
        });
    }

    if let Err(e) = storage.save_manifest(&manifest) {
        errors.push(MediaError { file_name: String::new(), message: format!("failed to persist manifest: {}", e) });
    }

    println!(
        "Media: {} written, {} duplicates, {} failed",
        stats.written, stats.duplicated, stats.failed
    );

    Ok(MediaOutcome { manifest, errors, stats })
}

/// Makes a collection or file name safe to use as a single path component.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;

    fn media_map(entries: &[(&str, &[u8])]) -> HashMap<String, Vec<u8>> {
        entries.iter().map(|(name, bytes)| (name.to_string(), bytes.to_vec())).collect()
    }

    #[test]
    fn writes_files_and_records_manifest_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        let media = media_map(&[("cat.jpg", b"jpeg"), ("meow.mp3", b"audio")]);

        let outcome = process_media(&media, "My Deck", &storage).unwrap();

        assert_eq!(outcome.stats.written, 2);
        assert_eq!(outcome.stats.duplicated, 0);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.manifest.entries.len(), 2);

        let image = outcome.manifest.find("cat.jpg").unwrap();
        assert_eq!(image.saved_path, "My Deck/cat.jpg");
        assert_eq!(image.kind, MediaKind::Image);
        assert_eq!(image.size_bytes, 4);
        assert!(storage.exists(&image.saved_path));

        let audio = outcome.manifest.find("meow.mp3").unwrap();
        assert_eq!(audio.kind, MediaKind::Audio);

        // Manifest persisted alongside the files
        assert!(storage.load_manifest("My Deck").unwrap().is_some());
    }

    #[test]
    fn identical_bytes_under_two_names_get_two_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        let media = media_map(&[("a.png", b"same bytes"), ("b.png", b"same bytes")]);

        let outcome = process_media(&media, "Deck", &storage).unwrap();

        assert_eq!(outcome.stats.written, 2);
        let first = outcome.manifest.find("a.png").unwrap();
        let second = outcome.manifest.find("b.png").unwrap();
        assert_ne!(first.saved_path, second.saved_path);
        assert_eq!(first.content_hash, second.content_hash);
        assert!(storage.exists(&first.saved_path));
        assert!(storage.exists(&second.saved_path));
    }

    #[test]
    fn existing_destination_is_reused_without_rewriting() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        let media = media_map(&[("cat.jpg", b"new bytes")]);

        storage.write("Deck/cat.jpg", b"old bytes").unwrap();
        let outcome = process_media(&media, "Deck", &storage).unwrap();

        assert_eq!(outcome.stats.written, 0);
        assert_eq!(outcome.stats.duplicated, 1);
        // Bytes on disk untouched; the manifest still maps the name
        assert_eq!(std::fs::read(dir.path().join("Deck/cat.jpg")).unwrap(), b"old bytes");
        assert_eq!(outcome.manifest.find("cat.jpg").unwrap().saved_path, "Deck/cat.jpg");
    }

    #[test]
    fn hostile_names_are_sanitized() {
        assert_eq!(sanitize_component("My: Deck?"), "My_ Deck_");
        assert_eq!(sanitize_component("..\\..\\evil"), "_.._evil");
        assert_eq!(sanitize_component(""), "untitled");
    }
}
