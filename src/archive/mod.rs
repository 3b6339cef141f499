pub mod format;

use std::{
    collections::HashMap,
    io::{
        Cursor,
        Read,
        Seek,
    },
};

use zip::{
    result::ZipError,
    ZipArchive,
};

pub use format::PackageFormat;
use crate::core::DecantError;

/// ZIP entry holding the JSON object that maps numeric entry names to
/// original media filenames.
pub const MEDIA_INDEX_NAME: &str = "media";

#[derive(Debug)]
pub struct RawArchive {
    pub format: PackageFormat,
    pub database: Vec<u8>,
    /// Original filename -> raw bytes.
    pub media: HashMap<String, Vec<u8>>,
    /// Non-fatal conditions found while unpacking (e.g. indexed media missing
    /// from the archive).
    pub warnings: Vec<String>,
}

/// Opens a package archive, detects its container era, and pulls out the
/// embedded database plus every media file the index references.
pub fn read_package(bytes: &[u8]) -> Result<RawArchive, DecantError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DecantError::CorruptArchive(format!("failed to open archive: {}", e)))?;

    let format = detect_format(&archive)?;
    if let Some(reason) = format.unsupported_reason() {
        return Err(DecantError::UnsupportedFormat(format!(
            "{}: {}",
            format.database_name(),
            reason
        )));
    }

    let database = read_entry(&mut archive, format.database_name())?;
    let (media, warnings) = read_media(&mut archive)?;

    println!(
        "Unpacked {} ({} byte database, {} media files)",
        format.database_name(),
        database.len(),
        media.len()
    );

    Ok(RawArchive { format, database, media, warnings })
}

fn detect_format<R: Read + Seek>(archive: &ZipArchive<R>) -> Result<PackageFormat, DecantError> {
    let names: Vec<&str> = archive.file_names().collect();
    for format in PackageFormat::DETECTION_ORDER {
        if names.contains(&format.database_name()) {
            return Ok(format);
        }
    }

    Err(DecantError::UnsupportedFormat(
        "no collection database found in the archive".to_string(),
    ))
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, DecantError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| DecantError::CorruptArchive(format!("failed to open entry {}: {}", name, e)))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| DecantError::CorruptArchive(format!("failed to read entry {}: {}", name, e)))?;
    Ok(bytes)
}

/// Reads the media index and extracts every referenced entry. A referenced
/// entry missing from the archive is a warning, not a failure.
fn read_media<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(HashMap<String, Vec<u8>>, Vec<String>), DecantError> {
    let mut warnings = Vec::new();

    let index_bytes = match archive.by_name(MEDIA_INDEX_NAME) {
        Ok(mut entry) => {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(|e| {
                DecantError::CorruptArchive(format!("failed to read media index: {}", e))
            })?;
            bytes
        }
        Err(ZipError::FileNotFound) => {
            warnings.push("archive has no media index; importing without media".to_string());
            return Ok((HashMap::new(), warnings));
        }
        Err(e) => {
            return Err(DecantError::CorruptArchive(format!(
                "failed to open media index: {}",
                e
            )))
        }
    };

    let index: HashMap<String, String> = serde_json::from_slice(&index_bytes)
        .map_err(|e| DecantError::CorruptArchive(format!("malformed media index: {}", e)))?;

    let mut media = HashMap::with_capacity(index.len());
    for (entry_name, original_name) in index {
        match archive.by_name(&entry_name) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes).map_err(|e| {
                    DecantError::CorruptArchive(format!(
                        "failed to read media entry {}: {}",
                        entry_name, e
                    ))
                })?;
                media.insert(original_name, bytes);
            }
            Err(ZipError::FileNotFound) => {
                warnings.push(format!(
                    "media entry {} ({}) is referenced by the index but missing from the archive",
                    entry_name, original_name
                ));
            }
            Err(e) => {
                return Err(DecantError::CorruptArchive(format!(
                    "failed to open media entry {}: {}",
                    entry_name, e
                )))
            }
        }
    }

    Ok((media, warnings))
}
