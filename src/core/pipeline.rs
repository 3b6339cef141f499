use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::Instant,
};

use rayon::iter::{
    IntoParallelRefIterator,
    ParallelIterator,
};

use crate::{
    archive,
    assembler,
    collection,
    core::{
        models::{
            ArchiveMetadata,
            Card,
            SourceDeck,
            SourceModel,
        },
        DecantError,
    },
    fields,
    media::{
        self,
        MediaError,
        MediaManifest,
    },
    storage::MediaStorage,
};

/// Cooperative cancellation flag, checked between notes. Cloning shares the
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A recoverable condition collected during an import. `note_id` is set when
/// the condition belongs to a specific note so callers can correlate.
#[derive(Debug, Clone)]
pub struct ImportWarning {
    pub note_id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub notes_total: usize,
    pub cards_built: usize,
    pub notes_skipped: usize,
    pub media_written: usize,
    pub media_duplicated: usize,
    pub media_failed: usize,
}

/// Everything one import run produced. Partial output plus the warning list
/// lets a caller report "N of M notes imported" instead of all-or-nothing.
#[derive(Debug)]
pub struct ImportReport {
    pub cards: Vec<Card>,
    pub decks: Vec<SourceDeck>,
    pub manifest: MediaManifest,
    pub metadata: ArchiveMetadata,
    pub media_errors: Vec<MediaError>,
    pub warnings: Vec<ImportWarning>,
    pub stats: ImportStats,
}

enum NoteOutcome {
    Built(Box<Card>, i64, Vec<String>),
    Skipped(i64, String),
    Cancelled,
}

/// Runs the whole import: unpack the archive, read the embedded collection,
/// resolve field sides, persist media, then transcode and assemble every
/// note on a worker pool. Fatal conditions return early; everything
/// recoverable lands in the report.
pub fn import_package(
    bytes: &[u8],
    collection_name: &str,
    storage: &dyn MediaStorage,
    cancel: &CancelToken,
) -> Result<ImportReport, DecantError> {
    let total_start = Instant::now();

    let raw_archive = archive::read_package(bytes)?;
    let mut warnings: Vec<ImportWarning> = raw_archive
        .warnings
        .into_iter()
        .map(|message| ImportWarning { note_id: None, message })
        .collect();

    let data = collection::read_collection(&raw_archive.database)?;

    let resolution = fields::resolve_sides(&data.models);
    warnings.extend(
        resolution
            .warnings
            .into_iter()
            .map(|message| ImportWarning { note_id: None, message }),
    );

    let media_outcome = media::process_media(&raw_archive.media, collection_name, storage)?;

    if cancel.is_cancelled() {
        return Err(DecantError::Cancelled);
    }

    let models_by_id: HashMap<i64, &SourceModel> =
        data.models.iter().map(|model| (model.id, model)).collect();

    let assembly_start = Instant::now();
    let outcomes: Vec<NoteOutcome> = data
        .notes
        .par_iter()
        .map(|note| {
            if cancel.is_cancelled() {
                return NoteOutcome::Cancelled;
            }
            let Some(model) = models_by_id.get(&note.model_id).copied() else {
                return NoteOutcome::Skipped(
                    note.id,
                    format!("note {} references unknown model {}", note.id, note.model_id),
                );
            };
            match assembler::build_card(note, model, &resolution.map, &media_outcome.manifest) {
                Ok((card, note_warnings)) => {
                    NoteOutcome::Built(Box::new(card), note.id, note_warnings)
                }
                Err(e) => NoteOutcome::Skipped(note.id, e.to_string()),
            }
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(DecantError::Cancelled);
    }

    let mut cards = Vec::with_capacity(outcomes.len());
    let mut skipped = 0usize;
    for outcome in outcomes {
        match outcome {
            NoteOutcome::Built(card, note_id, note_warnings) => {
                warnings.extend(note_warnings.into_iter().map(|message| ImportWarning {
                    note_id: Some(note_id),
                    message,
                }));
                cards.push(*card);
            }
            NoteOutcome::Skipped(note_id, message) => {
                skipped += 1;
                warnings.push(ImportWarning { note_id: Some(note_id), message });
            }
            NoteOutcome::Cancelled => {}
        }
    }
    println!(
        "Assembled {} cards from {} notes ({:.2}s)",
        cards.len(),
        data.notes.len(),
        assembly_start.elapsed().as_secs_f32()
    );

    let stats = ImportStats {
        notes_total: data.notes.len(),
        cards_built: cards.len(),
        notes_skipped: skipped,
        media_written: media_outcome.stats.written,
        media_duplicated: media_outcome.stats.duplicated,
        media_failed: media_outcome.stats.failed,
    };

    println!(
        "Import completed: {}/{} notes, {} warnings ({:.1}s total)",
        stats.cards_built,
        stats.notes_total,
        warnings.len(),
        total_start.elapsed().as_secs_f32()
    );

    Ok(ImportReport {
        cards,
        decks: data.decks,
        manifest: media_outcome.manifest,
        metadata: data.metadata,
        media_errors: media_outcome.errors,
        warnings,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rusqlite::Connection;
    use zip::{
        write::SimpleFileOptions,
        ZipWriter,
    };

    use super::*;
    use crate::{
        core::models::FIELD_SEPARATOR,
        storage::DiskStorage,
    };

    const MODELS_JSON: &str = r#"{
        "1000": {
            "id": 1000,
            "name": "Basic",
            "type": 0,
            "did": 100,
            "flds": [
                {"name": "Front", "ord": 0},
                {"name": "Back", "ord": 1}
            ],
            "tmpls": [
                {"qfmt": "{{Front}}", "afmt": "{{FrontSide}}<hr id=answer>{{Back}}"}
            ]
        }
    }"#;

    const DECKS_JSON: &str = r#"{
        "1": {"id": 1, "name": "Default", "desc": ""},
        "100": {"id": 100, "name": "Geography", "desc": ""}
    }"#;

    fn build_collection_db(notes: &[(i64, &str, &str)]) -> Vec<u8> {
        let temp = tempfile::NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE col (crt integer, mod integer, ver integer, models text, decks text);
                 CREATE TABLE notes (id integer primary key, guid text, mid integer, mod integer, tags text, flds text, sfld text);",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO col (crt, mod, ver, models, decks) VALUES (1600000000, 1700000000, 11, ?1, ?2)",
                [MODELS_JSON, DECKS_JSON],
            )
            .unwrap();
            for (id, fields, tags) in notes {
                conn.execute(
                    "INSERT INTO notes (id, guid, mid, mod, tags, flds, sfld) VALUES (?1, ?2, 1000, 1650000000, ?3, ?4, '')",
                    rusqlite::params![id, format!("guid{}", id), tags, fields],
                )
                .unwrap();
            }
        }
        std::fs::read(temp.path()).unwrap()
    }

    fn build_package(db_name: &str, database: &[u8], media: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(db_name, options).unwrap();
        zip.write_all(database).unwrap();

        let index: HashMap<&str, &str> =
            media.iter().map(|(entry, name, _)| (*entry, *name)).collect();
        zip.start_file("media", options).unwrap();
        zip.write_all(serde_json::to_string(&index).unwrap().as_bytes()).unwrap();

        for (entry, _, bytes) in media {
            zip.start_file(*entry, options).unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap();
        cursor.into_inner()
    }

    fn joined(fields: &[&str]) -> String {
        fields.join(&FIELD_SEPARATOR.to_string())
    }

    #[test]
    fn imports_a_full_package_end_to_end() {
        let database = build_collection_db(&[
            (1, &joined(&["2+2?", "4"]), " math easy "),
            (2, &joined(&[r#"<img src="map.png"> Where is Paris?"#, "<b>France</b>"]), "geo"),
            (3, &joined(&["", ""]), ""), // Nothing usable, skipped with a warning
        ]);
        let package =
            build_package("collection.anki21", &database, &[("0", "map.png", b"png bytes")]);

        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());

        let report =
            import_package(&package, "Geography", &storage, &CancelToken::new()).unwrap();

        assert_eq!(report.stats.notes_total, 3);
        assert_eq!(report.stats.cards_built, 2);
        assert_eq!(report.stats.notes_skipped, 1);
        assert_eq!(report.stats.media_written, 1);
        assert_eq!(report.decks.len(), 1);
        assert_eq!(report.metadata.tool_version, "11");
        assert!(report.media_errors.is_empty());

        // The skipped note's warning is correlated by id
        assert!(report
            .warnings
            .iter()
            .any(|w| w.note_id == Some(3) && w.message.contains("no usable content")));

        let simple = report.cards.iter().find(|c| c.id == 1).unwrap();
        assert_eq!(simple.deck_id, 100);
        assert_eq!(simple.tags, vec!["math", "easy"]);
        assert_eq!(simple.sides.front.as_deref(), Some("2+2?"));
        assert_eq!(simple.sides.back.as_deref(), Some("4"));

        let with_media = report.cards.iter().find(|c| c.id == 2).unwrap();
        assert!(with_media.raw_content.contains("![[Geography/map.png]]"));
        assert!(with_media.raw_content.contains("**France**"));

        // Media landed on disk and the manifest was persisted
        assert!(storage.exists("Geography/map.png"));
        assert!(storage.load_manifest("Geography").unwrap().is_some());
    }

    #[test]
    fn missing_media_surfaces_as_warning_not_failure() {
        let database = build_collection_db(&[(1, &joined(&["q", "a"]), "")]);
        // Index references an entry that is not in the archive
        let mut package = Vec::new();
        {
            let mut cursor = std::io::Cursor::new(&mut package);
            let mut zip = ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default();
            zip.start_file("collection.anki21", options).unwrap();
            zip.write_all(&database).unwrap();
            zip.start_file("media", options).unwrap();
            zip.write_all(br#"{"0": "lost.png"}"#).unwrap();
            zip.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        let report =
            import_package(&package, "Deck", &storage, &CancelToken::new()).unwrap();

        assert_eq!(report.stats.cards_built, 1);
        assert!(report.warnings.iter().any(|w| w.message.contains("lost.png")));
    }

    #[test]
    fn legacy_era_packages_import_the_same_way() {
        let database = build_collection_db(&[(1, &joined(&["q", "a"]), "")]);
        let package = build_package("collection.anki2", &database, &[]);

        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        let report =
            import_package(&package, "Deck", &storage, &CancelToken::new()).unwrap();

        assert_eq!(report.stats.notes_total, 1);
        assert_eq!(report.stats.cards_built, 1);
        assert_eq!(report.decks.len(), 1);
    }

    #[test]
    fn cancelled_imports_abort() {
        let database = build_collection_db(&[(1, &joined(&["q", "a"]), "")]);
        let package = build_package("collection.anki21", &database, &[]);

        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            import_package(&package, "Deck", &storage, &cancel),
            Err(DecantError::Cancelled)
        ));
    }
}
