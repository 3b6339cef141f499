use std::{
    collections::HashMap,
    io::Write,
};

use rusqlite::{
    types::ValueRef,
    Connection,
    OpenFlags,
    OptionalExtension,
};
use serde::Deserialize;

use crate::core::{
    models::{
        ArchiveMetadata,
        CardTemplate,
        ModelKind,
        SourceDeck,
        SourceModel,
        SourceNote,
        DEFAULT_DECK_ID,
    },
    DecantError,
};

#[derive(Debug)]
pub struct CollectionData {
    pub models: Vec<SourceModel>,
    pub decks: Vec<SourceDeck>,
    pub notes: Vec<SourceNote>,
    pub metadata: ArchiveMetadata,
}

// Raw serde shapes for the JSON dictionaries stored in the configuration row.
// Deserialized first, validated into the typed structs second; a malformed
// entry is skipped rather than failing the whole read.

#[derive(Deserialize)]
struct RawModel {
    id: i64,
    name: String,
    #[serde(rename = "type", default)]
    kind: i64,
    #[serde(default)]
    flds: Vec<RawField>,
    #[serde(default)]
    tmpls: Vec<RawTemplate>,
    #[serde(default)]
    css: String,
    #[serde(default)]
    did: Option<i64>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(default)]
    ord: i64,
}

#[derive(Deserialize)]
struct RawTemplate {
    #[serde(default)]
    qfmt: String,
    #[serde(default)]
    afmt: String,
}

#[derive(Deserialize)]
struct RawDeck {
    id: i64,
    name: String,
    #[serde(default)]
    desc: String,
}

/// Reads models, decks, notes, and summary metadata out of the embedded
/// database. The bytes are materialized to a temp file because the SQLite
/// driver wants a real path.
pub fn read_collection(database: &[u8]) -> Result<CollectionData, DecantError> {
    let mut temp = tempfile::NamedTempFile::new()?;
    temp.write_all(database)?;
    temp.flush()?;

    let conn = Connection::open_with_flags(temp.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let config: Option<(String, String)> = conn
        .query_row("SELECT models, decks FROM col", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()
        .map_err(|e| DecantError::CorruptDatabase(e.to_string()))?;

    let (models_json, decks_json) = config.ok_or_else(|| {
        DecantError::CorruptDatabase("configuration row is missing from the col table".to_string())
    })?;

    let models = parse_models(&models_json)?;
    let decks = parse_decks(&decks_json)?;
    let notes = read_notes(&conn)?;
    let metadata = read_metadata(&conn, notes.len());

    println!(
        "Extracted {} models, {} decks, {} notes (tool version {})",
        models.len(),
        decks.len(),
        notes.len(),
        metadata.tool_version
    );

    Ok(CollectionData { models, decks, notes, metadata })
}

fn parse_models(json: &str) -> Result<Vec<SourceModel>, DecantError> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;

    let mut models = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        let raw_model: RawModel = match serde_json::from_value(value) {
            Ok(model) => model,
            Err(e) => {
                eprintln!("Skipping malformed model entry {}: {}", key, e);
                continue;
            }
        };

        let mut fields = raw_model.flds;
        fields.sort_by_key(|f| f.ord);

        models.push(SourceModel {
            id: raw_model.id,
            name: raw_model.name,
            kind: if raw_model.kind == 1 { ModelKind::Cloze } else { ModelKind::Standard },
            field_names: fields.into_iter().map(|f| f.name).collect(),
            templates: raw_model
                .tmpls
                .into_iter()
                .map(|t| CardTemplate { question: t.qfmt, answer: t.afmt })
                .collect(),
            style_sheet: raw_model.css,
            deck_id: raw_model.did,
        });
    }

    models.sort_by_key(|m| m.id);
    Ok(models)
}

fn parse_decks(json: &str) -> Result<Vec<SourceDeck>, DecantError> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;

    let mut decks = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        let raw_deck: RawDeck = match serde_json::from_value(value) {
            Ok(deck) => deck,
            Err(e) => {
                eprintln!("Skipping malformed deck entry {}: {}", key, e);
                continue;
            }
        };

        if raw_deck.id == DEFAULT_DECK_ID {
            continue;
        }

        decks.push(SourceDeck {
            id: raw_deck.id,
            name: raw_deck.name,
            description: raw_deck.desc,
        });
    }

    decks.sort_by_key(|d| d.id);
    Ok(decks)
}

fn read_notes(conn: &Connection) -> Result<Vec<SourceNote>, DecantError> {
    let mut stmt =
        conn.prepare("SELECT id, guid, mid, mod, tags, flds, sfld FROM notes ORDER BY id")?;

    let rows = stmt.query_map([], |row| {
        // sfld is declared TEXT but the tool stores bare numbers for
        // numeric sort fields.
        let sort_field = match row.get_ref(6)? {
            ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
            ValueRef::Integer(value) => value.to_string(),
            ValueRef::Real(value) => value.to_string(),
            _ => String::new(),
        };

        Ok(SourceNote {
            id: row.get(0)?,
            guid: row.get(1)?,
            model_id: row.get(2)?,
            modified_ms: row.get::<_, i64>(3)? * 1000,
            raw_tags: row.get(4)?,
            raw_fields: row.get(5)?,
            sort_field,
        })
    })?;

    let mut notes = Vec::new();
    for row in rows {
        notes.push(row?);
    }
    Ok(notes)
}

/// Summary metadata lives in the same single-row table as the configuration
/// blobs, but a database that lost it is still importable: fall back to the
/// current time and a zero count.
fn read_metadata(conn: &Connection, note_count: usize) -> ArchiveMetadata {
    let summary = conn
        .query_row("SELECT crt, mod, ver FROM col", [], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })
        .optional();

    match summary {
        Ok(Some((created, modified, version))) => ArchiveMetadata {
            created_ms: created * 1000,
            modified_ms: modified * 1000,
            tool_version: version.to_string(),
            note_count,
        },
        Ok(None) | Err(_) => {
            eprintln!("Collection summary row is unreadable; synthesizing metadata");
            let now = chrono::Utc::now().timestamp_millis();
            ArchiveMetadata {
                created_ms: now,
                modified_ms: now,
                tool_version: "unknown".to_string(),
                note_count: 0,
            }
        }
    }
}
