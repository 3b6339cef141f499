use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

/// Id of the tool's built-in default deck. Never emitted as an importable deck.
pub const DEFAULT_DECK_ID: i64 = 1;

/// Unit separator joining field values inside a note's raw field blob.
pub const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Standard,
    Cloze,
}

#[derive(Debug, Clone)]
pub struct CardTemplate {
    pub question: String,
    pub answer: String,
}

/// Field/template schema shared by many notes. Immutable once read from the archive.
#[derive(Debug, Clone)]
pub struct SourceModel {
    pub id: i64,
    pub name: String,
    pub kind: ModelKind,
    pub field_names: Vec<String>, // Ordered as authored
    pub templates: Vec<CardTemplate>,
    pub style_sheet: String,
    pub deck_id: Option<i64>, // Default-deck hint; note rows carry no deck of their own
}

#[derive(Debug, Clone)]
pub struct SourceDeck {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// One raw multi-field record from the embedded database.
#[derive(Debug, Clone)]
pub struct SourceNote {
    pub id: i64,
    pub model_id: i64,
    pub raw_fields: String, // Values joined by FIELD_SEPARATOR
    pub raw_tags: String,   // Space separated
    pub modified_ms: i64,
    pub guid: String,
    pub sort_field: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveMetadata {
    pub created_ms: i64,
    pub modified_ms: i64,
    pub tool_version: String,
    pub note_count: usize,
}

/// Which side of a card a named field is displayed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSide {
    Front,
    Back,
    Both,
}

/// model id -> (field name -> side). Every declared field has exactly one entry.
pub type FieldSideMap = HashMap<i64, HashMap<String, FieldSide>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_name(name: &str) -> MediaKind {
        let extension = name.rsplit('.').next().unwrap_or("").to_lowercase();
        match extension.as_str() {
            "mp3" | "ogg" | "oga" | "opus" | "wav" | "m4a" | "aac" | "flac" | "spx" => {
                MediaKind::Audio
            }
            "mp4" | "webm" | "mkv" | "mov" | "avi" | "mpg" | "mpeg" => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<String>,
}

/// Untranscoded provenance kept on every card so the transformation stays auditable.
#[derive(Debug, Clone, Serialize)]
pub struct CardOrigin {
    pub note_id: i64,
    pub model_id: i64,
    pub model_name: String,
    pub original_fields: Vec<(String, String)>,
    pub guid: String,
}

/// One imported flashcard, ready for the card store. Never mutated after assembly;
/// the store owns assigning its own id and scheduling state.
#[derive(Debug, Clone, Serialize)]
pub struct Card {
    pub id: i64,
    pub deck_id: i64,
    pub sides: CardSides,
    pub raw_content: String,
    pub tags: Vec<String>,
    pub origin: CardOrigin,
}
