use std::sync::OnceLock;

use regex::Regex;

use crate::{
    core::{
        models::{
            Card,
            CardOrigin,
            CardSides,
            FieldSide,
            FieldSideMap,
            SourceModel,
            SourceNote,
            DEFAULT_DECK_ID,
            FIELD_SEPARATOR,
        },
        DecantError,
    },
    markup::{
        convert_field,
        replace_media_placeholders,
    },
    media::MediaManifest,
};

/// Separates question and answer inside a card's raw content: a lone `?` on
/// its own line, the target system's multiline card convention.
pub const CARD_DIVIDER: &str = "\n\n?\n\n";

/// Builds one output card from a note. Fails only when field splitting
/// leaves no usable content on either side.
pub fn build_card(
    note: &SourceNote,
    model: &SourceModel,
    side_map: &FieldSideMap,
    manifest: &MediaManifest,
) -> Result<(Card, Vec<String>), DecantError> {
    let mut warnings = Vec::new();

    let values: Vec<&str> = note.raw_fields.split(FIELD_SEPARATOR).collect();
    let sides = side_map.get(&model.id);

    let mut front_fields: Vec<(&str, &str)> = Vec::new();
    let mut back_fields: Vec<(&str, &str)> = Vec::new();
    let mut both_fields: Vec<(&str, &str)> = Vec::new();
    let mut original_fields = Vec::with_capacity(model.field_names.len());

    for (index, name) in model.field_names.iter().enumerate() {
        let value = values.get(index).copied().unwrap_or("");
        original_fields.push((name.clone(), value.to_string()));
        if value.trim().is_empty() {
            continue;
        }
        let side = sides.and_then(|m| m.get(name)).copied().unwrap_or(FieldSide::Both);
        match side {
            FieldSide::Front => front_fields.push((name.as_str(), value)),
            FieldSide::Back => back_fields.push((name.as_str(), value)),
            FieldSide::Both => both_fields.push((name.as_str(), value)),
        }
    }

    if front_fields.is_empty() && back_fields.is_empty() && both_fields.is_empty() {
        return Err(DecantError::EmptyNote(note.id));
    }

    // Both-side fields ride with the question side unless nothing else
    // fronts the card.
    if front_fields.is_empty() {
        back_fields.extend(both_fields);
    } else {
        front_fields.extend(both_fields);
    }

    let front_content = render_bucket(&front_fields, manifest, &mut warnings);
    let back_content = render_bucket(&back_fields, manifest, &mut warnings);

    // A divider with nothing on one side is a defect, never emitted.
    let back_only = front_content.is_empty() && !back_content.is_empty();
    let raw_content = match (front_content.is_empty(), back_content.is_empty()) {
        (false, false) => format!("{}{}{}", front_content, CARD_DIVIDER, back_content),
        (false, true) => front_content,
        (true, false) => back_content,
        (true, true) => return Err(DecantError::EmptyNote(note.id)),
    };

    let card = Card {
        id: note.id,
        deck_id: model.deck_id.unwrap_or(DEFAULT_DECK_ID),
        sides: split_sides(&raw_content, back_only),
        raw_content,
        tags: note.raw_tags.split_whitespace().map(String::from).collect(),
        origin: CardOrigin {
            note_id: note.id,
            model_id: model.id,
            model_name: model.name.clone(),
            original_fields,
            guid: note.guid.clone(),
        },
    };

    Ok((card, warnings))
}

fn render_bucket(
    fields: &[(&str, &str)],
    manifest: &MediaManifest,
    warnings: &mut Vec<String>,
) -> String {
    let mut parts = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let transcoded = convert_field(value);
        let (resolved, media_warnings) =
            replace_media_placeholders(&transcoded.markup, &transcoded.media_refs, manifest);
        warnings.extend(media_warnings);
        if resolved.trim().is_empty() {
            continue; // Markup that converted down to nothing
        }
        parts.push(format!("**{}**: {}", name, resolved));
    }
    parts.join("\n\n")
}

/// Re-extracts the two structured sides from the assembled content by
/// locating the divider. Tolerates a divider anywhere, including position
/// zero.
fn split_sides(raw_content: &str, back_only: bool) -> CardSides {
    let (front_raw, back_raw) = if let Some(position) = raw_content.find(CARD_DIVIDER) {
        (&raw_content[..position], &raw_content[position + CARD_DIVIDER.len()..])
    } else if let Some(rest) = raw_content.strip_prefix("?\n\n") {
        ("", rest)
    } else if back_only {
        ("", raw_content)
    } else {
        (raw_content, "")
    };

    CardSides { front: clean_side(front_raw), back: clean_side(back_raw) }
}

fn clean_side(text: &str) -> Option<String> {
    let stripped = strip_field_prefixes(text.trim());
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Strips the `**Name**: ` label convention from each rendered field,
/// including the older `**Name:**` and `__Name__:` forms.
fn strip_field_prefixes(text: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| {
        Regex::new(r"(?m)^(?:\*\*[^*\n]+\*\*\s*:|\*\*[^*\n]+:\*\*|__[^_\n]+__\s*:)\s*").unwrap()
    });
    re.replace_all(text, "").trim().to_string()
}
