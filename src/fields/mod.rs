use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::OnceLock,
};

use regex::Regex;

use crate::core::models::{
    FieldSide,
    FieldSideMap,
    SourceModel,
};

// Semantic name matching. Field names are far more consistent across models
// than template authoring style, so a keyword hit outranks template analysis.
const FRONT_KEYWORDS: [&str; 7] =
    ["front", "question", "prompt", "expression", "表", "問題", "質問"];
const BACK_KEYWORDS: [&str; 8] =
    ["back", "answer", "explanation", "meaning", "裏", "答え", "解答", "意味"];

// Template tokens that never name a field.
const BUILTIN_TOKENS: [&str; 6] = ["frontside", "tags", "type", "deck", "subdeck", "card"];

#[derive(Debug)]
pub struct SideResolution {
    pub map: FieldSideMap,
    pub warnings: Vec<String>,
}

/// Decides, per model, which side each named field is displayed on. Total:
/// every declared field gets a side, `Both` when neither heuristic applies.
pub fn resolve_sides(models: &[SourceModel]) -> SideResolution {
    let mut map = FieldSideMap::new();
    let mut warnings = Vec::new();

    for model in models {
        let mut sides: HashMap<String, FieldSide> = HashMap::new();

        let question_fields: HashSet<String> = model
            .templates
            .iter()
            .flat_map(|t| referenced_fields(&t.question))
            .collect();
        let answer_fields: HashSet<String> = model
            .templates
            .iter()
            .flat_map(|t| referenced_fields(&t.answer))
            .collect();

        for name in &model.field_names {
            let side = match semantic_side(name) {
                Some(side) => side,
                None => {
                    match (question_fields.contains(name), answer_fields.contains(name)) {
                        (true, false) => FieldSide::Front,
                        (false, true) => FieldSide::Back,
                        (true, true) => FieldSide::Both,
                        (false, false) => {
                            // Never rendered by any template; kept rather than
                            // dropped, but the assignment is a guess.
                            warnings.push(format!(
                                "field \"{}\" on model \"{}\" appears in no display template, defaulting to both sides",
                                name, model.name
                            ));
                            FieldSide::Both
                        }
                    }
                }
            };
            sides.insert(name.clone(), side);
        }

        map.insert(model.id, sides);
    }

    SideResolution { map, warnings }
}

fn semantic_side(name: &str) -> Option<FieldSide> {
    let lowered = name.to_lowercase();
    if FRONT_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return Some(FieldSide::Front);
    }
    if BACK_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return Some(FieldSide::Back);
    }
    None
}

/// Extracts the field names a display template references. Modifier prefixes
/// (`cloze:`, `hint:`, chained filters) are stripped; conditional section
/// markers and built-in tokens are not field references.
fn referenced_fields(template: &str) -> HashSet<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

    let mut fields = HashSet::new();
    for captures in re.captures_iter(template) {
        let token = captures[1].trim();
        if token.starts_with('#') || token.starts_with('^') || token.starts_with('/') {
            continue;
        }
        let name = token.rsplit(':').next().unwrap_or(token).trim();
        if name.is_empty() || BUILTIN_TOKENS.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        fields.insert(name.to_string());
    }
    fields
}
