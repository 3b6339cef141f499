use std::sync::OnceLock;

use regex::{
    Captures,
    Regex,
};

// The named entities the authoring tool's editor actually emits. `&amp;` is
// decoded last so an escaped entity like `&amp;lt;` comes out as the literal
// text `&lt;` instead of being decoded twice.
const NAMED: [(&str, &str); 22] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&ldquo;", "\u{201c}"),
    ("&rdquo;", "\u{201d}"),
    ("&lsquo;", "\u{2018}"),
    ("&rsquo;", "\u{2019}"),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&hellip;", "\u{2026}"),
    ("&middot;", "\u{b7}"),
    ("&bull;", "\u{2022}"),
    ("&laquo;", "\u{ab}"),
    ("&raquo;", "\u{bb}"),
    ("&copy;", "\u{a9}"),
    ("&reg;", "\u{ae}"),
    ("&trade;", "\u{2122}"),
    ("&times;", "\u{d7}"),
    ("&divide;", "\u{f7}"),
    ("&amp;", "&"),
];

/// Decodes the fixed entity table plus decimal and hex numeric references.
pub fn decode(text: &str) -> String {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    static HEX: OnceLock<Regex> = OnceLock::new();

    let decimal = DECIMAL.get_or_init(|| Regex::new(r"&#(\d{1,7});").unwrap());
    let hex = HEX.get_or_init(|| Regex::new(r"&#[xX]([0-9a-fA-F]{1,6});").unwrap());

    let mut decoded = decimal
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned();

    decoded = hex
        .replace_all(&decoded, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned();

    for (entity, replacement) in NAMED {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }

    decoded
}
