pub mod entities;

use std::sync::OnceLock;

use regex::{
    Captures,
    Regex,
};

use crate::{
    core::models::MediaKind,
    media::MediaManifest,
};

/// A media file lifted out of a field during conversion. The placeholder is
/// swapped for an embed link once the manifest knows where the file landed.
#[derive(Debug, Clone)]
pub struct MediaReference {
    pub original_name: String,
    pub placeholder: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct Transcoded {
    pub markup: String,
    pub media_refs: Vec<MediaReference>,
}

// Private-use sentinel bracketing placeholder tokens so no later pass can
// touch them.
const PLACEHOLDER_MARK: char = '\u{f8ff}';

fn placeholder_token(index: usize) -> String {
    format!("{}media:{}{}", PLACEHOLDER_MARK, index, PLACEHOLDER_MARK)
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

/// Converts one field's raw HTML into Markdown. Never fails: unrecognized
/// markup degrades to being stripped. Pass order is part of the contract:
/// media extraction first, cloze before generic inline formatting, tables
/// before the final cleanup. Already-clean Markdown passes through
/// byte-identical.
pub fn convert_field(html: &str) -> Transcoded {
    let mut media_refs = Vec::new();

    let text = extract_media(html, &mut media_refs);
    let text = convert_cloze(&text);
    let text = convert_inline(&text);
    let text = convert_blockquotes(&text);
    let text = convert_lists(&text);
    let text = convert_tables(&text);
    let text = convert_headings(&text);
    let markup = cleanup(&text);

    Transcoded { markup, media_refs }
}

/// Swaps each placeholder for an embed link to the manifest's saved path.
/// A reference the manifest cannot resolve is dropped with a warning rather
/// than leaving a dangling token in user-facing output.
pub fn replace_media_placeholders(
    markup: &str,
    media_refs: &[MediaReference],
    manifest: &MediaManifest,
) -> (String, Vec<String>) {
    let mut resolved = markup.to_string();
    let mut warnings = Vec::new();

    for media_ref in media_refs {
        match manifest.find(&media_ref.original_name) {
            Some(entry) => {
                let embed = format!("![[{}]]", entry.saved_path);
                resolved = resolved.replace(&media_ref.placeholder, &embed);
            }
            None => {
                warnings.push(format!(
                    "media file \"{}\" was referenced but never persisted; dropping the reference",
                    media_ref.original_name
                ));
                resolved = resolved.replace(&media_ref.placeholder, "");
            }
        }
    }

    (resolved, warnings)
}

/// Pass 1: image tags, bracketed sound markers, and video elements become
/// placeholder tokens. The counter is scoped to this call so conversions
/// stay reentrant.
fn extract_media(html: &str, media_refs: &mut Vec<MediaReference>) -> String {
    static IMG: OnceLock<Regex> = OnceLock::new();
    static SOUND: OnceLock<Regex> = OnceLock::new();
    static VIDEO: OnceLock<Regex> = OnceLock::new();
    static SRC: OnceLock<Regex> = OnceLock::new();

    let img = cached(&IMG, r#"(?is)<img[^>]*?src\s*=\s*["']?([^"'\s>]+)["']?[^>]*>"#);
    let sound = cached(&SOUND, r"\[sound:([^\]]+)\]");
    let video = cached(&VIDEO, r"(?is)<video\b[^>]*>.*?</video\s*>|<video\b[^>]*/?>");
    let src = cached(&SRC, r#"(?is)src\s*=\s*["']?([^"'\s>]+)["']?"#);

    let mut counter = 0usize;
    let mut take = |name: &str, kind: MediaKind| -> String {
        let token = placeholder_token(counter);
        counter += 1;
        media_refs.push(MediaReference {
            original_name: name.to_string(),
            placeholder: token.clone(),
            kind,
        });
        token
    };

    let text = img.replace_all(html, |caps: &Captures| take(&caps[1], MediaKind::Image));
    let text = sound.replace_all(&text, |caps: &Captures| take(&caps[1], MediaKind::Audio));
    let text = video.replace_all(&text, |caps: &Captures| {
        match src.captures(&caps[0]).map(|c| c[1].to_string()) {
            Some(name) => take(&name, MediaKind::Video),
            None => String::new(), // Video element without a source, drop it
        }
    });

    text.into_owned()
}

/// Pass 2: `{{cN::text}}` and `{{cN::text::hint}}` become `==text==`; the
/// hint is dropped.
fn convert_cloze(text: &str) -> String {
    static CLOZE: OnceLock<Regex> = OnceLock::new();
    let re = cached(&CLOZE, r"(?s)\{\{c\d+::(.*?)(?:::.*?)?\}\}");
    re.replace_all(text, "==$1==").into_owned()
}

/// Pass 3: inline formatting. Code blocks go before inline code, bold-like
/// tags before italic so nested `<b><i>..</i></b>` comes out `***..***`.
fn convert_inline(text: &str) -> String {
    static PRE_CODE: OnceLock<Regex> = OnceLock::new();
    static PRE: OnceLock<Regex> = OnceLock::new();
    static CODE: OnceLock<Regex> = OnceLock::new();
    static BOLD: OnceLock<Regex> = OnceLock::new();
    static UNDERLINE: OnceLock<Regex> = OnceLock::new();
    static ITALIC: OnceLock<Regex> = OnceLock::new();
    static STRIKE: OnceLock<Regex> = OnceLock::new();
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static RULE: OnceLock<Regex> = OnceLock::new();
    static BLOCK_OPEN: OnceLock<Regex> = OnceLock::new();
    static BLOCK_CLOSE: OnceLock<Regex> = OnceLock::new();
    static UNWRAP: OnceLock<Regex> = OnceLock::new();

    let mut out = cached(&PRE_CODE, r"(?is)<pre[^>]*>\s*<code[^>]*>(.*?)</code>\s*</pre\s*>")
        .replace_all(text, "\n```\n$1\n```\n")
        .into_owned();
    out = cached(&PRE, r"(?is)<pre[^>]*>(.*?)</pre\s*>")
        .replace_all(&out, "\n```\n$1\n```\n")
        .into_owned();
    out = cached(&CODE, r"(?is)<code[^>]*>(.*?)</code\s*>")
        .replace_all(&out, "`$1`")
        .into_owned();

    out = cached(&BOLD, r"(?is)<(?:b|strong)\b[^>]*>(.*?)</(?:b|strong)\s*>")
        .replace_all(&out, "**$1**")
        .into_owned();
    // Underline has no Markdown equivalent; bold is the closest emphasis.
    out = cached(&UNDERLINE, r"(?is)<u\b[^>]*>(.*?)</u\s*>")
        .replace_all(&out, "**$1**")
        .into_owned();
    out = cached(&ITALIC, r"(?is)<(?:i|em)\b[^>]*>(.*?)</(?:i|em)\s*>")
        .replace_all(&out, "*$1*")
        .into_owned();
    out = cached(&STRIKE, r"(?is)<(?:s|del|strike)\b[^>]*>(.*?)</(?:s|del|strike)\s*>")
        .replace_all(&out, "~~$1~~")
        .into_owned();

    out = cached(
        &ANCHOR,
        r#"(?is)<a\b[^>]*?href\s*=\s*["']?([^"'\s>]+)["']?[^>]*>(.*?)</a\s*>"#,
    )
    .replace_all(&out, |caps: &Captures| {
        // Brackets inside the link text would nest into the link syntax.
        let label = caps[2].replace(['[', ']'], "");
        format!("[{}]({})", label.trim(), &caps[1])
    })
    .into_owned();

    out = cached(&BREAK, r"(?i)<br\s*/?\s*>").replace_all(&out, "\n").into_owned();
    out = cached(&RULE, r"(?i)<hr[^>]*>").replace_all(&out, "\n\n---\n\n").into_owned();
    out = cached(&BLOCK_CLOSE, r"(?i)</(?:p|div)\s*>").replace_all(&out, "\n").into_owned();
    out = cached(&BLOCK_OPEN, r"(?i)<(?:p|div)\b[^>]*>").replace_all(&out, "").into_owned();
    out = cached(&UNWRAP, r"(?i)</?(?:span|font|sup|sub|mark|center)\b[^>]*>")
        .replace_all(&out, "")
        .into_owned();

    out
}

/// Pass 4: every line inside a blockquote gets the quote marker.
fn convert_blockquotes(text: &str) -> String {
    static QUOTE: OnceLock<Regex> = OnceLock::new();
    let re = cached(&QUOTE, r"(?is)<blockquote[^>]*>(.*?)</blockquote\s*>");

    re.replace_all(text, |caps: &Captures| {
        let quoted: Vec<String> =
            caps[1].trim().lines().map(|line| format!("> {}", line.trim())).collect();
        format!("\n{}\n", quoted.join("\n"))
    })
    .into_owned()
}

/// Pass 5: unordered lists become dash items; ordered lists are renumbered
/// sequentially from 1 no matter how the source counted.
fn convert_lists(text: &str) -> String {
    static UNORDERED: OnceLock<Regex> = OnceLock::new();
    static ORDERED: OnceLock<Regex> = OnceLock::new();
    static ITEM: OnceLock<Regex> = OnceLock::new();

    let item = cached(&ITEM, r"(?is)<li[^>]*>(.*?)</li\s*>");

    let out = cached(&UNORDERED, r"(?is)<ul[^>]*>(.*?)</ul\s*>")
        .replace_all(text, |caps: &Captures| {
            let items: Vec<String> = item
                .captures_iter(&caps[1])
                .map(|c| format!("- {}", c[1].trim()))
                .collect();
            format!("\n{}\n", items.join("\n"))
        })
        .into_owned();

    cached(&ORDERED, r"(?is)<ol[^>]*>(.*?)</ol\s*>")
        .replace_all(&out, |caps: &Captures| {
            let items: Vec<String> = item
                .captures_iter(&caps[1])
                .enumerate()
                .map(|(index, c)| format!("{}. {}", index + 1, c[1].trim()))
                .collect();
            format!("\n{}\n", items.join("\n"))
        })
        .into_owned()
}

/// Pass 6: simple tables become pipe rows with a header separator. A table
/// containing another table is left as raw markup.
fn convert_tables(text: &str) -> String {
    static TABLE: OnceLock<Regex> = OnceLock::new();
    static ROW: OnceLock<Regex> = OnceLock::new();
    static CELL: OnceLock<Regex> = OnceLock::new();

    let row = cached(&ROW, r"(?is)<tr[^>]*>(.*?)</tr\s*>");
    let cell = cached(&CELL, r"(?is)<t[hd][^>]*>(.*?)</t[hd]\s*>");

    cached(&TABLE, r"(?is)<table[^>]*>(.*?)</table\s*>")
        .replace_all(text, |caps: &Captures| {
            let inner = &caps[1];
            if inner.to_lowercase().contains("<table") {
                return caps[0].to_string();
            }

            let mut lines = Vec::new();
            for (index, row_caps) in row.captures_iter(inner).enumerate() {
                let cells: Vec<String> = cell
                    .captures_iter(&row_caps[1])
                    .map(|c| c[1].trim().replace('\n', " "))
                    .collect();
                if cells.is_empty() {
                    continue;
                }
                lines.push(format!("| {} |", cells.join(" | ")));
                if index == 0 {
                    lines.push(format!("| {} |", vec!["---"; cells.len()].join(" | ")));
                }
            }

            if lines.is_empty() {
                String::new()
            } else {
                format!("\n{}\n", lines.join("\n"))
            }
        })
        .into_owned()
}

/// Pass 7: headings, most specific level first so `<h1>` conversion never
/// fires inside a still-unconverted deeper heading.
fn convert_headings(text: &str) -> String {
    static HEADINGS: OnceLock<Vec<(Regex, String)>> = OnceLock::new();

    let headings = HEADINGS.get_or_init(|| {
        (1..=6)
            .rev()
            .map(|level| {
                let re = Regex::new(&format!(r"(?is)<h{0}[^>]*>(.*?)</h{0}\s*>", level)).unwrap();
                (re, format!("\n{} ${{1}}\n", "#".repeat(level)))
            })
            .collect()
    });

    let mut out = text.to_string();
    for (re, replacement) in headings {
        out = re.replace_all(&out, replacement.as_str()).into_owned();
    }
    out
}

/// Pass 8: comments, entities, leftover tags, and whitespace. Raw tables
/// preserved by pass 6 keep their tags.
fn cleanup(text: &str) -> String {
    static COMMENT: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static BLANKS: OnceLock<Regex> = OnceLock::new();

    let mut out = cached(&COMMENT, r"(?s)<!--.*?-->").replace_all(text, "").into_owned();

    out = entities::decode(&out);

    out = cached(&TAG, r"(?is)</?([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>")
        .replace_all(&out, |caps: &Captures| {
            match caps[1].to_lowercase().as_str() {
                "table" | "thead" | "tbody" | "tfoot" | "tr" | "td" | "th" => caps[0].to_string(),
                _ => String::new(),
            }
        })
        .into_owned();

    out = cached(&BLANKS, r"\n{4,}").replace_all(&out, "\n\n\n").into_owned();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ManifestEntry;

    fn convert(html: &str) -> String {
        convert_field(html).markup
    }

    #[test]
    fn cloze_markers_become_highlights() {
        let result = convert("The capital of France is {{c1::Paris}}.");
        assert_eq!(result, "The capital of France is ==Paris==.");
        assert!(!result.contains("{{c1::"));
        assert!(!result.contains("}}"));
    }

    #[test]
    fn cloze_hints_are_dropped() {
        assert_eq!(
            convert("{{c2::mitochondria::powerhouse}} of the cell"),
            "==mitochondria== of the cell"
        );
    }

    #[test]
    fn clean_markup_is_left_byte_identical() {
        let clean = "**Front**: what is ==this==?\n\n- a\n- b\n\n| x | y |\n| --- | --- |\n| 1 | 2 |";
        let first = convert(clean);
        assert_eq!(first, clean);
        assert_eq!(convert(&first), first);
    }

    #[test]
    fn inline_formatting_converts() {
        assert_eq!(convert("<b>bold</b> <i>italic</i> <u>under</u>"), "**bold** *italic* **under**");
        assert_eq!(convert("<strong>x</strong><em>y</em>"), "**x***y*");
        assert_eq!(convert("a<br>b<br/>c"), "a\nb\nc");
        assert_eq!(convert("<s>gone</s> <code>let x</code>"), "~~gone~~ `let x`");
        assert_eq!(convert("<b><i>both</i></b>"), "***both***");
    }

    #[test]
    fn links_lose_nested_brackets() {
        assert_eq!(
            convert(r#"<a href="https://example.com/a">see [note] here</a>"#),
            "[see note here](https://example.com/a)"
        );
    }

    #[test]
    fn media_is_extracted_into_placeholders() {
        let result = convert_field(r#"<img src="cat.jpg"> and [sound:meow.mp3]"#);
        assert_eq!(result.media_refs.len(), 2);
        assert_eq!(result.media_refs[0].original_name, "cat.jpg");
        assert_eq!(result.media_refs[0].kind, MediaKind::Image);
        assert_eq!(result.media_refs[1].original_name, "meow.mp3");
        assert_eq!(result.media_refs[1].kind, MediaKind::Audio);
        // Placeholders are distinct and survive the remaining passes
        assert_ne!(result.media_refs[0].placeholder, result.media_refs[1].placeholder);
        assert!(result.markup.contains(&result.media_refs[0].placeholder));
        assert!(result.markup.contains(&result.media_refs[1].placeholder));
    }

    #[test]
    fn video_elements_use_their_source_name() {
        let result = convert_field(r#"<video controls><source src="clip.mp4"></video>"#);
        assert_eq!(result.media_refs.len(), 1);
        assert_eq!(result.media_refs[0].original_name, "clip.mp4");
        assert_eq!(result.media_refs[0].kind, MediaKind::Video);
    }

    #[test]
    fn placeholders_resolve_against_the_manifest() {
        let result = convert_field(r#"<img src="cat.jpg">"#);
        let manifest = MediaManifest {
            base_path: "decks/Test".to_string(),
            entries: vec![ManifestEntry {
                id: "1".to_string(),
                original_name: "cat.jpg".to_string(),
                saved_path: "decks/Test/cat.jpg".to_string(),
                kind: MediaKind::Image,
                size_bytes: 3,
                content_hash: "abc".to_string(),
            }],
        };
        let (resolved, warnings) =
            replace_media_placeholders(&result.markup, &result.media_refs, &manifest);
        assert_eq!(resolved, "![[decks/Test/cat.jpg]]");
        assert!(warnings.is_empty());
    }

    #[test]
    fn unresolvable_placeholders_are_dropped_with_a_warning() {
        let result = convert_field(r#"before <img src="gone.png"> after"#);
        let manifest = MediaManifest { base_path: String::new(), entries: Vec::new() };
        let (resolved, warnings) =
            replace_media_placeholders(&result.markup, &result.media_refs, &manifest);
        assert_eq!(resolved, "before  after");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("gone.png"));
    }

    #[test]
    fn blockquotes_prefix_every_line() {
        assert_eq!(
            convert("<blockquote>first<br>second</blockquote>"),
            "> first\n> second"
        );
    }

    #[test]
    fn ordered_lists_renumber_from_one() {
        assert_eq!(
            convert(r#"<ol start="7"><li>alpha</li><li>beta</li></ol>"#),
            "1. alpha\n2. beta"
        );
        assert_eq!(convert("<ul><li>one</li><li>two</li></ul>"), "- one\n- two");
    }

    #[test]
    fn simple_tables_become_pipe_rows() {
        let html = "<table><tr><th>City</th><th>Country</th></tr><tr><td>Paris</td><td>France</td></tr></table>";
        assert_eq!(
            convert(html),
            "| City | Country |\n| --- | --- |\n| Paris | France |"
        );
    }

    #[test]
    fn nested_tables_are_left_as_raw_markup() {
        let html = "<table><tr><td><table><tr><td>inner</td></tr></table></td></tr></table>";
        let result = convert(html);
        assert!(result.contains("<table>"));
        assert!(result.contains("inner"));
    }

    #[test]
    fn headings_convert_most_specific_first() {
        assert_eq!(convert("<h1>Top</h1>"), "# Top");
        assert_eq!(convert("<h6>Deep</h6>"), "###### Deep");
        assert_eq!(convert("<h2>A</h2><h3>B</h3>"), "## A\n\n### B");
    }

    #[test]
    fn comments_and_unknown_tags_are_stripped() {
        assert_eq!(
            convert("<!-- hidden -->kept <blink>weird</blink>"),
            "kept weird"
        );
        assert_eq!(convert("<div class=\"x\"><span>text</span></div>"), "text");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(convert("fish &amp; chips&nbsp;&gt; salad"), "fish & chips > salad");
    }

    #[test]
    fn code_blocks_are_fenced() {
        assert_eq!(
            convert("<pre><code>let x = 1;</code></pre>"),
            "```\nlet x = 1;\n```"
        );
    }

    #[test]
    fn excess_blank_lines_collapse() {
        assert_eq!(convert("a<br><br><br><br><br>b"), "a\n\n\nb");
    }
}
