//! WikiText to plaintext converter
//!
//! Produces the readable prose of a revision. Content features (character
//! and word counts) are measured on this text rather than on raw markup.

use regex::Regex;
use std::sync::OnceLock;

static RE_NOWIKI: OnceLock<Regex> = OnceLock::new();
static RE_NAMESPACED_LINK: OnceLock<Regex> = OnceLock::new();
static RE_EXTERNAL_LINK: OnceLock<Regex> = OnceLock::new();
static RE_EXTERNAL_BARE: OnceLock<Regex> = OnceLock::new();
static RE_HEADING: OnceLock<Regex> = OnceLock::new();
static RE_LIST: OnceLock<Regex> = OnceLock::new();
static RE_MAGIC_WORDS: OnceLock<Regex> = OnceLock::new();
static RE_HTML_TAG: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

/// Link prefixes that never render as prose
const HIDDEN_LINK_PREFIXES: &[&str] = &[
    "file:",
    "image:",
    "category:",
    "media:",
    "arquivo:",
    "imagem:",
    "categoria:",
    "datei:",
    "kategorie:",
    "fichier:",
    "catégorie:",
    "archivo:",
    "categoría:",
];

/// WikiText parser that converts MediaWiki markup to plain text
///
/// References, tables and templates never count as prose and are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WikiTextParser;

impl WikiTextParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse WikiText and return clean plaintext
    pub fn parse(&self, wikitext: &str) -> String {
        let mut text = regex(&RE_NOWIKI, r"(?s)<(?:nowiki|pre)>(.*?)</(?:nowiki|pre)>")
            .replace_all(wikitext, "$1")
            .into_owned();

        text = remove_comments(&text);

        text = remove_references(&text);
        text = remove_nested(&text, ('{', '|'), ('|', '}'));
        text = remove_nested(&text, ('{', '{'), ('}', '}'));

        text = regex(&RE_NAMESPACED_LINK, r"\[\[[^\[\]|]*:[^\[\]]*\]\]")
            .replace_all(&text, |caps: &regex::Captures| {
                let link = &caps[0][2..caps[0].len() - 2];
                if is_hidden_link(link) {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();

        text = process_internal_links(&text);
        text = process_external_links(&text);
        text = process_formatting(&text);
        text = regex(&RE_MAGIC_WORDS, r"__[A-Z]+__")
            .replace_all(&text, "")
            .into_owned();
        text = regex(&RE_HTML_TAG, r"</?[a-zA-Z][^>]*>")
            .replace_all(&text, "")
            .into_owned();

        clean_whitespace(&text)
    }
}

pub(crate) fn is_hidden_link(link: &str) -> bool {
    let lower = link.trim_start_matches(':').to_lowercase();
    if HIDDEN_LINK_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }

    // Interwiki links (2-3 letter language code followed by colon)
    match lower.find(':') {
        Some(pos) => {
            let prefix = &lower[..pos];
            (2..=3).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_lowercase())
        }
        None => false,
    }
}

/// Remove HTML/XML comments
fn remove_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<!--") {
        result.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            None => return result,
        }
    }

    result.push_str(rest);
    result
}

/// Remove `<ref>...</ref>` and `<ref .../>` tags
fn remove_references(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let lower = text.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(offset) = lower[pos..].find("<ref") {
        let start = pos + offset;
        result.push_str(&text[pos..start]);

        let Some(tag_end) = lower[start..].find('>').map(|i| start + i) else {
            // Malformed tag, keep the rest
            result.push_str(&text[start..]);
            return result;
        };

        if lower[..tag_end].ends_with('/') {
            pos = tag_end + 1;
            continue;
        }

        pos = match lower[tag_end..].find("</ref") {
            Some(close) => {
                let close = tag_end + close;
                lower[close..]
                    .find('>')
                    .map(|i| close + i + 1)
                    .unwrap_or(text.len())
            }
            None => tag_end + 1,
        };
    }

    result.push_str(&text[pos..]);
    result
}

/// Remove balanced two-character delimited blocks such as `{{ }}` or `{| |}`
fn remove_nested(text: &str, open: (char, char), close: (char, char)) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == open.0 && chars.peek() == Some(&open.1) {
            depth += 1;
            chars.next();
        } else if depth > 0 && c == close.0 && chars.peek() == Some(&close.1) {
            depth -= 1;
            chars.next();
        } else if depth == 0 {
            result.push(c);
        }
    }

    result
}

/// `[[target]]` -> target, `[[target|label]]` -> label
fn process_internal_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("]]") {
            Some(end) => {
                let link = &after[..end];
                let display = link.rsplit('|').next().unwrap_or(link);
                result.push_str(display);
                rest = &after[end + 2..];
            }
            None => {
                result.push_str(after);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// `[url text]` -> text, `[url]` -> url
fn process_external_links(text: &str) -> String {
    let labelled = regex(&RE_EXTERNAL_LINK, r"\[(?:https?:)?//[^\s\]]+\s+([^\]]+)\]");
    let result = labelled.replace_all(text, "$1");
    regex(&RE_EXTERNAL_BARE, r"\[((?:https?:)?//[^\s\]]+)\]")
        .replace_all(&result, "$1")
        .into_owned()
}

fn process_formatting(text: &str) -> String {
    let result = text.replace("'''", "").replace("''", "").replace("----", "");
    let result = regex(&RE_HEADING, r"(?m)^=+\s*(.*?)\s*=+\s*$").replace_all(&result, "$1");
    regex(&RE_LIST, r"(?m)^[*#:;]+\s*")
        .replace_all(&result, "")
        .into_owned()
}

/// Collapse runs of whitespace, keeping single line breaks
fn clean_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_newline = false;
    let mut prev_space = false;

    for c in text.chars() {
        if c == '\n' {
            if !prev_newline {
                if prev_space {
                    result.pop();
                }
                result.push('\n');
                prev_newline = true;
            }
            prev_space = false;
        } else if c.is_whitespace() {
            if !prev_space && !prev_newline {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(c);
            prev_newline = false;
            prev_space = false;
        }
    }

    result.trim().to_string()
}
