//! Revision text features
//!
//! A [`Feature`] is a base measurement of a revision's wikitext plus an
//! optional transform. [`FeatureSolver`] computes the values a model asks for
//! while resolving shared intermediate datasources (plaintext, template names)
//! at most once per revision.

use super::wikitext::{is_hidden_link, WikiTextParser};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

static RE_WIKILINK: OnceLock<Regex> = OnceLock::new();
static RE_EXTERNAL_LINK: OnceLock<Regex> = OnceLock::new();
static RE_REF_TAG: OnceLock<Regex> = OnceLock::new();
static RE_IMAGE: OnceLock<Regex> = OnceLock::new();
static RE_CATEGORY: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

/// Errors raised while computing feature values
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("Feature {feature} produced a non-finite value")]
    NonFinite { feature: String },
}

/// Base measurement of a revision's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Characters of raw wikitext
    Chars,
    /// Characters of readable prose
    ContentChars,
    /// Words of readable prose
    Words,
    #[serde(rename = "headings_level_2")]
    HeadingsLevel2,
    #[serde(rename = "headings_level_3")]
    HeadingsLevel3,
    /// Article links, excluding files, categories and interwikis
    Wikilinks,
    ExternalLinks,
    RefTags,
    /// Template transclusions (nested ones included)
    Templates,
    CiteTemplates,
    InfoboxTemplates,
    Images,
    Categories,
    Paragraphs,
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chars => "chars",
            Self::ContentChars => "content_chars",
            Self::Words => "words",
            Self::HeadingsLevel2 => "headings_level_2",
            Self::HeadingsLevel3 => "headings_level_3",
            Self::Wikilinks => "wikilinks",
            Self::ExternalLinks => "external_links",
            Self::RefTags => "ref_tags",
            Self::Templates => "templates",
            Self::CiteTemplates => "cite_templates",
            Self::InfoboxTemplates => "infobox_templates",
            Self::Images => "images",
            Self::Categories => "categories",
            Self::Paragraphs => "paragraphs",
        }
    }
}

/// Transform applied to a measurement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    /// `ln(1 + x)`
    Log1p,
}

/// A feature a model consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub measure: Measure,
    #[serde(default)]
    pub transform: Transform,
}

impl Feature {
    pub fn new(measure: Measure) -> Self {
        Self {
            measure,
            transform: Transform::Identity,
        }
    }

    pub fn log1p(measure: Measure) -> Self {
        Self {
            measure,
            transform: Transform::Log1p,
        }
    }

    /// Name used as the key in feature output
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transform {
            Transform::Identity => write!(f, "wikitext.{}", self.measure.as_str()),
            Transform::Log1p => write!(f, "log(wikitext.{} + 1)", self.measure.as_str()),
        }
    }
}

/// Computes feature values for one revision text
pub struct FeatureSolver<'t> {
    text: &'t str,
    parser: WikiTextParser,
    content: OnceCell<String>,
    template_names: OnceCell<Vec<String>>,
}

impl<'t> FeatureSolver<'t> {
    pub fn new(text: &'t str) -> Self {
        Self {
            text,
            parser: WikiTextParser::new(),
            content: OnceCell::new(),
            template_names: OnceCell::new(),
        }
    }

    /// Values for `features`, in order
    pub fn solve(&self, features: &[Feature]) -> Result<Vec<f64>, FeatureError> {
        features.iter().map(|f| self.value(f)).collect()
    }

    pub fn value(&self, feature: &Feature) -> Result<f64, FeatureError> {
        let raw = self.measure(feature.measure);
        let value = match feature.transform {
            Transform::Identity => raw,
            Transform::Log1p => raw.ln_1p(),
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(FeatureError::NonFinite {
                feature: feature.name(),
            })
        }
    }

    fn measure(&self, measure: Measure) -> f64 {
        let count = match measure {
            Measure::Chars => self.text.chars().count(),
            Measure::ContentChars => self.content().chars().count(),
            Measure::Words => self
                .content()
                .split_whitespace()
                .filter(|w| w.chars().any(char::is_alphanumeric))
                .count(),
            Measure::HeadingsLevel2 => self.headings(2),
            Measure::HeadingsLevel3 => self.headings(3),
            Measure::Wikilinks => regex(&RE_WIKILINK, r"\[\[([^\[\]|]+)")
                .captures_iter(self.text)
                .filter(|c| !is_hidden_link(&c[1]))
                .count(),
            Measure::ExternalLinks => regex(&RE_EXTERNAL_LINK, r"\[(?:https?:)?//[^\s\]]+")
                .find_iter(self.text)
                .count(),
            Measure::RefTags => regex(&RE_REF_TAG, r"(?i)<ref[\s>/]")
                .find_iter(self.text)
                .count(),
            Measure::Templates => self.template_names().len(),
            Measure::CiteTemplates => self
                .template_names()
                .iter()
                .filter(|n| n.starts_with("cite") || n.starts_with("citation") || n.starts_with("citar"))
                .count(),
            Measure::InfoboxTemplates => self
                .template_names()
                .iter()
                .filter(|n| n.starts_with("infobox") || n.starts_with("info/"))
                .count(),
            Measure::Images => regex(
                &RE_IMAGE,
                r"(?i)\[\[\s*(?:file|image|ficheiro|arquivo|imagem|datei|fichier)\s*:",
            )
            .find_iter(self.text)
            .count(),
            Measure::Categories => regex(&RE_CATEGORY, r"(?i)\[\[\s*(?:category|categoria|kategorie|catégorie)\s*:")
                .find_iter(self.text)
                .count(),
            Measure::Paragraphs => self
                .text
                .split("\n\n")
                .map(str::trim)
                .filter(|block| is_prose_block(block))
                .count(),
        };

        count as f64
    }

    fn content(&self) -> &str {
        self.content.get_or_init(|| self.parser.parse(self.text))
    }

    /// Lower-cased names of every `{{...}}` transclusion
    fn template_names(&self) -> &[String] {
        self.template_names.get_or_init(|| {
            let mut names = Vec::new();
            let mut rest = self.text;
            while let Some(start) = rest.find("{{") {
                rest = &rest[start + 2..];
                let end = rest
                    .find(['|', '}', '{', '\n'])
                    .unwrap_or(rest.len());
                let name = rest[..end].trim().replace('_', " ").to_lowercase();
                if !name.is_empty() {
                    names.push(name);
                }
            }
            names
        })
    }

    fn headings(&self, level: usize) -> usize {
        self.text
            .lines()
            .filter(|line| heading_level(line) == Some(level))
            .count()
    }
}

fn heading_level(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let leading = line.chars().take_while(|&c| c == '=').count();
    let trailing = line.chars().rev().take_while(|&c| c == '=').count();
    let level = leading.min(trailing);
    if level == 0 || line.len() <= level * 2 {
        return None;
    }
    Some(level)
}

fn is_prose_block(block: &str) -> bool {
    let lower = block.to_lowercase();
    match block.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '\'' || c == '"' => true,
        Some('[') => lower.starts_with("[[") && !is_hidden_link(lower.trim_start_matches('[')),
        _ => false,
    }
}
