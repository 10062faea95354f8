//! Tab-separated score output
//!
//! Rows follow the MySQL TSV convention: one header line, fields separated
//! by tabs, `\`, tab, newline and carriage return backslash-escaped, missing
//! values written as `NULL`.
//!
//! ```text
//! page_id  title  rev_id  timestamp       prediction  [probability]  weighted_sum  [features]
//! 12       Foo    3456    20160101000000  GA          {"B":0.1,...}  3.87          {"wikitext.chars":...}
//! ```

use crate::model::{ModelKind, Score};
use crate::types::{PageId, RevisionId, Timestamp};
use serde::Serialize;
use std::borrow::Cow;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Marker for a missing value
pub const NULL: &str = "NULL";

/// Errors writing or reading score files
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed row at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Column layout, fixed at startup from the model's capability and the
/// feature flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    probability: bool,
    features: bool,
}

impl OutputSchema {
    pub fn new(kind: ModelKind, features: bool) -> Self {
        Self {
            probability: kind.has_probability(),
            features,
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec!["page_id", "title", "rev_id", "timestamp", "prediction"];
        if self.probability {
            headers.push("probability");
        }
        headers.push("weighted_sum");
        if self.features {
            headers.push("features");
        }
        headers
    }
}

/// One scored row, borrowing from the scored revision
#[derive(Debug, Clone, Copy)]
pub struct OutputRow<'a> {
    pub page_id: PageId,
    pub title: &'a str,
    pub rev_id: RevisionId,
    /// As-of timestamp, not necessarily the revision's own
    pub timestamp: Timestamp,
    pub score: &'a Score,
    pub weighted_sum: f64,
}

/// Writes rows under a fixed schema, header first
pub struct TsvWriter<W: Write> {
    out: W,
    schema: OutputSchema,
    rows_written: usize,
}

impl<W: Write> TsvWriter<W> {
    /// Create a writer and emit the header line
    pub fn new(mut out: W, schema: OutputSchema) -> Result<Self, OutputError> {
        writeln!(out, "{}", schema.headers().join("\t"))?;
        Ok(Self {
            out,
            schema,
            rows_written: 0,
        })
    }

    pub fn schema(&self) -> OutputSchema {
        self.schema
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn write_row(&mut self, row: &OutputRow<'_>) -> Result<(), OutputError> {
        let mut fields: Vec<String> = Vec::with_capacity(8);
        fields.push(row.page_id.to_string());
        fields.push(escape(row.title).into_owned());
        fields.push(row.rev_id.to_string());
        fields.push(row.timestamp.short_format());
        fields.push(escape(&row.score.prediction).into_owned());
        if self.schema.probability {
            fields.push(json_field(row.score.probability.as_ref())?);
        }
        fields.push(format!("{:?}", row.weighted_sum));
        if self.schema.features {
            fields.push(json_field(row.score.features.as_ref())?);
        }

        writeln!(self.out, "{}", fields.join("\t"))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn json_field<T: Serialize>(value: Option<&T>) -> Result<String, OutputError> {
    match value {
        Some(v) => Ok(escape(&serde_json::to_string(v)?).into_owned()),
        None => Ok(NULL.to_string()),
    }
}

/// A decoded data row; `None` marks a `NULL` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsvRow {
    /// 1-based line number in the file
    pub line: usize,
    pub fields: Vec<Option<String>>,
}

impl TsvRow {
    /// Field `index`, or a `Malformed` error naming `column` if it is absent or NULL
    pub fn required(&self, index: usize, column: &str) -> Result<&str, OutputError> {
        match self.fields.get(index) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(self.malformed(format!("{} is NULL", column))),
            None => Err(self.malformed(format!("missing {} column", column))),
        }
    }

    pub fn malformed(&self, reason: impl Into<String>) -> OutputError {
        OutputError::Malformed {
            line: self.line,
            reason: reason.into(),
        }
    }
}

/// Reads a TSV file with a header line. Blank lines are skipped.
pub struct TsvReader<R: BufRead> {
    lines: io::Lines<R>,
    line: usize,
    headers: Vec<String>,
}

impl<R: BufRead> TsvReader<R> {
    pub fn new(reader: R) -> Result<Self, OutputError> {
        let mut lines = reader.lines();
        let headers = match lines.next() {
            Some(header) => header?.split('\t').map(unescape).collect(),
            None => Vec::new(),
        };
        Ok(Self {
            lines,
            line: 1,
            headers,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: BufRead> Iterator for TsvReader<R> {
    type Item = Result<TsvRow, OutputError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                continue;
            }

            let fields = line
                .split('\t')
                .map(|f| if f == NULL { None } else { Some(unescape(f)) })
                .collect();
            return Some(Ok(TsvRow {
                line: self.line,
                fields,
            }));
        }
    }
}

/// Backslash-escape a field value
pub fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\t', '\n', '\r']) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Reverse of [`escape`]; unknown escapes keep the escaped character
pub fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
