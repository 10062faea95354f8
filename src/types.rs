//! Core types shared by the dump reader, the sampling strategies and the output sink

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// MediaWiki page identifier
pub type PageId = u64;

/// MediaWiki revision identifier
pub type RevisionId = u64;

/// Main (article) namespace
pub const MAIN_NAMESPACE: i32 = 0;

// ============================================================================
// Timestamp
// ============================================================================

/// Compact timestamp layout used in TSV output (`YYYYMMDDHHMMSS`)
const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

/// ISO-8601 layout used inside XML dumps
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Error returned when a timestamp string cannot be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid timestamp '{input}': expected YYYYMMDDHHMMSS, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SSZ")]
pub struct TimestampError {
    pub input: String,
}

/// A second-resolution UTC timestamp
///
/// Accepts the three forms that show up in dumps, output files and on the
/// command line: ISO-8601 (`2024-01-15T10:30:00Z`), compact
/// (`20240115103000`) and plain dates (`2024-01-15`, midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Build a timestamp from calendar fields, `None` if the fields are out of range
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Timestamp)
    }

    /// Parse any of the accepted timestamp forms
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        let s = input.trim();
        let err = || TimestampError {
            input: input.to_string(),
        };

        if s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit()) {
            return NaiveDateTime::parse_from_str(s, COMPACT_FORMAT)
                .map(|dt| Timestamp(dt.and_utc()))
                .map_err(|_| err());
        }

        if s.len() == 10 {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Timestamp(dt.and_utc()))
                .ok_or_else(err);
        }

        DateTime::parse_from_rfc3339(s)
            .map(|dt| Timestamp(dt.with_timezone(&Utc)))
            .map_err(|_| err())
    }

    /// Compact `YYYYMMDDHHMMSS` rendering
    pub fn short_format(&self) -> String {
        self.0.format(COMPACT_FORMAT).to_string()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp(dt)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timestamp::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_FORMAT))
    }
}

// ============================================================================
// Pages and revisions
// ============================================================================

/// Page-level metadata read before the page's revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub id: PageId,
    pub title: Arc<str>,
    pub namespace: i32,
    pub redirect: bool,
}

impl PageHeader {
    pub fn new(id: PageId, title: impl Into<Arc<str>>, namespace: i32) -> Self {
        Self {
            id,
            title: title.into(),
            namespace,
            redirect: false,
        }
    }

    /// Mark the page as a redirect
    pub fn with_redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    /// Only non-redirect articles in the main namespace are scored
    pub fn is_scorable(&self) -> bool {
        self.namespace == MAIN_NAMESPACE && !self.redirect
    }
}

/// A single revision of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: RevisionId,
    pub timestamp: Timestamp,
    pub text: String,
}

impl Revision {
    pub fn new(id: RevisionId, timestamp: Timestamp, text: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            text: text.into(),
        }
    }
}
