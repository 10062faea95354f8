//! Resume watermarks
//!
//! Reads a previous run's output and records, per page, the last as-of
//! timestamp already written. Strategies skip anything at or before it.

use crate::output::{OutputError, TsvReader};
use crate::types::{PageId, Timestamp};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Page id -> last scored timestamp. Read-only once the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks(HashMap<PageId, Timestamp>);

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page_id: PageId) -> Option<Timestamp> {
        self.0.get(&page_id).copied()
    }

    /// Record a timestamp for a page, replacing any earlier one
    pub fn insert(&mut self, page_id: PageId, timestamp: Timestamp) {
        self.0.insert(page_id, timestamp);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a prior score file. The last row seen for a page wins.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, OutputError> {
        let mut watermarks = Self::new();

        for row in TsvReader::new(reader)? {
            let row = row?;
            if row.fields.len() < 4 {
                return Err(row.malformed(format!("expected at least 4 columns, found {}", row.fields.len())));
            }

            let page_id = row
                .required(0, "page_id")?
                .parse::<PageId>()
                .map_err(|e| row.malformed(format!("page_id: {}", e)))?;
            row.required(2, "rev_id")?
                .parse::<u64>()
                .map_err(|e| row.malformed(format!("rev_id: {}", e)))?;
            let timestamp =
                Timestamp::parse(row.required(3, "timestamp")?).map_err(|e| row.malformed(e.to_string()))?;

            watermarks.insert(page_id, timestamp);
        }

        Ok(watermarks)
    }

    pub fn load(path: &Path) -> Result<Self, OutputError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl FromIterator<(PageId, Timestamp)> for Watermarks {
    fn from_iter<I: IntoIterator<Item = (PageId, Timestamp)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Watermarks from an optional prior output; empty without one
pub fn build_watermarks(prior_output: Option<&Path>) -> Result<Watermarks, OutputError> {
    match prior_output {
        Some(path) => Watermarks::load(path),
        None => Ok(Watermarks::new()),
    }
}
