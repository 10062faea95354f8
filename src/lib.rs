//! articlescore: article quality scores for the revisions of MediaWiki dumps
//!
//! Streams pages out of XML dumps (plain, bzip2 or gzip), picks the revisions
//! to score under a sampling policy, classifies them with a quality model and
//! writes one TSV row per scored revision:
//! - every revision, at its own timestamp
//! - the latest revision, as of the dump date
//! - the revision in effect at monthly, biannual or annual thresholds
//!
//! Runs can be resumed from a previous output: pages are only scored past the
//! last timestamp already written for them.

pub mod config;
pub mod dump;
pub mod model;
pub mod output;
pub mod scoring;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
