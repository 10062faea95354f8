//! Core types for reading page/revision dumps

use crate::types::TimestampError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading a dump
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Invalid dump format: {0}")]
    InvalidFormat(String),

    #[error("Missing <{element}> in {context}")]
    MissingField {
        element: &'static str,
        context: String,
    },

    #[error("Invalid <{element}> value '{value}'")]
    InvalidField { element: &'static str, value: String },

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

impl From<quick_xml::Error> for DumpError {
    fn from(e: quick_xml::Error) -> Self {
        DumpError::XmlParse(e.to_string())
    }
}

/// Compression wrapping the XML stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// Uncompressed XML
    PlainXml,
    /// bzip2-compressed XML (`.xml.bz2`)
    Bzip2Xml,
    /// gzip-compressed XML (`.xml.gz`)
    GzipXml,
}

impl DumpFormat {
    /// Detect format from file path
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let name_lower = name.to_lowercase();

        if name_lower.ends_with(".bz2") {
            Some(DumpFormat::Bzip2Xml)
        } else if name_lower.ends_with(".gz") {
            Some(DumpFormat::GzipXml)
        } else if name_lower.ends_with(".xml") {
            Some(DumpFormat::PlainXml)
        } else {
            None
        }
    }
}
