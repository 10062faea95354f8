//! Wikimedia XML dump reader
//!
//! Streams `<page>` elements out of a MediaWiki XML export (optionally
//! compressed with bzip2 or gzip). Page metadata is read eagerly; revisions
//! are parsed one at a time as the caller advances the page's iterator, so a
//! full-history dump never has more than one revision text in memory.

use super::source::{DumpError, DumpFormat};
use crate::types::{PageHeader, Revision, Timestamp, MAIN_NAMESPACE};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

/// 1MB read buffer
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Reader abstraction for different compression formats
enum WikimediaReader {
    /// Bzip2 compressed
    Bzip2(Reader<BufReader<MultiBzDecoder<File>>>),
    /// Gzip compressed
    Gzip(Reader<BufReader<MultiGzDecoder<File>>>),
    /// Uncompressed XML
    Plain(Reader<BufReader<File>>),
    /// Any other buffered source
    Stream(Reader<Box<dyn BufRead + Send>>),
}

impl WikimediaReader {
    fn read_event<'a>(&mut self, buf: &'a mut Vec<u8>) -> Result<Event<'a>, quick_xml::Error> {
        buf.clear();
        match self {
            WikimediaReader::Bzip2(reader) => reader.read_event_into(buf),
            WikimediaReader::Gzip(reader) => reader.read_event_into(buf),
            WikimediaReader::Plain(reader) => reader.read_event_into(buf),
            WikimediaReader::Stream(reader) => reader.read_event_into(buf),
        }
    }
}

/// Owned view of the XML events the reader cares about
enum Tag {
    Start(Vec<u8>),
    Empty(Vec<u8>),
    End(Vec<u8>),
    /// `<namespace key="..">` from siteinfo
    Namespace(i32),
    Text(String),
    Eof,
    Other,
}

/// Where the reader currently is relative to the open page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    /// No page open, or the open page has no more revisions
    Closed,
    /// `<revision>` start tag already consumed, body not yet parsed
    RevisionOpen,
    /// Inside a page, between revisions
    BetweenRevisions,
}

/// Streaming reader over the pages of one dump file
pub struct DumpReader {
    name: String,
    reader: WikimediaReader,
    buf: Vec<u8>,
    state: PageState,
    /// Namespace prefixes declared in siteinfo
    namespaces: Vec<(i32, String)>,
}

impl DumpReader {
    /// Open a dump file, picking the decompressor from the file extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DumpError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let reader = match DumpFormat::detect(path).unwrap_or(DumpFormat::PlainXml) {
            DumpFormat::Bzip2Xml => {
                let decoder = MultiBzDecoder::new(file);
                WikimediaReader::Bzip2(Reader::from_reader(BufReader::with_capacity(
                    READ_BUFFER_SIZE,
                    decoder,
                )))
            }
            DumpFormat::GzipXml => {
                let decoder = MultiGzDecoder::new(file);
                WikimediaReader::Gzip(Reader::from_reader(BufReader::with_capacity(
                    READ_BUFFER_SIZE,
                    decoder,
                )))
            }
            DumpFormat::PlainXml => WikimediaReader::Plain(Reader::from_reader(
                BufReader::with_capacity(READ_BUFFER_SIZE, file),
            )),
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("wikimedia dump")
            .to_string();

        Ok(Self::with_reader(name, reader))
    }

    /// Read a dump from an arbitrary buffered source (already decompressed)
    pub fn from_reader(name: impl Into<String>, source: impl BufRead + Send + 'static) -> Self {
        let boxed: Box<dyn BufRead + Send> = Box::new(source);
        Self::with_reader(name.into(), WikimediaReader::Stream(Reader::from_reader(boxed)))
    }

    fn with_reader(name: String, reader: WikimediaReader) -> Self {
        Self {
            name,
            reader,
            buf: Vec::with_capacity(8192),
            state: PageState::Closed,
            namespaces: Vec::new(),
        }
    }

    /// Name of the source, for logging
    pub fn source_name(&self) -> &str {
        &self.name
    }

    /// Advance to the next page in the dump
    ///
    /// Any revisions of the previous page that were not consumed are skipped.
    pub fn next_page(&mut self) -> Result<Option<Page<'_>>, DumpError> {
        self.state = PageState::Closed;

        loop {
            match self.next_tag()? {
                Tag::Start(name) if name == b"page" => break,
                Tag::Namespace(key) => {
                    let name = self.read_text(b"namespace")?;
                    self.namespaces.push((key, name));
                }
                Tag::Eof => return Ok(None),
                _ => {}
            }
        }

        let mut title: Option<String> = None;
        let mut id: Option<String> = None;
        let mut namespace: Option<String> = None;
        let mut redirect = false;

        loop {
            match self.next_tag()? {
                Tag::Start(name) => match name.as_slice() {
                    b"title" => title = Some(self.read_text(b"title")?),
                    b"ns" => namespace = Some(self.read_text(b"ns")?),
                    b"id" => id = Some(self.read_text(b"id")?),
                    b"redirect" => redirect = true,
                    b"revision" => {
                        self.state = PageState::RevisionOpen;
                        break;
                    }
                    _ => {}
                },
                Tag::Empty(name) if name == b"redirect" => redirect = true,
                Tag::End(name) if name == b"page" => break,
                Tag::Eof => {
                    return Err(DumpError::InvalidFormat(format!(
                        "{}: unexpected end of file inside <page>",
                        self.name
                    )))
                }
                _ => {}
            }
        }

        let title = title.ok_or_else(|| DumpError::MissingField {
            element: "title",
            context: format!("page in {}", self.name),
        })?;
        let id = id.ok_or_else(|| DumpError::MissingField {
            element: "id",
            context: format!("page '{}'", title),
        })?;
        let id = parse_number(&id, "id")?;
        let namespace = match namespace {
            Some(ns) => parse_number(&ns, "ns")?,
            // Exports before 0.5 carry no <ns>
            None => self.namespace_of(&title),
        };

        let header = PageHeader::new(id, title, namespace).with_redirect(redirect);

        Ok(Some(Page {
            header,
            revisions: Revisions { reader: self },
        }))
    }

    /// Namespace of `title` from its siteinfo prefix
    fn namespace_of(&self, title: &str) -> i32 {
        title
            .split_once(':')
            .and_then(|(prefix, _)| self.namespaces.iter().find(|(_, name)| name == prefix))
            .map_or(MAIN_NAMESPACE, |(key, _)| *key)
    }

    fn next_tag(&mut self) -> Result<Tag, DumpError> {
        let event = self.reader.read_event(&mut self.buf)?;

        let tag = match event {
            Event::Start(ref e) if e.local_name().as_ref() == b"namespace" => {
                let key = e
                    .try_get_attribute("key")
                    .map_err(|e| DumpError::XmlParse(e.to_string()))?
                    .ok_or_else(|| DumpError::MissingField {
                        element: "key",
                        context: "siteinfo namespace".to_string(),
                    })?;
                let key = String::from_utf8_lossy(&key.value).into_owned();
                Tag::Namespace(parse_number(&key, "key")?)
            }
            Event::Start(ref e) => Tag::Start(e.local_name().as_ref().to_vec()),
            Event::Empty(ref e) => Tag::Empty(e.local_name().as_ref().to_vec()),
            Event::End(ref e) => Tag::End(e.local_name().as_ref().to_vec()),
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| DumpError::XmlParse(e.to_string()))?;
                Tag::Text(text.into_owned())
            }
            Event::CData(e) => Tag::Text(String::from_utf8_lossy(&e.into_inner()).into_owned()),
            Event::Eof => Tag::Eof,
            _ => Tag::Other,
        };

        Ok(tag)
    }

    /// Collect character data up to the closing tag `end`
    fn read_text(&mut self, end: &[u8]) -> Result<String, DumpError> {
        let mut text = String::new();
        loop {
            match self.next_tag()? {
                Tag::Text(t) => text.push_str(&t),
                Tag::End(name) if name == end => return Ok(text),
                Tag::Eof => {
                    return Err(DumpError::InvalidFormat(format!(
                        "{}: unexpected end of file inside <{}>",
                        self.name,
                        String::from_utf8_lossy(end)
                    )))
                }
                _ => {}
            }
        }
    }

    /// Parse the next revision of the open page, `None` once the page closes
    fn next_revision(&mut self) -> Result<Option<Revision>, DumpError> {
        match self.state {
            PageState::Closed => return Ok(None),
            PageState::RevisionOpen => {}
            PageState::BetweenRevisions => loop {
                match self.next_tag()? {
                    Tag::Start(name) if name == b"revision" => break,
                    Tag::End(name) if name == b"page" => {
                        self.state = PageState::Closed;
                        return Ok(None);
                    }
                    Tag::Eof => {
                        self.state = PageState::Closed;
                        return Err(DumpError::InvalidFormat(format!(
                            "{}: unexpected end of file inside <page>",
                            self.name
                        )));
                    }
                    _ => {}
                }
            },
        }

        self.state = PageState::BetweenRevisions;

        let mut id: Option<String> = None;
        let mut timestamp: Option<String> = None;
        let mut text: Option<String> = None;
        let mut in_contributor = false;

        loop {
            match self.next_tag()? {
                Tag::Start(name) => match name.as_slice() {
                    b"contributor" => in_contributor = true,
                    b"id" if !in_contributor && id.is_none() => id = Some(self.read_text(b"id")?),
                    b"timestamp" => timestamp = Some(self.read_text(b"timestamp")?),
                    b"text" => text = Some(self.read_text(b"text")?),
                    _ => {}
                },
                Tag::End(name) => match name.as_slice() {
                    b"contributor" => in_contributor = false,
                    b"revision" => break,
                    _ => {}
                },
                // Deleted or suppressed text shows up as an empty element
                Tag::Empty(name) if name == b"text" => text = Some(String::new()),
                Tag::Eof => {
                    self.state = PageState::Closed;
                    return Err(DumpError::InvalidFormat(format!(
                        "{}: unexpected end of file inside <revision>",
                        self.name
                    )));
                }
                _ => {}
            }
        }

        let id = id.ok_or_else(|| DumpError::MissingField {
            element: "id",
            context: format!("revision in {}", self.name),
        })?;
        let id = parse_number(&id, "id")?;
        let timestamp = timestamp.ok_or_else(|| DumpError::MissingField {
            element: "timestamp",
            context: format!("revision {}", id),
        })?;
        let timestamp = Timestamp::parse(&timestamp)?;

        Ok(Some(Revision::new(id, timestamp, text.unwrap_or_default())))
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, element: &'static str) -> Result<T, DumpError> {
    value.trim().parse().map_err(|_| DumpError::InvalidField {
        element,
        value: value.to_string(),
    })
}

/// A page whose revisions are read lazily from the underlying dump
pub struct Page<'r> {
    header: PageHeader,
    revisions: Revisions<'r>,
}

impl<'r> Page<'r> {
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Split into the header and the single-pass revision stream
    pub fn into_parts(self) -> (PageHeader, Revisions<'r>) {
        (self.header, self.revisions)
    }
}

/// Single-pass iterator over the revisions of one page
pub struct Revisions<'r> {
    reader: &'r mut DumpReader,
}

impl Iterator for Revisions<'_> {
    type Item = Result<Revision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_revision() {
            Ok(Some(revision)) => Some(Ok(revision)),
            Ok(None) => None,
            Err(e) => {
                self.reader.state = PageState::Closed;
                Some(Err(e))
            }
        }
    }
}
