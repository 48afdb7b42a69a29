//! Text extraction for cataloged files.
//!
//! Dispatch is a closed set of [`ContentKind`]s keyed by file extension.
//! [`Extractor::extract_bytes`] never fails: a corrupt, encrypted, or
//! truncated file yields an empty string, and a panic inside a format
//! parser is caught and treated the same way. [`Extractor::try_extract`]
//! exposes the underlying error for callers that care.
//!
//! | Kind | Extensions | Text produced |
//! |------|------------|---------------|
//! | `PlainText` | `.txt`, `.md` | decoded with the configured encodings |
//! | `Delimited` | `.csv`, `.tsv` | one line per row, cells space-separated |
//! | `Paginated(Pdf)` | `.pdf` | one block per readable page |
//! | `Paginated(Slides)` | `.pptx` | one block per slide, in slide order |
//! | `Spreadsheet` | `.xlsx` | one line per row, all sheets |
//! | `RichText` | `.docx` | one line per paragraph |

use encoding_rs::Encoding;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;

use crate::config::ExtractionConfig;

/// Extensions the indexer will hand to the extractor.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".csv", ".docx", ".md", ".pdf", ".pptx", ".tsv", ".txt", ".xlsx",
];

pub fn is_supported(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    Pdf,
    Slides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    Delimited { delimiter: u8 },
    Paginated(PageFormat),
    Spreadsheet,
    RichText,
}

impl ContentKind {
    /// Kind for a normalized extension (lowercase, leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".txt" | ".md" => Some(ContentKind::PlainText),
            ".csv" => Some(ContentKind::Delimited { delimiter: b',' }),
            ".tsv" => Some(ContentKind::Delimited { delimiter: b'\t' }),
            ".pdf" => Some(ContentKind::Paginated(PageFormat::Pdf)),
            ".pptx" => Some(ContentKind::Paginated(PageFormat::Slides)),
            ".xlsx" => Some(ContentKind::Spreadsheet),
            ".docx" => Some(ContentKind::RichText),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("parser panicked")]
    Panicked,
}

/// Format-aware text extractor. Cheap to clone; holds only limits and
/// the resolved encoding list.
#[derive(Debug, Clone)]
pub struct Extractor {
    encodings: Vec<&'static Encoding>,
    max_delimited_rows: usize,
    max_spreadsheet_cells: usize,
    max_entry_bytes: u64,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl Extractor {
    /// Unknown encoding labels are ignored; config validation rejects them
    /// up front. UTF-8 is used if none remain.
    pub fn new(config: &ExtractionConfig) -> Self {
        let mut encodings: Vec<&'static Encoding> = config
            .encodings
            .iter()
            .filter_map(|label| Encoding::for_label(label.as_bytes()))
            .collect();
        if encodings.is_empty() {
            encodings.push(encoding_rs::UTF_8);
        }
        Self {
            encodings,
            max_delimited_rows: config.max_delimited_rows,
            max_spreadsheet_cells: config.max_spreadsheet_cells,
            max_entry_bytes: config.max_entry_bytes,
        }
    }

    /// Read and extract a file. Unreadable files yield an empty string.
    pub fn extract(&self, path: &Path, kind: ContentKind) -> String {
        match std::fs::read(path) {
            Ok(bytes) => self.extract_bytes(&bytes, kind),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read file for extraction");
                String::new()
            }
        }
    }

    /// Extract text from an in-memory file. Never fails.
    pub fn extract_bytes(&self, bytes: &[u8], kind: ContentKind) -> String {
        match self.try_extract(bytes, kind) {
            Ok(text) => text,
            Err(e) => {
                debug!(?kind, error = %e, "extraction failed, indexing empty text");
                String::new()
            }
        }
    }

    pub fn try_extract(&self, bytes: &[u8], kind: ContentKind) -> Result<String, ExtractError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(bytes, kind)))
            .unwrap_or(Err(ExtractError::Panicked))
    }

    fn dispatch(&self, bytes: &[u8], kind: ContentKind) -> Result<String, ExtractError> {
        match kind {
            ContentKind::PlainText => Ok(self.decode_text(bytes)),
            ContentKind::Delimited { delimiter } => Ok(self.extract_delimited(bytes, delimiter)),
            ContentKind::Paginated(PageFormat::Pdf) => extract_pdf(bytes),
            ContentKind::Paginated(PageFormat::Slides) => self.extract_pptx(bytes),
            ContentKind::Spreadsheet => self.extract_xlsx(bytes),
            ContentKind::RichText => self.extract_docx(bytes),
        }
    }

    /// Decode text: a byte-order mark wins, then each configured encoding
    /// in turn; if none decodes cleanly the first is applied lossily and
    /// replacement characters are dropped.
    pub fn decode_text(&self, bytes: &[u8]) -> String {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            return text.into_owned();
        }
        for encoding in &self.encodings {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
            {
                return text.into_owned();
            }
        }
        let (text, _) = self.encodings[0].decode_without_bom_handling(bytes);
        text.replace('\u{FFFD}', "")
    }

    fn extract_delimited(&self, bytes: &[u8], delimiter: u8) -> String {
        let text = self.decode_text(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut lines = Vec::new();
        for record in reader.records().take(self.max_delimited_rows) {
            match record {
                Ok(record) => {
                    let line = record
                        .iter()
                        .map(str::trim)
                        .filter(|cell| !cell.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "stopping at malformed delimited row");
                    break;
                }
            }
        }
        lines.join("\n")
    }

    fn read_entry(
        &self,
        archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
        name: &str,
    ) -> Result<Vec<u8>, ExtractError> {
        let entry = archive
            .by_name(name)
            .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
        let mut out = Vec::new();
        entry
            .take(self.max_entry_bytes.saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        if out.len() as u64 > self.max_entry_bytes {
            return Err(ExtractError::Ooxml(format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, self.max_entry_bytes
            )));
        }
        Ok(out)
    }

    fn extract_docx(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = open_zip(bytes)?;
        let xml = self.read_entry(&mut archive, "word/document.xml")?;
        paragraph_text(&xml)
    }

    fn extract_pptx(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = open_zip(bytes)?;
        let slides = numbered_entries(&archive, "ppt/slides/slide");

        let mut blocks = Vec::new();
        for name in slides {
            let text = self
                .read_entry(&mut archive, &name)
                .and_then(|xml| paragraph_text(&xml));
            match text {
                Ok(text) if !text.is_empty() => blocks.push(text),
                Ok(_) => {}
                Err(e) => debug!(slide = %name, error = %e, "skipping unreadable slide"),
            }
        }
        Ok(blocks.join("\n"))
    }

    fn extract_xlsx(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut archive = open_zip(bytes)?;
        let shared = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
            shared_strings(&self.read_entry(&mut archive, "xl/sharedStrings.xml")?)?
        } else {
            Vec::new()
        };

        let sheets = numbered_entries(&archive, "xl/worksheets/sheet");
        let mut budget = self.max_spreadsheet_cells;
        let mut lines = Vec::new();
        for name in sheets {
            if budget == 0 {
                break;
            }
            let xml = self.read_entry(&mut archive, &name)?;
            sheet_rows(&xml, &shared, &mut budget, &mut lines)?;
        }
        Ok(lines.join("\n"))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "lopdf could not load PDF, trying whole-document extraction");
            return pdf_extract::extract_text_from_mem(bytes)
                .map(|text| text.trim().to_string())
                .map_err(|e| ExtractError::Pdf(e.to_string()));
        }
    };
    if doc.is_encrypted() {
        return Err(ExtractError::Encrypted);
    }

    let mut pages = Vec::new();
    for page_no in doc.get_pages().keys() {
        match doc.extract_text(&[*page_no]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pages.push(text.to_string());
                }
            }
            Err(e) => debug!(page = page_no, error = %e, "skipping unreadable PDF page"),
        }
    }
    Ok(pages.join("\n"))
}

fn open_zip(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

/// Entries named `{prefix}{N}.xml`, ordered by N.
fn numbered_entries(archive: &zip::ZipArchive<Cursor<&[u8]>>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .filter(|n| !n[prefix.len()..].contains('/'))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name[prefix.len()..]
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Text of `<t>` runs, one line per `<p>`. Works for both WordprocessingML
/// (`w:p`/`w:t`) and DrawingML (`a:p`/`a:t`).
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    let mut para = String::new();
    let mut lines: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Empty(e)) if matches!(e.local_name().as_ref(), b"tab" | b"br") => {
                para.push(' ')
            }
            Ok(Event::Text(te)) if in_t => {
                para.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let line = para.trim();
                    if !line.is_empty() {
                        lines.push(line.to_string());
                    }
                    para.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = para.trim();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    Ok(lines.join("\n"))
}

/// The shared string table; rich-text runs inside one `<si>` are joined.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Append one line per non-empty row of a worksheet, spending one unit of
/// `budget` per emitted cell.
fn sheet_rows(
    xml: &[u8],
    shared: &[String],
    budget: &mut usize,
    lines: &mut Vec<String>,
) -> Result<(), ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type: Vec<u8> = Vec::new();
    let mut value = String::new();
    let mut in_value = false;

    loop {
        if *budget == 0 {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned())
                        .unwrap_or_default();
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(text) = cell_text(&cell_type, value.trim(), shared) {
                        row.push(text);
                        *budget -= 1;
                    }
                    value.clear();
                }
                b"row" => {
                    if !row.is_empty() {
                        lines.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !row.is_empty() {
        lines.push(row.join(" "));
    }
    Ok(())
}

fn cell_text(cell_type: &[u8], raw: &str, shared: &[String]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let text = match cell_type {
        b"s" => shared.get(raw.parse::<usize>().ok()?)?.clone(),
        b"b" => (if raw == "1" { "TRUE" } else { "FALSE" }).to_string(),
        b"e" => return None,
        _ => raw.to_string(),
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
