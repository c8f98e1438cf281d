use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::Segment;
use lopdf::Document;
use regex::{Captures, Regex};
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
}

impl FileKind {
    pub const SUPPORTED_EXTENSIONS: [&'static str; 3] = ["pdf", "docx", "txt"];

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();

        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

pub trait DocumentExtractor {
    fn extract_segments(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Segment>, IngestError>;
}

/// One segment per page with readable text.
#[derive(Default)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract_segments(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Segment>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut segments = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            let text = text.trim();
            if !text.is_empty() {
                segments.push(
                    Segment::new(text, format!("{file_name}, page {page_no}"))
                        .with_page(page_no as usize),
                );
            }
        }

        if segments.is_empty() {
            return Err(IngestError::EmptyDocument(format!(
                "pdf had no readable page text: {file_name}"
            )));
        }

        Ok(segments)
    }
}

/// One segment per non-empty paragraph of `word/document.xml`. Paragraph
/// numbers count every paragraph in the body, empty ones included, so a
/// reference points at the same place a word processor would.
#[derive(Default)]
pub struct DocxExtractor;

const DOCX_BODY: &str = "word/document.xml";

impl DocumentExtractor for DocxExtractor {
    fn extract_segments(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Segment>, IngestError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY)
            .map_err(|error| IngestError::DocxParse(format!("{file_name}: {DOCX_BODY}: {error}")))?
            .read_to_string(&mut xml)
            .map_err(|error| IngestError::DocxParse(format!("{file_name}: {error}")))?;

        let paragraphs = docx_paragraphs(&xml)?;
        let segments = paragraphs
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(index, text)| {
                Segment::new(text, format!("{file_name}, paragraph {}", index + 1))
                    .with_page(index + 1)
            })
            .collect::<Vec<_>>();

        if segments.is_empty() {
            return Err(IngestError::EmptyDocument(format!(
                "docx had no paragraph text: {file_name}"
            )));
        }

        Ok(segments)
    }
}

fn docx_paragraphs(xml: &str) -> Result<Vec<String>, IngestError> {
    let paragraph_re = Regex::new(r"(?s)<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*)?>(.*?)</w:p>")?;
    let run_re = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:(?:tab|br|cr)(?:\s[^>]*)?/>")?;
    let entity_re = Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);")?;

    let mut paragraphs = Vec::new();
    for paragraph in paragraph_re.captures_iter(xml) {
        let Some(body) = paragraph.get(1) else {
            paragraphs.push(String::new());
            continue;
        };

        let mut text = String::new();
        for run in run_re.captures_iter(body.as_str()) {
            match run.get(1) {
                Some(content) => text.push_str(&unescape_xml(&entity_re, content.as_str())),
                None => text.push(' '),
            }
        }
        paragraphs.push(normalize_whitespace(&text));
    }

    Ok(paragraphs)
}

fn unescape_xml(entity_re: &Regex, text: &str) -> String {
    entity_re
        .replace_all(text, |captures: &Captures| {
            let entity = &captures[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                numeric => {
                    let code = match numeric.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => numeric.trim_start_matches('#').parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| captures[0].to_string(), String::from)
        })
        .into_owned()
}

/// The whole file as a single segment.
#[derive(Default)]
pub struct TextExtractor;

impl DocumentExtractor for TextExtractor {
    fn extract_segments(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Segment>, IngestError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| IngestError::Encoding(format!("{file_name}: {error}")))?;
        let text = text.trim_start_matches('\u{feff}').trim();

        if text.is_empty() {
            return Err(IngestError::EmptyDocument(format!("text file is empty: {file_name}")));
        }

        Ok(vec![Segment::new(text, file_name).with_page(1)])
    }
}

/// Dispatches on the file extension. Unknown extensions are rejected before
/// any parsing happens.
pub fn extract(bytes: &[u8], file_name: &str) -> Result<Vec<Segment>, IngestError> {
    let kind = FileKind::from_file_name(file_name).ok_or_else(|| {
        IngestError::UnsupportedFileType(format!(
            "{file_name} (expected one of: {})",
            FileKind::SUPPORTED_EXTENSIONS.join(", ")
        ))
    })?;

    match kind {
        FileKind::Pdf => LopdfExtractor.extract_segments(bytes, file_name),
        FileKind::Docx => DocxExtractor.extract_segments(bytes, file_name),
        FileKind::Text => TextExtractor.extract_segments(bytes, file_name),
    }
}
