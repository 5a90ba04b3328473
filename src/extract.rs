//! Multi-format text extraction (PDF, Word, plain text, HTML).
//!
//! Extraction is pipeline-layer: sources supply bytes plus a MIME type and
//! this module returns plain UTF-8 text. Every failure is a typed
//! [`ExtractError`]; malformed input never panics the caller.

use std::io::Read;
use std::path::Path;

use scraper::{ElementRef, Html, Node};
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_HTML: &str = "text/html";

/// Every MIME type [`extract_text`] dispatches on.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[MIME_PDF, MIME_MSWORD, MIME_DOCX, MIME_TEXT, MIME_HTML];

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Subtrees whose text never reaches the output.
const HTML_SKIPPED: &[&str] = &["script", "style", "noscript", "template"];

const HTML_BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "title", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("document is empty")]
    EmptyInput,
    #[error("no text could be extracted")]
    NoText,
    #[error("document is corrupt or unreadable: {0}")]
    Corrupt(String),
    #[error("extraction did not finish within {0}s")]
    Timeout(u64),
}

impl ExtractError {
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractError::UnsupportedType(_) => "unsupported-type",
            ExtractError::EmptyInput => "empty-input",
            ExtractError::NoText => "no-text",
            ExtractError::Corrupt(_) => "corrupt",
            ExtractError::Timeout(_) => "timeout",
        }
    }
}

/// Lower-cased MIME essence without parameters (`text/html; charset=utf-8` -> `text/html`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_supported_mime(mime: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&normalize_mime(mime).as_str())
}

/// MIME type for a file extension (case-insensitive, without the dot).
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some(MIME_PDF),
        "doc" => Some(MIME_MSWORD),
        "docx" => Some(MIME_DOCX),
        "txt" => Some(MIME_TEXT),
        "html" | "htm" => Some(MIME_HTML),
        _ => None,
    }
}

/// MIME type for a path, by extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
}

/// True when `size` is non-zero and at most `max_bytes`.
pub fn validate_file_size(size: u64, max_bytes: u64) -> bool {
    size > 0 && size <= max_bytes
}

/// Extracts plain text from document bytes according to `mime_type`.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Result<String, ExtractError> {
    let mime = normalize_mime(mime_type);
    if !SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ExtractError::UnsupportedType(mime_type.to_string()));
    }
    if bytes.is_empty() {
        return Err(ExtractError::EmptyInput);
    }

    let text = match mime.as_str() {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX | MIME_MSWORD => extract_docx(bytes)?,
        MIME_TEXT => extract_plain(bytes),
        _ => extract_html(bytes),
    };

    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

/// Readers accept the `%PDF-` marker anywhere in the first 1024 bytes.
const PDF_HEADER_WINDOW: usize = 1024;

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let head = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if !head.windows(5).any(|w| w == b"%PDF-") {
        return Err(ExtractError::Corrupt("missing %PDF- header".to_string()));
    }
    let parsed = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::Corrupt("PDF parser aborted".to_string()))?;
    let text = parsed.map_err(|e| ExtractError::Corrupt(e.to_string()))?;
    Ok(collapse_blank_lines(&text.replace("\r\n", "\n")))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Corrupt(format!("not an OOXML container: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Corrupt("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Corrupt(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Corrupt(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    let text = word_runs_to_text(&doc_xml)?;
    Ok(collapse_blank_lines(&text))
}

/// Concatenates `w:t` runs; `w:tab`, `w:br`/`w:cr` and paragraph ends
/// become whitespace.
fn word_runs_to_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Corrupt(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Corrupt(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_plain(bytes: &[u8]) -> String {
    let text = decode_text(bytes);
    text.trim_start_matches('\u{feff}').trim().to_string()
}

/// Strict UTF-8, falling back to Latin-1 (every byte is a code point).
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn extract_html(bytes: &[u8]) -> String {
    let source = decode_text(bytes);
    let document = Html::parse_document(source.trim_start_matches('\u{feff}'));
    let mut raw = String::new();
    collect_html_text(document.root_element(), &mut raw);

    let lines: Vec<String> = raw
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    collapse_blank_lines(&lines.join("\n"))
}

fn collect_html_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.extend(
                text.chars()
                    .map(|c| if c.is_whitespace() { ' ' } else { c }),
            ),
            Node::Element(el) => {
                let name = el.name();
                if HTML_SKIPPED.contains(&name) {
                    continue;
                }
                let block = HTML_BLOCKS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_html_text(child_ref, out);
                }
                if block {
                    out.push('\n');
                } else if name == "td" || name == "th" {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Runs of three or more newlines become one blank line; the result is trimmed.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
            continue;
        }
        if c == '\r' {
            continue;
        }
        if newlines > 0 && c.is_whitespace() && c != '\t' {
            // whitespace-only lines count as blank
            continue;
        }
        newlines = 0;
        out.push(c);
    }
    out.trim().to_string()
}
