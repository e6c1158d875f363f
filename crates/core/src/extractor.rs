use crate::error::IngestError;
use lopdf::Document;
use std::io::Read;
use tracing::warn;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

// Zip-bomb protection for OOXML payloads.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Converts raw file bytes plus a declared content type into plain text,
/// page/paragraph order preserved, paragraphs separated by newlines.
///
/// Unrecognized content types yield an empty string (with a diagnostic)
/// rather than an error, so the pipeline continues and produces zero
/// chunks. Malformed bytes of a recognized type are an error. No side
/// effects; pure function of its inputs.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, IngestError> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match media_type.as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_TEXT | MIME_MARKDOWN => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => {
            warn!(content_type = %other, "unrecognized content type, extracting no text");
            Ok(String::new())
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::Extraction(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::Extraction(format!("page {page_no}: {error}")))?;

        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    Ok(pages.join("\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|error| IngestError::Extraction(error.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|error| IngestError::Extraction(format!("word/document.xml: {error}")))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(IngestError::Io)?;
    }
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(IngestError::Extraction(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_paragraph_texts(&doc_xml)
}

// Walks word/document.xml collecting the text runs (`w:t`); each closed
// paragraph (`w:p`) becomes a newline.
fn extract_paragraph_texts(xml: &[u8]) -> Result<String, IngestError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                if element.local_name().as_ref() == b"t" {
                    if let Ok(Event::Text(text)) = reader.read_event_into(&mut buf) {
                        out.push_str(text.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(Event::End(element)) => {
                if element.local_name().as_ref() == b"p" && !out.is_empty() && !out.ends_with('\n')
                {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(IngestError::Extraction(format!("docx xml: {error}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end_matches('\n').to_string())
}
