use std::{collections::HashMap, io::Cursor, io::Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use common::storage::types::document::DocumentKind;

/// Capability contract for pulling plain text out of one document format.
///
/// Extraction failures stay behind this boundary: implementations log and
/// return an empty string, they never error out.
pub trait TextExtractor: Send + Sync {
    fn kind(&self) -> DocumentKind;
    fn extract(&self, bytes: &[u8]) -> String;
}

/// Dispatch table from detected document type to its extractor. Supporting a
/// new format means registering one more variant here.
pub struct ExtractorSet {
    by_kind: HashMap<DocumentKind, Box<dyn TextExtractor>>,
}

impl ExtractorSet {
    pub fn with_defaults() -> Self {
        let mut by_kind: HashMap<DocumentKind, Box<dyn TextExtractor>> = HashMap::new();
        for extractor in [
            Box::new(PdfExtractor) as Box<dyn TextExtractor>,
            Box::new(DocxExtractor),
        ] {
            by_kind.insert(extractor.kind(), extractor);
        }
        Self { by_kind }
    }

    pub fn extract(&self, kind: DocumentKind, bytes: &[u8]) -> String {
        match self.by_kind.get(&kind) {
            Some(extractor) => extractor.extract(bytes),
            None => {
                warn!(kind = kind.as_str(), "No extractor registered");
                String::new()
            }
        }
    }
}

/// Text-layer PDF extraction.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn extract(&self, bytes: &[u8]) -> String {
        match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                warn!(error = %err, "Failed to extract text from PDF");
                String::new()
            }
        }
    }
}

/// DOCX extraction: reads the text runs of `word/document.xml` inside the
/// archive, one line per paragraph.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Docx
    }

    fn extract(&self, bytes: &[u8]) -> String {
        match read_docx_text(bytes) {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                warn!(error = %err, "Failed to extract text from DOCX");
                String::new()
            }
        }
    }
}

fn read_docx_text(bytes: &[u8]) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut document_xml)?;

    let mut reader = Reader::from_str(&document_xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Event::End(ref e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text_run => text.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>{body}</w:body>
</w:document>"#
        );

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document.as_bytes()).unwrap();
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_bytes(&["First paragraph.", "Second paragraph."]);
        let text = DocxExtractor.extract(&bytes);
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn docx_entities_are_unescaped() {
        let bytes = docx_bytes(&["Salt &amp; water"]);
        let text = DocxExtractor.extract(&bytes);
        assert_eq!(text, "Salt & water");
    }

    #[test]
    fn garbage_bytes_yield_empty_text() {
        assert_eq!(DocxExtractor.extract(b"not a zip archive"), "");
        assert_eq!(PdfExtractor.extract(b"not a pdf"), "");
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let extractors = ExtractorSet::with_defaults();
        let bytes = docx_bytes(&["Dispatched."]);
        assert_eq!(extractors.extract(DocumentKind::Docx, &bytes), "Dispatched.");
        assert_eq!(extractors.extract(DocumentKind::Pdf, b"junk"), "");
    }
}
