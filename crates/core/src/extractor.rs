use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Page-by-page text extraction. Pages without extractable text come back
/// empty instead of failing the document.
#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => normalize_whitespace(&text),
                Err(error) => {
                    debug!(path = %path.display(), page = page_no, %error, "unreadable page");
                    String::new()
                }
            };
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        if extension.eq_ignore_ascii_case("pdf") {
            Some(DocumentKind::Pdf)
        } else if ["txt", "md", "markdown"]
            .iter()
            .any(|known| extension.eq_ignore_ascii_case(known))
        {
            Some(DocumentKind::PlainText)
        } else {
            None
        }
    }
}

/// Extracts the full text of a document. Unreadable PDF pages contribute no
/// text, so the result may be empty.
pub fn extract_document_text(path: &Path) -> Result<String, IngestError> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Pdf) => Ok(join_pages(&LopdfExtractor.extract_pages(path)?)),
        Some(DocumentKind::PlainText) => Ok(std::fs::read_to_string(path)?),
        None => Err(IngestError::UnsupportedDocument(path.display().to_string())),
    }
}

fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
