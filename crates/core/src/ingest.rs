use crate::extractor::{extract_document_text, DocumentKind};
use crate::error::IngestError;
use crate::models::SourceDocument;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if DocumentKind::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedDocument>,
}

/// Loads every given file, and every supported file below every given
/// directory, in argument order. Failures are collected, not returned.
pub fn load_documents(paths: &[PathBuf]) -> LoadReport {
    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    let files = paths.iter().flat_map(|path| {
        if path.is_dir() {
            discover_documents(path)
        } else {
            vec![path.clone()]
        }
    });

    for path in files {
        match load_document(&path) {
            Ok(document) => documents.push(document),
            Err(error) => skipped.push(SkippedDocument {
                path,
                reason: error.to_string(),
            }),
        }
    }

    LoadReport { documents, skipped }
}

pub fn load_document(path: &Path) -> Result<SourceDocument, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(SourceDocument::new(name, extract_document_text(path)?))
}

#[cfg(test)]
mod tests {
    use super::{discover_documents, load_documents};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_documents_is_recursive_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(nested.join("b.txt"), "plain")?;
        fs::write(nested.join("c.png"), [0u8, 1, 2])?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn load_keeps_order_and_names() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("doc1.txt");
        let second = dir.path().join("doc2.md");
        fs::write(&first, "The quick brown fox jumps.")?;
        fs::write(&second, "# Notes")?;

        let report = load_documents(&[second.clone(), first.clone()]);

        assert!(report.skipped.is_empty());
        let names: Vec<_> = report
            .documents
            .iter()
            .map(|document| document.source_name.as_str())
            .collect();
        assert_eq!(names, vec!["doc2.md", "doc1.txt"]);
        Ok(())
    }

    #[test]
    fn unreadable_and_unsupported_files_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        let unsupported = dir.path().join("image.png");
        fs::write(&unsupported, [0u8])?;

        let report = load_documents(&[dir.path().to_path_buf(), unsupported]);

        assert_eq!(report.documents.len(), 0);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(
            report.skipped[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }

    #[test]
    fn empty_text_documents_are_kept() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "")?;

        let report = load_documents(&[empty]);
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].text.is_empty());
        Ok(())
    }
}
