//! Upload batch classification
//!
//! Splits a batch of uploaded files into at most one PDF and an ordered
//! list of page images. Only the original file name is inspected; the bytes
//! are already on disk by the time a batch reaches this module.

use crate::edition::paths::to_storage_key;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// One file of a multipart batch, after the transport has persisted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Name the client sent; used for extension sniffing only
    pub original_name: String,
    /// Where the transport wrote the bytes
    pub raw_path: String,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, raw_path: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            raw_path: raw_path.into(),
        }
    }

    fn kind(&self) -> FileKind {
        let extension = Path::new(&self.original_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => FileKind::Pdf,
            Some(ext) if PAGE_EXTENSIONS.contains(&ext) => FileKind::Page,
            _ => FileKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Page,
    Other,
}

/// Whether a batch must carry a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfRequirement {
    /// Creating an edition
    Required,
    /// Updating an edition; the PDF is only replaced when one is sent
    Optional,
}

/// A classified batch, with every path already converted to a storage key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedUpload {
    pub pdf_key: Option<String>,
    pub page_keys: Vec<String>,
    /// Files with unsupported extensions; they are on disk but unreferenced
    pub ignored_keys: Vec<String>,
}

/// Classify an upload batch.
pub fn classify(files: &[UploadedFile], requirement: PdfRequirement) -> Result<ClassifiedUpload> {
    let mut pdfs = Vec::new();
    let mut classified = ClassifiedUpload::default();

    for file in files {
        let key = to_storage_key(&file.raw_path);
        match file.kind() {
            FileKind::Pdf => pdfs.push(key),
            FileKind::Page => classified.page_keys.push(key),
            FileKind::Other => {
                tracing::debug!(name = %file.original_name, "Ignoring upload with unsupported extension");
                classified.ignored_keys.push(key);
            }
        }
    }

    if pdfs.len() > 1 {
        return Err(AppError::TooManyPdfs { count: pdfs.len() });
    }

    classified.pdf_key = pdfs.pop();

    if classified.pdf_key.is_none() && requirement == PdfRequirement::Required {
        return Err(AppError::MissingPdf);
    }

    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn file(name: &str) -> UploadedFile {
        UploadedFile::new(name, format!("/srv/app/uploads/files_{name}"))
    }

    #[test]
    fn test_pdf_and_pages_in_order() {
        let files = [file("p3.png"), file("issue.pdf"), file("p1.jpg"), file("p2.webp")];
        let classified = assert_ok!(classify(&files, PdfRequirement::Required));

        assert_eq!(classified.pdf_key.as_deref(), Some("uploads/files_issue.pdf"));
        assert_eq!(
            classified.page_keys,
            vec![
                "uploads/files_p3.png",
                "uploads/files_p1.jpg",
                "uploads/files_p2.webp",
            ]
        );
        assert!(classified.ignored_keys.is_empty());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let files = [file("ISSUE.PDF"), file("Cover.JPEG")];
        let classified = assert_ok!(classify(&files, PdfRequirement::Required));
        assert!(classified.pdf_key.is_some());
        assert_eq!(classified.page_keys.len(), 1);
    }

    #[test]
    fn test_unsupported_files_are_dropped() {
        let files = [file("issue.pdf"), file("notes.txt"), file("clip.mp4"), file("noext")];
        let classified = assert_ok!(classify(&files, PdfRequirement::Required));
        assert!(classified.page_keys.is_empty());
        assert_eq!(classified.ignored_keys.len(), 3);
    }

    #[test]
    fn test_two_pdfs_rejected() {
        let files = [file("a.pdf"), file("b.pdf")];
        let err = assert_err!(classify(&files, PdfRequirement::Optional));
        assert!(matches!(err, AppError::TooManyPdfs { count: 2 }));
    }

    #[test]
    fn test_missing_pdf_only_when_required() {
        let files = [file("page.png")];
        let err = assert_err!(classify(&files, PdfRequirement::Required));
        assert!(matches!(err, AppError::MissingPdf));

        let classified = assert_ok!(classify(&files, PdfRequirement::Optional));
        assert!(classified.pdf_key.is_none());
        assert_eq!(classified.page_keys.len(), 1);
    }

    #[test]
    fn test_duplicate_pages_are_preserved() {
        let page = UploadedFile::new("p.png", "uploads/p.png");
        let files = [file("a.pdf"), page.clone(), page];
        let classified = assert_ok!(classify(&files, PdfRequirement::Required));
        assert_eq!(classified.page_keys, vec!["uploads/p.png", "uploads/p.png"]);
    }
}
