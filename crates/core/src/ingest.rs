use crate::extractor::{join_pages, PdfExtractor};
use crate::{DocumentFingerprint, ExtractedDocument, IngestError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// An uploaded PDF: display name plus raw bytes.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
        let bytes = fs::read(path)?;
        Ok(Self::new(name, bytes))
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Expands files and folders into uploads. Folders are searched recursively.
pub fn collect_uploads(paths: &[PathBuf]) -> Result<Vec<PdfUpload>, IngestError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_pdf_files(path));
        } else {
            files.push(path.clone());
        }
    }

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no pdf files found in the given paths".to_string(),
        ));
    }

    files.iter().map(|path| PdfUpload::from_path(path)).collect()
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    Ok(digest_bytes(&bytes))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPdf {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub documents: Vec<ExtractedDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Extracts every upload, skipping the ones that fail instead of aborting the batch.
pub fn extract_documents_best_effort<X: PdfExtractor + ?Sized>(
    uploads: &[PdfUpload],
    extractor: &X,
) -> Result<ExtractionReport, IngestError> {
    if uploads.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no pdf uploads to process".to_string(),
        ));
    }

    info!(count = uploads.len(), "starting text extraction");
    let mut report = ExtractionReport::default();

    for upload in uploads {
        match extract_document(upload, extractor) {
            Ok(document) => {
                debug!(
                    name = %upload.name,
                    pages = document.fingerprint.page_count,
                    chars = document.text.chars().count(),
                    "extracted pdf"
                );
                report.documents.push(document);
            }
            Err(error) => {
                warn!(name = %upload.name, %error, "skipping pdf");
                report.skipped_files.push(SkippedPdf {
                    name: upload.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        extracted = report.documents.len(),
        skipped = report.skipped_files.len(),
        "text extraction complete"
    );
    Ok(report)
}

fn extract_document<X: PdfExtractor + ?Sized>(
    upload: &PdfUpload,
    extractor: &X,
) -> Result<ExtractedDocument, IngestError> {
    let extracted = extractor.extract_pages(&upload.bytes)?;
    let checksum = digest_bytes(&upload.bytes);

    Ok(ExtractedDocument {
        fingerprint: DocumentFingerprint {
            document_id: checksum.clone(),
            document_title: upload.name.clone(),
            page_count: extracted.page_count,
            checksum,
            ingested_at: Utc::now(),
        },
        text: join_pages(&extracted.pages),
    })
}
