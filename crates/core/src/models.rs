use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub page_count: u32,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// Plain text of one uploaded PDF, pages joined in order.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub fingerprint: DocumentFingerprint,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub text: String,
    pub score: f32,
}

impl RetrievedChunk {
    pub fn from_chunk(chunk: &TextChunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            source_name: chunk.source_name.clone(),
            text: chunk.text.clone(),
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub documents: Vec<DocumentFingerprint>,
    pub chunk_count: usize,
    pub skipped_files: Vec<crate::ingest::SkippedPdf>,
}
