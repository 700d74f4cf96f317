pub mod assistant;
pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
mod http;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use assistant::{AssistantOptions, PdfAssistant};
pub use chunking::{build_chunks, ChunkingConfig, RecursiveSplitter};
pub use conversation::{render_history, ChatHistory, ChatRole, ChatTurn, SessionStore};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, HttpEmbedderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AssistantError, IngestError};
pub use extractor::{
    extract_page_texts, join_pages, LopdfExtractor, PageText, PdfExtractor, PdfPages,
};
pub use ingest::{
    collect_uploads, discover_pdf_files, extract_documents_best_effort, ExtractionReport,
    PdfUpload, SkippedPdf,
};
pub use llm::{strip_delimiters, ChatClient, ChatClientConfig};
pub use models::{
    Answer, DocumentFingerprint, ExtractedDocument, IngestionSummary, RetrievedChunk, TextChunk,
};
pub use prompt::{format_context, PromptTemplate};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::{ChatModel, VectorIndex};
