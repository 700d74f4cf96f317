use crate::chunking::{build_chunks, ChunkingConfig, RecursiveSplitter};
use crate::conversation::{render_history, ChatTurn, SessionStore, DEFAULT_MEMORY_WINDOW};
use crate::embeddings::Embedder;
use crate::extractor::LopdfExtractor;
use crate::ingest::{digest_bytes, extract_documents_best_effort, PdfUpload, SkippedPdf};
use crate::llm::strip_delimiters;
use crate::prompt::{format_context, PromptTemplate};
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::traits::{ChatModel, VectorIndex};
use crate::{
    Answer, AssistantError, DocumentFingerprint, ExtractedDocument, IngestError,
    IngestionSummary,
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AssistantOptions {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub memory_window: usize,
    pub template: PromptTemplate,
}

impl Default for AssistantOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            memory_window: DEFAULT_MEMORY_WINDOW,
            template: PromptTemplate::default(),
        }
    }
}

/// Retrieval-augmented question answering over uploaded PDFs, with per-session memory.
pub struct PdfAssistant<E, V, L>
where
    E: Embedder,
    V: VectorIndex,
    L: ChatModel,
{
    embedder: E,
    index: V,
    model: L,
    splitter: RecursiveSplitter,
    top_k: usize,
    template: PromptTemplate,
    sessions: SessionStore,
}

impl<E, V, L> PdfAssistant<E, V, L>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
    L: ChatModel + Send + Sync,
{
    pub fn new(
        embedder: E,
        index: V,
        model: L,
        options: AssistantOptions,
    ) -> Result<Self, AssistantError> {
        Ok(Self {
            embedder,
            index,
            model,
            splitter: RecursiveSplitter::new(options.chunking)?,
            top_k: options.top_k,
            template: options.template,
            sessions: SessionStore::new(options.memory_window),
        })
    }

    /// Extracts, chunks and embeds a batch of uploads, replacing whatever was indexed before.
    pub async fn ingest(&self, uploads: Vec<PdfUpload>) -> Result<IngestionSummary, AssistantError> {
        let report = tokio::task::spawn_blocking(move || {
            extract_documents_best_effort(&uploads, &LopdfExtractor)
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))??;

        self.index_documents(report.documents, report.skipped_files)
            .await
    }

    /// Same as [`ingest`](Self::ingest) for text that is already extracted, as `(name, text)` pairs.
    pub async fn index_texts(
        &self,
        texts: &[(String, String)],
    ) -> Result<IngestionSummary, AssistantError> {
        let documents = texts
            .iter()
            .map(|(name, text)| {
                let checksum = digest_bytes(text.as_bytes());
                ExtractedDocument {
                    fingerprint: DocumentFingerprint {
                        document_id: checksum.clone(),
                        document_title: name.clone(),
                        page_count: 1,
                        checksum,
                        ingested_at: Utc::now(),
                    },
                    text: text.clone(),
                }
            })
            .collect();

        self.index_documents(documents, Vec::new()).await
    }

    async fn index_documents(
        &self,
        documents: Vec<ExtractedDocument>,
        skipped_files: Vec<SkippedPdf>,
    ) -> Result<IngestionSummary, AssistantError> {
        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for document in &documents {
            let (document_chunks, next) =
                build_chunks(&document.fingerprint, &document.text, &self.splitter, cursor);
            cursor = next;
            chunks.extend(document_chunks);
        }

        if chunks.is_empty() {
            return Err(IngestError::NoText {
                skipped: skipped_files.len(),
            }
            .into());
        }

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        self.index.replace_chunks(&chunks, &embeddings).await?;

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            skipped = skipped_files.len(),
            "knowledge base rebuilt"
        );

        Ok(IngestionSummary {
            documents: documents
                .into_iter()
                .map(|document| document.fingerprint)
                .collect(),
            chunk_count: chunks.len(),
            skipped_files,
        })
    }

    pub async fn is_ready(&self) -> Result<bool, AssistantError> {
        Ok(self.index.chunk_count().await? > 0)
    }

    pub async fn new_session(&self) -> Uuid {
        self.sessions.create_session().await
    }

    pub async fn history(&self, session: Uuid) -> Vec<ChatTurn> {
        self.sessions.history(session).await
    }

    pub async fn reset_session(&self, session: Uuid) {
        self.sessions.clear(session).await;
    }

    pub async fn ask(&self, session: Uuid, question: &str) -> Result<Answer, AssistantError> {
        let result = self.answer(session, question).await;
        if let Err(error) = &result {
            error!(%session, %error, "failed to answer question");
        }
        result
    }

    async fn answer(&self, session: Uuid, question: &str) -> Result<Answer, AssistantError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::Request("question is empty".to_string()));
        }
        if !self.is_ready().await? {
            return Err(AssistantError::NotReady(
                "upload and process a PDF first".to_string(),
            ));
        }

        info!(%session, question, "answering question");
        let sources = Retriever::new(&self.embedder, &self.index)
            .retrieve(question, self.top_k)
            .await?;

        let history = render_history(&self.sessions.history(session).await);
        let prompt = self
            .template
            .render(&history, &format_context(&sources), question);

        let raw = self.model.complete(&prompt).await?;
        let text = strip_delimiters(&raw);
        self.sessions.record_exchange(session, question, &text).await;

        Ok(Answer { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures;
    use crate::{CharacterNgramEmbedder, InMemoryVectorIndex};
    use crate::{RetrievedChunk, TextChunk, VectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ScriptedModel {
        reply: Option<String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompt log").clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
            self.prompts.lock().expect("prompt log").push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| AssistantError::BackendResponse {
                    backend: "chat".to_string(),
                    details: "503 Service Unavailable".to_string(),
                })
        }
    }

    fn assistant(
        model: ScriptedModel,
    ) -> PdfAssistant<CharacterNgramEmbedder, InMemoryVectorIndex, ScriptedModel> {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryVectorIndex::new(embedder.dimensions());
        PdfAssistant::new(embedder, index, model, AssistantOptions::default())
            .expect("default options are valid")
    }

    fn manual_texts() -> Vec<(String, String)> {
        vec![(
            "manual.pdf".to_string(),
            "The hydraulic pump seal must be replaced every 500 operating hours.".to_string(),
        )]
    }

    #[tokio::test]
    async fn asking_before_ingest_is_not_ready() {
        let model = ScriptedModel::replying("unused");
        let assistant = assistant(model.clone());
        let session = assistant.new_session().await;

        let result = assistant.ask(session, "What is in the file?").await;
        assert!(matches!(result, Err(AssistantError::NotReady(_))));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let model = ScriptedModel::replying("unused");
        let assistant = assistant(model.clone());
        assistant.index_texts(&manual_texts()).await.expect("indexing works");

        let result = assistant.ask(Uuid::new_v4(), "   ").await;
        assert!(matches!(result, Err(AssistantError::Request(_))));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn answer_uses_context_and_records_history() {
        let model = ScriptedModel::replying("<|im_start|>thought\nhmm<|im_end|>Every 500 hours.");
        let assistant = assistant(model.clone());
        assistant.index_texts(&manual_texts()).await.expect("indexing works");
        let session = assistant.new_session().await;

        let answer = assistant
            .ask(session, "How often is the pump seal replaced?")
            .await
            .expect("answer");
        assert_eq!(answer.text, "Every 500 hours.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_name, "manual.pdf");

        let prompts = model.prompts();
        assert!(prompts[0].contains("replaced every 500 operating hours"));
        assert!(prompts[0].contains("Question:\nHow often is the pump seal replaced?"));

        assistant.ask(session, "And the filter?").await.expect("answer");
        let prompts = model.prompts();
        assert!(prompts[1].contains("User: How often is the pump seal replaced?"));
        assert!(prompts[1].contains("AI: Every 500 hours."));
        assert_eq!(assistant.history(session).await.len(), 4);
    }

    #[tokio::test]
    async fn sessions_do_not_share_memory() {
        let model = ScriptedModel::replying("ok");
        let assistant = assistant(model.clone());
        assistant.index_texts(&manual_texts()).await.expect("indexing works");

        let first = assistant.new_session().await;
        let second = assistant.new_session().await;
        assistant.ask(first, "secret question one").await.expect("answer");
        assistant.ask(second, "question two").await.expect("answer");

        let prompts = model.prompts();
        assert!(!prompts[1].contains("secret question one"));

        assistant.reset_session(first).await;
        assert!(assistant.history(first).await.is_empty());
        assert_eq!(assistant.history(second).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_completion_is_not_recorded() {
        let model = ScriptedModel::failing();
        let assistant = assistant(model.clone());
        assistant.index_texts(&manual_texts()).await.expect("indexing works");
        let session = assistant.new_session().await;

        let result = assistant.ask(session, "Anything?").await;
        assert!(matches!(result, Err(AssistantError::BackendResponse { .. })));
        assert!(assistant.history(session).await.is_empty());
    }

    #[tokio::test]
    async fn ingesting_pdfs_replaces_previous_knowledge() {
        let assistant = assistant(ScriptedModel::replying("ok"));
        assistant.index_texts(&manual_texts()).await.expect("indexing works");

        let summary = assistant
            .ingest(vec![
                PdfUpload::new("broken.pdf", b"%PDF-1.4\n%broken".to_vec()),
                PdfUpload::new("guide.pdf", fixtures::text_pdf(&["Filter change interval"])),
            ])
            .await
            .expect("ingest works");

        assert_eq!(summary.documents.len(), 1);
        assert_eq!(summary.documents[0].document_title, "guide.pdf");
        assert_eq!(summary.skipped_files.len(), 1);
        assert_eq!(summary.chunk_count, 1);

        let answer = assistant
            .ask(Uuid::new_v4(), "filter interval?")
            .await
            .expect("answer");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_name, "guide.pdf");
    }

    #[tokio::test]
    async fn batch_without_text_keeps_previous_index() {
        let assistant = assistant(ScriptedModel::replying("ok"));
        assistant.index_texts(&manual_texts()).await.expect("indexing works");

        let result = assistant
            .ingest(vec![PdfUpload::new("scan.pdf", b"not a pdf".to_vec())])
            .await;

        assert!(matches!(
            result,
            Err(AssistantError::Ingest(IngestError::NoText { skipped: 1 }))
        ));
        assert!(assistant.is_ready().await.expect("ready check"));
    }

    /// In-memory index whose rebuilds can be made to fail like an unreachable store.
    struct FlakyIndex {
        inner: InMemoryVectorIndex,
        reject_rebuilds: AtomicBool,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn index_chunks(
            &self,
            chunks: &[TextChunk],
            embeddings: &[Vec<f32>],
        ) -> Result<(), AssistantError> {
            self.inner.index_chunks(chunks, embeddings).await
        }

        async fn replace_chunks(
            &self,
            chunks: &[TextChunk],
            embeddings: &[Vec<f32>],
        ) -> Result<(), AssistantError> {
            if self.reject_rebuilds.load(Ordering::SeqCst) {
                return Err(AssistantError::BackendResponse {
                    backend: "qdrant".to_string(),
                    details: "500 Internal Server Error".to_string(),
                });
            }
            self.inner.replace_chunks(chunks, embeddings).await
        }

        async fn search(
            &self,
            query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<RetrievedChunk>, AssistantError> {
            self.inner.search(query_vector, top_k).await
        }

        async fn clear(&self) -> Result<(), AssistantError> {
            self.inner.clear().await
        }

        async fn chunk_count(&self) -> Result<usize, AssistantError> {
            self.inner.chunk_count().await
        }
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_knowledge() {
        let embedder = CharacterNgramEmbedder::default();
        let index = FlakyIndex {
            inner: InMemoryVectorIndex::new(embedder.dimensions()),
            reject_rebuilds: AtomicBool::new(false),
        };
        let assistant = PdfAssistant::new(
            embedder,
            index,
            ScriptedModel::replying("ok"),
            AssistantOptions::default(),
        )
        .expect("default options are valid");
        assistant.index_texts(&manual_texts()).await.expect("indexing works");

        assistant.index.reject_rebuilds.store(true, Ordering::SeqCst);
        let result = assistant
            .index_texts(&[("other.pdf".to_string(), "Unrelated notes.".to_string())])
            .await;
        assert!(matches!(result, Err(AssistantError::BackendResponse { .. })));

        let answer = assistant
            .ask(Uuid::new_v4(), "pump seal?")
            .await
            .expect("old knowledge still answers");
        assert_eq!(answer.sources[0].source_name, "manual.pdf");
    }
}
