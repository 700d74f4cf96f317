use crate::{AssistantError, RetrievedChunk, TextChunk};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError>;

    /// Best match first.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AssistantError>;

    /// Swaps the whole contents for `chunks`. On error the previous contents stay searchable.
    async fn replace_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError>;

    async fn clear(&self) -> Result<(), AssistantError>;

    async fn chunk_count(&self) -> Result<usize, AssistantError>;
}

#[async_trait]
impl<T: VectorIndex + Send + Sync + ?Sized> VectorIndex for Box<T> {
    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        (**self).index_chunks(chunks, embeddings).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AssistantError> {
        (**self).search(query_vector, top_k).await
    }

    async fn replace_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        (**self).replace_chunks(chunks, embeddings).await
    }

    async fn clear(&self) -> Result<(), AssistantError> {
        (**self).clear().await
    }

    async fn chunk_count(&self) -> Result<usize, AssistantError> {
        (**self).chunk_count().await
    }
}

/// A hosted chat model that turns one rendered prompt into one answer.
#[async_trait]
pub trait ChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[async_trait]
impl<T: ChatModel + Send + Sync + ?Sized> ChatModel for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        (**self).complete(prompt).await
    }
}

pub(crate) fn check_embedding_batch(
    chunks: &[TextChunk],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<(), AssistantError> {
    if chunks.len() != embeddings.len() {
        return Err(AssistantError::Request(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }

    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
        return Err(AssistantError::Request(format!(
            "embedding dimension {} != {}",
            bad.len(),
            dimensions
        )));
    }

    Ok(())
}
