use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{AssistantError, RetrievedChunk};
use tracing::debug;

/// Similarity-search default used when no `top_k` is configured.
pub const DEFAULT_TOP_K: usize = 4;

pub struct Retriever<'a, E: ?Sized, V: ?Sized> {
    embedder: &'a E,
    index: &'a V,
}

impl<'a, E, V> Retriever<'a, E, V>
where
    E: Embedder + Sync + ?Sized,
    V: VectorIndex + Sync + ?Sized,
{
    pub fn new(embedder: &'a E, index: &'a V) -> Self {
        Self { embedder, index }
    }

    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AssistantError> {
        let query_vector = self.embedder.embed_query(question).await?;
        let hits = self.index.search(&query_vector, top_k).await?;
        debug!(top_k, hits = hits.len(), "retrieved context chunks");
        Ok(hits)
    }
}
