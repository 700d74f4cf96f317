use crate::traits::{check_embedding_batch, VectorIndex};
use crate::{AssistantError, RetrievedChunk, TextChunk};
use async_trait::async_trait;
use tokio::sync::RwLock;

const EPSILON: f32 = 1e-10;

struct IndexedChunk {
    chunk: TextChunk,
    vector: Vec<f32>,
    norm: f32,
}

/// Exact cosine search over every stored vector. Lives only as long as the process.
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        check_embedding_batch(chunks, embeddings, self.dimensions)?;

        let mut entries = self.entries.write().await;
        entries.extend(indexed(chunks, embeddings));
        Ok(())
    }

    async fn replace_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        check_embedding_batch(chunks, embeddings, self.dimensions)?;

        let fresh = indexed(chunks, embeddings).collect::<Vec<_>>();
        *self.entries.write().await = fresh;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AssistantError> {
        if query_vector.len() != self.dimensions {
            return Err(AssistantError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(query_vector);
        let entries = self.entries.read().await;
        let mut scored = entries
            .iter()
            .map(|entry| {
                let score = cosine(query_vector, query_norm, &entry.vector, entry.norm);
                (entry, score)
            })
            .collect::<Vec<_>>();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(entry, score)| RetrievedChunk::from_chunk(&entry.chunk, score))
            .collect())
    }

    async fn clear(&self) -> Result<(), AssistantError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn chunk_count(&self) -> Result<usize, AssistantError> {
        Ok(self.entries.read().await.len())
    }
}

fn indexed<'a>(
    chunks: &'a [TextChunk],
    embeddings: &'a [Vec<f32>],
) -> impl Iterator<Item = IndexedChunk> + 'a {
    chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, vector)| IndexedChunk {
            chunk: chunk.clone(),
            norm: norm(vector),
            vector: vector.clone(),
        })
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a < EPSILON || norm_b < EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
