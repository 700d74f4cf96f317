use crate::http::{ensure_success, join_endpoint};
use crate::traits::{check_embedding_batch, VectorIndex};
use crate::{AssistantError, RetrievedChunk, TextChunk};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_QDRANT_COLLECTION: &str = "pdf_pal_chunks";
pub const DEFAULT_QDRANT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, AssistantError> {
        Self::with_timeout(endpoint, collection, vector_size, DEFAULT_QDRANT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, AssistantError> {
        Ok(Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            vector_size,
        })
    }

    fn collection_path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("collections/{}", self.collection)
        } else {
            format!("collections/{}/{}", self.collection, suffix)
        }
    }

    async fn upsert_points(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                json!({
                    "id": chunk.chunk_index,
                    "vector": embedding,
                    "payload": {
                        "chunk_id": chunk.chunk_id,
                        "document_id": chunk.document_id,
                        "source_name": chunk.source_name,
                        "chunk_index": chunk.chunk_index,
                        "text": chunk.text,
                    },
                })
            })
            .collect::<Vec<_>>();

        let mut url = join_endpoint(&self.endpoint, &self.collection_path("points"))?;
        url.set_query(Some("wait=true"));

        let response = self
            .client
            .put(url)
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response, "qdrant").await?;
        Ok(())
    }

    async fn prune_from_index(&self, first_stale: u64) -> Result<(), AssistantError> {
        let mut url = join_endpoint(&self.endpoint, &self.collection_path("points/delete"))?;
        url.set_query(Some("wait=true"));

        let response = self
            .client
            .post(url)
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "chunk_index", "range": { "gte": first_stale } }
                    ]
                }
            }))
            .send()
            .await?;
        ensure_success(response, "qdrant").await?;

        debug!(collection = %self.collection, first_stale, "pruned stale qdrant points");
        Ok(())
    }

    /// Creates the collection with cosine distance unless it already exists.
    pub async fn ensure_collection(&self) -> Result<(), AssistantError> {
        let url = join_endpoint(&self.endpoint, &self.collection_path(""))?;
        let response = self.client.get(url.clone()).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(AssistantError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(url)
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;
        ensure_success(response, "qdrant").await?;

        info!(collection = %self.collection, size = self.vector_size, "created qdrant collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        check_embedding_batch(chunks, embeddings, self.vector_size)?;
        if chunks.is_empty() {
            return Ok(());
        }

        self.ensure_collection().await?;
        self.upsert_points(chunks, embeddings).await
    }

    /// Upserts first and prunes leftovers after, so a failed upsert leaves the old points in place.
    async fn replace_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), AssistantError> {
        check_embedding_batch(chunks, embeddings, self.vector_size)?;
        if chunks.is_empty() {
            return self.clear().await;
        }

        self.ensure_collection().await?;
        self.upsert_points(chunks, embeddings).await?;

        let first_stale = chunks
            .iter()
            .map(|chunk| chunk.chunk_index)
            .max()
            .map_or(0, |last| last.saturating_add(1));
        self.prune_from_index(first_stale).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AssistantError> {
        if query_vector.len() != self.vector_size {
            return Err(AssistantError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(join_endpoint(
                &self.endpoint,
                &self.collection_path("points/search"),
            )?)
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        let parsed: Value = ensure_success(response, "qdrant").await?.json().await?;
        Ok(hits_from_response(&parsed))
    }

    async fn clear(&self) -> Result<(), AssistantError> {
        let response = self
            .client
            .delete(join_endpoint(&self.endpoint, &self.collection_path(""))?)
            .send()
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            ensure_success(response, "qdrant").await?;
        }
        Ok(())
    }

    async fn chunk_count(&self) -> Result<usize, AssistantError> {
        let response = self
            .client
            .post(join_endpoint(
                &self.endpoint,
                &self.collection_path("points/count"),
            )?)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let parsed: Value = ensure_success(response, "qdrant").await?.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| AssistantError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response had no result.count".to_string(),
            })
    }
}

fn hits_from_response(parsed: &Value) -> Vec<RetrievedChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let text_at = |hit: &Value, pointer: &str| {
        hit.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    hits.iter()
        .map(|hit| RetrievedChunk {
            chunk_id: text_at(hit, "/payload/chunk_id"),
            document_id: text_at(hit, "/payload/document_id"),
            source_name: text_at(hit, "/payload/source_name"),
            text: text_at(hit, "/payload/text"),
            score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        })
        .collect()
}
