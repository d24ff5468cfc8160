//! Embedding backend: `Embed(text) -> float64[dimension]`, deterministic for
//! a fixed model and returning a unit-norm vector. The HTTP implementation
//! here is a thin contract, not a reimplementation of any particular
//! embeddings API.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};

/// `Embed(text) -> Vec<f64>`. Implementations must be deterministic for a
/// fixed backend model and return a unit-norm vector so L3's cosine
/// similarity reduces to a plain dot product of comparable magnitude.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f64>>;
}

/// Calls an external embeddings HTTP endpoint expecting
/// `{"input": text}` -> `{"embedding": [f64, ...]}`.
pub struct HttpEmbeddingBackend {
    client: Client,
    endpoint_url: String,
}

impl HttpEmbeddingBackend {
    pub fn new(endpoint_url: String) -> Self {
        Self { client: Client::new(), endpoint_url }
    }
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f64>> {
        let response = self
            .client
            .post(&self.endpoint_url)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("embedding backend transport error: {e}"))?;

        if !response.status().is_success() {
            anyhow::bail!("embedding backend returned {}", response.status());
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| anyhow::anyhow!("embedding backend returned invalid JSON: {e}"))?;
        Ok(normalise(parsed.embedding))
    }
}

/// Deterministic hash-based embedding for tests: maps text to a fixed-size
/// vector via a seeded byte expansion of its SHA-256 digest, then
/// normalises to unit length. Never calls out to a network backend.
pub struct DeterministicEmbeddingBackend {
    dimension: usize,
}

impl DeterministicEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingBackend for DeterministicEmbeddingBackend {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f64>> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push((byte as f64) / 255.0 - 0.5);
            }
            counter += 1;
        }
        Ok(normalise(vector))
    }
}

fn normalise(vector: Vec<f64>) -> Vec<f64> {
    let norm: f64 = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_backend_is_stable_for_identical_text() {
        let backend = DeterministicEmbeddingBackend::new(16);
        let a = backend.embed("please list files").await.unwrap();
        let b = backend.embed("please list files").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn deterministic_backend_output_is_unit_norm() {
        let backend = DeterministicEmbeddingBackend::new(16);
        let v = backend.embed("hello").await.unwrap();
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn deterministic_backend_differs_for_different_text() {
        let backend = DeterministicEmbeddingBackend::new(16);
        let a = backend.embed("hello").await.unwrap();
        let b = backend.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }
}
