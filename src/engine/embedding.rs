// Auraluxe Engine — Embedding Client
//
// Calls an OpenAI-compatible `/embeddings` endpoint to turn text into a
// vector, describes images through the inference cascade before embedding
// them, and resolves nearest-neighbour matches back into catalog items.

use crate::atoms::constants::IMAGE_DESCRIPTION_MAX_TOKENS;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{CatalogStore, Embedder};
use crate::engine::cascade::{ChatOptions, InferenceCascade};
use crate::engine::config::EmbeddingSettings;
use crate::engine::http::classify_status;
use crate::engine::types::*;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DESCRIBE_PROMPT: &str =
    "Describe this image focusing on: colors, style, formality, materials, design elements. Be concise.";
const DEFAULT_DESCRIBE_HINT: &str = "Describe this image for jewelry matching";

/// Vector plus the description it was computed from.
#[derive(Debug, Clone)]
pub struct ImageEmbedding {
    pub embedding: Vec<f32>,
    pub description: String,
}

pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        EmbeddingClient {
            client: Client::new(),
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST /embeddings { model, input } → { data: [{ embedding: [f32...] }] }
    async fn embed_openai(&self, text: &str) -> EngineResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({ "model": self.model, "input": text }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::provider("embeddings", classify_status(status, &body, None).to_string()));
        }

        let v: Value = resp.json().await?;
        let vec: Vec<f32> = v["data"][0]["embedding"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect())
            .unwrap_or_default();
        if vec.is_empty() {
            return Err(EngineError::provider("embeddings", "response carried no embedding"));
        }
        Ok(vec)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.embed_openai(text).await
    }
}

// ── Image embeddings ───────────────────────────────────────────────────────

/// Describe the image through the cascade, then embed the description.
/// Two sequential network calls; either failure is returned to the caller.
pub async fn embed_image(
    cascade: &InferenceCascade,
    embedder: &dyn Embedder,
    image_url: &str,
    context_hint: Option<&str>,
) -> EngineResult<ImageEmbedding> {
    let hint = context_hint.filter(|h| !h.trim().is_empty()).unwrap_or(DEFAULT_DESCRIBE_HINT);
    let description = cascade
        .run_vision_completion(
            vec![Message::system(DESCRIBE_PROMPT), Message::user_with_image(hint, image_url)],
            ChatOptions { temperature: None, max_tokens: Some(IMAGE_DESCRIPTION_MAX_TOKENS) },
        )
        .await?;
    info!("[embedding] image described in {} chars", description.len());
    let embedding = embedder.embed(&description).await?;
    Ok(ImageEmbedding { embedding, description })
}

/// Nearest catalog items to `embedding`, most similar first. Search failures
/// yield an empty list.
pub async fn find_similar(
    catalog: &dyn CatalogStore,
    embedding: &[f32],
    limit: usize,
    min_similarity: f64,
) -> Vec<CatalogItem> {
    let matches = match catalog.match_by_style(embedding, min_similarity, limit).await {
        Ok(m) => m,
        Err(e) => {
            warn!("[embedding] similarity search failed: {}", e);
            return vec![];
        }
    };
    let ids: Vec<String> = matches.into_iter().map(|m| m.product_id).collect();
    catalog.items_by_ids(&ids).await.unwrap_or_else(|e| {
        warn!("[embedding] resolving similar items failed: {}", e);
        vec![]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn settings(base_url: String) -> EmbeddingSettings {
        EmbeddingSettings {
            base_url,
            api_key: "emb-key".into(),
            model: "text-embedding-3-small".into(),
            timeout_secs: 5,
            dimensions: 3,
        }
    }

    #[tokio::test]
    async fn parses_first_embedding() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer emb-key")
            .match_body(Matcher::PartialJson(json!({"model": "text-embedding-3-small", "input": "gold ring"})))
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#)
            .create_async()
            .await;

        let client = EmbeddingClient::new(&settings(server.url()));
        let v = client.embed("gold ring").await.unwrap();
        assert_eq!(v, vec![0.1f32, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("POST", "/embeddings").with_status(500).with_body("down").create_async().await;

        let client = EmbeddingClient::new(&settings(server.url()));
        let err = client.embed("x").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("POST", "/embeddings").with_status(200).with_body(r#"{"data":[]}"#).create_async().await;

        let client = EmbeddingClient::new(&settings(server.url()));
        assert!(client.embed("x").await.is_err());
    }
}
