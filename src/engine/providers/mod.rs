// Auraluxe Engine — AI Provider Registry
// AnyProvider wraps Box<dyn AiProvider> so adding a new provider
// never requires modifying the cascade; implementing the trait is enough.

pub mod google;
pub mod openai;

pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use crate::atoms::traits::{AiProvider, ProviderError};
use crate::engine::types::{Completion, CompletionRequest, ProviderConfig, ProviderKind};
use async_trait::async_trait;

// ── Provider factory ───────────────────────────────────────────────────────────

/// Type-erased AI provider. The cascade holds these without knowing which
/// concrete backend is in use.
pub struct AnyProvider(Box<dyn AiProvider>);

impl AnyProvider {
    /// Construct the right concrete provider from a `ProviderConfig`.
    ///
    /// OpenAI-compatible backends (OpenAI, Groq, Custom) share one
    /// implementation; Gemini has its own wire format. `max_retries` bounds
    /// the provider's own retries on 5xx and transport errors.
    pub fn from_config(config: &ProviderConfig, max_retries: u32) -> Self {
        let provider: Box<dyn AiProvider> = match config.kind {
            ProviderKind::Google => Box::new(GoogleProvider::new(config).with_max_retries(max_retries)),
            ProviderKind::OpenAI | ProviderKind::Groq | ProviderKind::Custom => {
                Box::new(OpenAiProvider::new(config).with_max_retries(max_retries))
            }
        };
        AnyProvider(provider)
    }

    /// Wrap an already-built provider (scripted providers in tests, custom backends).
    pub fn new(provider: impl AiProvider + 'static) -> Self {
        AnyProvider(Box::new(provider))
    }
}

#[async_trait]
impl AiProvider for AnyProvider {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn kind(&self) -> ProviderKind {
        self.0.kind()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.0.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn config(kind: ProviderKind, id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            kind,
            api_key: "k".into(),
            base_url: None,
            default_model: None,
            vision_model: None,
        }
    }

    #[test]
    fn factory_picks_wire_format_by_kind() {
        assert_eq!(AnyProvider::from_config(&config(ProviderKind::Google, ""), 0).kind(), ProviderKind::Google);
        assert_eq!(AnyProvider::from_config(&config(ProviderKind::Groq, ""), 0).kind(), ProviderKind::Groq);
        assert_eq!(AnyProvider::from_config(&config(ProviderKind::OpenAI, "primary"), 0).name(), "primary");
        assert_eq!(AnyProvider::from_config(&config(ProviderKind::Google, ""), 0).name(), "gemini");
    }

    #[tokio::test]
    async fn server_error_surfaces_without_retrying() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let mut cfg = config(ProviderKind::Groq, "groq");
        cfg.base_url = Some(server.url());
        let provider = AnyProvider::from_config(&cfg, 0);
        let err = provider.complete(&CompletionRequest::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
        mock.assert_async().await;
    }
}
