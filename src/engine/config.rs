// Auraluxe Engine — Configuration
//
// `EngineConfig` is read from `<config dir>/auraluxe/config.toml` (missing file
// means defaults). API keys and the database path can be supplied through
// the environment so they never need to live in the file:
//
//   OPENAI_API_KEY  → provider `openai` + embedding endpoint
//   GEMINI_API_KEY  → provider `gemini`
//   GROQ_API_KEY    → provider `groq`
//   AURALUXE_DB     → SQLite database path

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::engine::cascade::{CascadeSlot, InferenceCascade};
use crate::engine::providers::AnyProvider;
use crate::engine::scoring::ScoringWeights;
use crate::engine::types::{ProviderConfig, ProviderKind};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Sections ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        EmbeddingSettings {
            base_url: ProviderKind::OpenAI.default_base_url().to_string(),
            api_key: String::new(),
            model: EMBEDDING_MODEL.to_string(),
            timeout_secs: EMBEDDING_TIMEOUT_SECS,
            dimensions: EMBEDDING_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeSettings {
    pub rate_limit_wait_ms: u64,
    /// Retries each provider makes on its own before the cascade moves on.
    pub provider_retries: u32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        CascadeSettings { rate_limit_wait_ms: RATE_LIMIT_WAIT_MS, provider_retries: CASCADE_PROVIDER_RETRIES }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Pause between consecutive items.
    pub item_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings { item_delay_ms: BATCH_ITEM_DELAY_MS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub history_window: usize,
    pub stored_turns: usize,
    pub warn_after_secs: u64,
    pub grace_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
    pub product_context: usize,
    pub max_rounds: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            history_window: AGENT_HISTORY_WINDOW,
            stored_turns: AGENT_STORED_TURNS,
            warn_after_secs: AGENT_WARN_AFTER_SECS,
            grace_secs: AGENT_GRACE_SECS,
            max_tokens: AGENT_MAX_TOKENS,
            temperature: AGENT_TEMPERATURE,
            product_context: AGENT_PRODUCT_CONTEXT,
            max_rounds: AGENT_MAX_ROUNDS,
        }
    }
}

impl AgentSettings {
    pub fn warn_after(&self) -> Duration {
        Duration::from_secs(self.warn_after_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

// ── Root ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cascade order: first entry is tried first.
    pub providers: Vec<ProviderConfig>,
    pub embedding: EmbeddingSettings,
    pub cascade: CascadeSettings,
    pub batch: BatchSettings,
    pub agent: AgentSettings,
    pub scoring: ScoringWeights,
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            providers: default_providers(),
            embedding: EmbeddingSettings::default(),
            cascade: CascadeSettings::default(),
            batch: BatchSettings::default(),
            agent: AgentSettings::default(),
            scoring: ScoringWeights::default(),
            database_path: None,
        }
    }
}

/// Gemini → Groq → OpenAI.
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "gemini".into(),
            kind: ProviderKind::Google,
            api_key: String::new(),
            base_url: None,
            default_model: Some(GEMINI_CHAT_MODEL.into()),
            vision_model: Some(GEMINI_VISION_MODEL.into()),
        },
        ProviderConfig {
            id: "groq".into(),
            kind: ProviderKind::Groq,
            api_key: String::new(),
            base_url: None,
            default_model: Some(GROQ_CHAT_MODEL.into()),
            vision_model: Some(GROQ_VISION_MODEL.into()),
        },
        ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::OpenAI,
            api_key: String::new(),
            base_url: None,
            default_model: Some(OPENAI_MODEL.into()),
            vision_model: Some(OPENAI_MODEL.into()),
        },
    ]
}

impl EngineConfig {
    /// `<config dir>/auraluxe/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("auraluxe").join("config.toml")
    }

    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load from `path` (or the default path), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            info!("[config] Loading {:?}", path);
            Self::from_toml_str(&std::fs::read_to_string(&path)?)?
        } else {
            info!("[config] {:?} not found, using defaults", path);
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// `load`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in &mut self.providers {
            let var = match provider.kind {
                ProviderKind::Google => "GEMINI_API_KEY",
                ProviderKind::Groq => "GROQ_API_KEY",
                ProviderKind::OpenAI => "OPENAI_API_KEY",
                ProviderKind::Custom => continue,
            };
            if let Some(key) = lookup(var) {
                provider.api_key = key;
            }
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            if self.embedding.api_key.is_empty() {
                self.embedding.api_key = key;
            }
        }
        if let Some(db) = lookup("AURALUXE_DB") {
            self.database_path = Some(PathBuf::from(db));
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("auraluxe").join("auraluxe.db")
        })
    }

    /// Cascade over every provider that has a key (Custom providers may run
    /// keyless against a local endpoint).
    pub fn build_cascade(&self) -> InferenceCascade {
        let slots = self
            .providers
            .iter()
            .filter(|p| {
                let usable = !p.api_key.is_empty() || p.kind == ProviderKind::Custom;
                if !usable {
                    warn!("[config] Provider '{}' has no API key, leaving it out of the cascade", p.id);
                }
                usable
            })
            .map(|p| {
                let chat = p.default_model.clone().unwrap_or_default();
                let vision = p.vision_model.clone().unwrap_or_else(|| chat.clone());
                CascadeSlot::new(AnyProvider::from_config(p, self.cascade.provider_retries), chat, vision)
            })
            .collect();
        InferenceCascade::new(slots).with_rate_limit_wait(Duration::from_millis(self.cascade.rate_limit_wait_ms))
    }
}
