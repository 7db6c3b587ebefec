// ── Auraluxe Atoms: Constants ──────────────────────────────────────────────
// All named policy constants for the crate live here. They are the defaults
// behind `EngineConfig`; every value can be overridden from config.toml.

// ── Instant recommendation scoring ────────────────────────────────────────
pub const SCORE_CATEGORY_MATCH: f64 = 50.0;
pub const SCORE_MATERIAL_MATCH: f64 = 30.0;
pub const SCORE_FAVORITE: f64 = 20.0;
pub const SCORE_IN_CART: f64 = 10.0;
/// Maximum price-proximity bonus; decays linearly to zero at |Δ| = mean price.
pub const SCORE_PRICE_BAND: f64 = 20.0;
pub const SCORE_ALREADY_VIEWED: f64 = -100.0;
pub const INSTANT_RECOMMENDATION_LIMIT: usize = 14;

// ── AI recommendations ─────────────────────────────────────────────────────
pub const AI_RECOMMENDATION_COUNT: usize = 7;
pub const ANALYSIS_FALLBACK_COUNT: usize = 6;

// ── Inference cascade ──────────────────────────────────────────────────────
/// Pause before moving to the next provider after a rate-limit failure.
pub const RATE_LIMIT_WAIT_MS: u64 = 2_000;
/// In-provider retries for a cascade member; failures move straight on to
/// the next provider.
pub const CASCADE_PROVIDER_RETRIES: u32 = 0;
pub const VISION_MAX_TOKENS: u32 = 500;

// ── Embeddings ─────────────────────────────────────────────────────────────
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const EMBEDDING_TIMEOUT_SECS: u64 = 15;
pub const EMBEDDING_DIMENSIONS: usize = 1536;
/// Amplitude of the synthetic fallback embedding.
pub const FALLBACK_EMBEDDING_SCALE: f64 = 0.1;
pub const SIMILAR_PRODUCTS_THRESHOLD: f64 = 0.7;
pub const STYLE_MATCH_THRESHOLD: f64 = 0.6;
pub const STYLE_MATCH_LIMIT: usize = 20;
pub const SIMILAR_BEHAVIOR_THRESHOLD: f64 = 0.7;
pub const IMAGE_DESCRIPTION_MAX_TOKENS: u32 = 150;

// ── Batch pipeline ─────────────────────────────────────────────────────────
pub const BATCH_ITEM_DELAY_MS: u64 = 1_000;

// ── Conversational agent ───────────────────────────────────────────────────
/// Sliding prompt window (most recent turns sent to the model).
pub const AGENT_HISTORY_WINDOW: usize = 25;
/// Turns retained by the conversation store.
pub const AGENT_STORED_TURNS: usize = 50;
pub const AGENT_WARN_AFTER_SECS: u64 = 180;
pub const AGENT_GRACE_SECS: u64 = 120;
pub const AGENT_MAX_TOKENS: u32 = 300;
pub const AGENT_TEMPERATURE: f64 = 0.3;
pub const AGENT_PRODUCT_CONTEXT: usize = 20;
/// Hard cap on consecutive auto-approved tool rounds within one user turn.
pub const AGENT_MAX_ROUNDS: u32 = 12;
pub const AGENT_RECENT_FUNCTION_TURNS: usize = 3;
pub const SEARCH_RESULT_LIMIT: usize = 5;
pub const DEFAULT_COUNTRY: &str = "United States";

// ── Stylist ────────────────────────────────────────────────────────────────
pub const STYLIST_PRODUCT_LIST: usize = 30;
pub const STYLIST_CHAT_PRODUCTS: usize = 50;
pub const STYLIST_CHAT_HISTORY: usize = 10;

// ── Catalog ────────────────────────────────────────────────────────────────
pub const CATALOG_CONTEXT_LIMIT: usize = 50;

// ── Default cascade models ─────────────────────────────────────────────────
pub const GEMINI_VISION_MODEL: &str = "gemini-1.5-flash-latest";
pub const GEMINI_CHAT_MODEL: &str = "gemini-1.5-flash";
pub const GROQ_VISION_MODEL: &str = "llama-3.2-90b-vision-preview";
pub const GROQ_CHAT_MODEL: &str = "llama-3.3-70b-versatile";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
