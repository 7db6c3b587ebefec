// Auraluxe Engine — Recommendation and AI orchestration runtime
// Instant scoring, image embeddings, a multi-provider inference cascade,
// the batch analysis pipeline and the tool-calling shopping assistant.

pub mod types;
pub mod config;
pub mod http;
pub mod providers;
pub mod cascade;
pub mod embedding;
pub mod scoring;
pub mod behavior;
pub mod recommend;
pub mod stylist;
pub mod events;
pub mod batch;
pub mod state;
pub mod page;
pub mod tools;
pub mod tool_executor;
pub mod agent_loop;
pub mod sessions;

#[cfg(test)]
pub(crate) mod test_support;
