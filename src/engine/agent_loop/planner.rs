// agent_loop/planner.rs — One planning step of the shopping assistant.
//
// Given the transcript, the page path and optionally the tool that was just
// executed, decide the next reply: a fixed checkout rule, a loop-breaker, or
// the model's answer with at most one proposed tool call.

use super::helpers::{self, *};
use super::prompt::system_prompt;
use crate::atoms::constants::{AGENT_RECENT_FUNCTION_TURNS, CATALOG_CONTEXT_LIMIT};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{CatalogStore, ShopperStore};
use crate::engine::cascade::{ChatOptions, InferenceCascade};
use crate::engine::config::AgentSettings;
use crate::engine::tools::registry;
use crate::engine::types::*;
use log::{error, info};
use serde_json::Value;
use std::sync::Arc;

/// A tool that ran since the last planning step, with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedTool {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

pub struct PlanRequest<'a> {
    pub turns: &'a [ChatTurn],
    pub user_id: Option<&'a str>,
    pub executed: Option<&'a ExecutedTool>,
    pub ops_mode: bool,
    pub current_path: &'a str,
}

pub struct Planner {
    cascade: Arc<InferenceCascade>,
    catalog: Arc<dyn CatalogStore>,
    shoppers: Arc<dyn ShopperStore>,
    settings: AgentSettings,
}

impl Planner {
    pub fn new(
        cascade: Arc<InferenceCascade>,
        catalog: Arc<dyn CatalogStore>,
        shoppers: Arc<dyn ShopperStore>,
        settings: AgentSettings,
    ) -> Self {
        Planner { cascade, catalog, shoppers, settings }
    }

    /// `plan`, with any failure turned into the generic apology.
    pub async fn respond(&self, request: &PlanRequest<'_>) -> AgentReply {
        match self.plan(request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("[agent] planning failed: {}", e);
                AgentReply::message(ERROR_MESSAGE)
            }
        }
    }

    pub async fn plan(&self, request: &PlanRequest<'_>) -> EngineResult<AgentReply> {
        let start = request.turns.len().saturating_sub(self.settings.history_window);
        let mut window: Vec<ChatTurn> = request.turns[start..].to_vec();

        if let Some(executed) = request.executed {
            window.push(ChatTurn::function(&executed.name, executed.arguments.clone(), &executed.result));
            if let Some(reply) = helpers::auto_proceed(request.current_path, executed) {
                info!("[agent] autofill succeeded, checking page state");
                return Ok(reply);
            }
            if let Some(reply) = helpers::checkout_ready(request.current_path, executed, &window) {
                info!("[agent] delivery and payment chosen, awaiting confirmation");
                return Ok(reply);
            }
        }

        let user = match request.user_id {
            Some(uid) => Some(self.shoppers.user_context(uid).await?),
            None => None,
        };
        let mut products = self.catalog.list_items(CATALOG_CONTEXT_LIMIT).await?;
        products.truncate(self.settings.product_context);

        let mut messages = vec![Message::system(system_prompt(
            user.as_ref(),
            &products,
            request.current_path,
            request.ops_mode,
            &window,
        ))];
        messages.extend(window.iter().map(Message::from));

        let completion = self
            .cascade
            .run_chat_completion(
                messages,
                registry(request.ops_mode),
                ChatOptions { temperature: Some(self.settings.temperature), max_tokens: Some(self.settings.max_tokens) },
            )
            .await?;

        if completion.tool_calls.is_empty() {
            return Ok(AgentReply::message(completion.text));
        }

        let calls: Vec<PendingToolCall> = completion.tool_calls.iter().map(to_pending).collect();
        info!(
            "[agent] monitor user={} page={} ops={} calls={:?}",
            request.user_id.unwrap_or("guest"),
            request.current_path,
            request.ops_mode,
            calls.iter().map(|c| c.function.as_str()).collect::<Vec<_>>()
        );

        if calls.len() > 1 {
            return Ok(AgentReply::with_tool(ONE_AT_A_TIME_MESSAGE, calls[0].clone()));
        }
        let call = &calls[0];
        if helpers::duplicate_fill(&window, call) {
            return Ok(AgentReply::message(ALREADY_FILLED_MESSAGE));
        }
        if helpers::repeating(&window, &call.function, AGENT_RECENT_FUNCTION_TURNS) {
            return Ok(AgentReply::message(REPEATING_MESSAGE));
        }

        let message = if completion.text.is_empty() { EXECUTING_MESSAGE.to_string() } else { completion.text };
        Ok(AgentReply { message, tool_calls: Some(calls) })
    }
}
