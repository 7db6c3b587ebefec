// Auraluxe Engine — Batch stream events
//
// The batch pipeline reports through an abstract `EventSink`. Two adapters:
//   NdjsonSink   — one JSON object per line on any AsyncWrite (stdout, a socket)
//   ChannelSink  — forwards events over an mpsc channel; `ndjson_lines` turns
//                  the receiving end into a stream of wire lines
//
// Wire shape (exactly one key per line):
//   {"log": "...", "subProgress": 35}
//   {"progress": {"productId": "...", "name": "...", "success": false, "error": "..."}}
//   {"complete": {"message": "Processed 3 products", "total": 3, "results": [...]}}

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EventSink;
use crate::engine::types::*;
use async_trait::async_trait;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

// ── Constructors ───────────────────────────────────────────────────────────

impl BatchEvent {
    pub fn log(text: impl Into<String>, sub_progress: Option<u8>) -> Self {
        BatchEvent::Log { log: text.into(), sub_progress }
    }

    pub fn progress(outcome: ItemOutcome) -> Self {
        BatchEvent::Progress { progress: outcome }
    }

    pub fn complete(summary: BatchSummary) -> Self {
        BatchEvent::Complete { complete: summary }
    }

    pub fn to_line(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ItemOutcome {
    pub fn ok(item: &CatalogItem) -> Self {
        ItemOutcome { product_id: item.id.clone(), name: item.name.clone(), success: true, error: None }
    }

    pub fn failed(item: &CatalogItem, error: impl Into<String>) -> Self {
        ItemOutcome { product_id: item.id.clone(), name: item.name.clone(), success: false, error: Some(error.into()) }
    }
}

// ── NDJSON writer ──────────────────────────────────────────────────────────

pub struct NdjsonSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        NdjsonSink { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for NdjsonSink<W> {
    async fn emit(&self, event: BatchEvent) -> EngineResult<()> {
        let mut line = event.to_line()?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

// ── Channel ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: BatchEvent) -> EngineResult<()> {
        self.tx
            .send(event)
            .map_err(|_| EngineError::Cancelled("batch stream receiver dropped".into()))
    }
}

/// Newline-terminated wire lines for every event received.
pub fn ndjson_lines(rx: mpsc::UnboundedReceiver<BatchEvent>) -> impl Stream<Item = String> {
    UnboundedReceiverStream::new(rx).filter_map(|event| event.to_line().ok().map(|l| l + "\n"))
}
