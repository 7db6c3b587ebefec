// Auraluxe Engine — SQLite Store
// Local persistence for the catalog, shoppers and agent conversations via
// rusqlite. Implements the CatalogStore, ShopperStore and ConversationStore
// traits so the engine runs without a hosted backend.
//
// Module layout:
//   schema         — idempotent migrations
//   catalog        — products + product_visual_embeddings, style matching
//   shoppers       — profiles, carts, favorites, orders, behaviour embeddings
//   conversations  — agent transcripts + "always allow" preference
//   embedding      — bytes_to_f32_vec, f32_vec_to_bytes, cosine_similarity

use crate::atoms::error::EngineResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

mod catalog;
mod conversations;
pub(crate) mod embedding;
mod schema;
mod shoppers;

pub use embedding::f32_vec_to_bytes;

/// Thread-safe database wrapper.
pub struct SessionStore {
    /// The SQLite connection, protected by a Mutex.
    pub conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: &Path) -> EngineResult<Self> {
        info!("[store] Opening store at {:?}", path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();

        schema::run_migrations(&conn)?;

        Ok(SessionStore { conn: Mutex::new(conn) })
    }

    /// Fresh in-memory database with the full schema (tests, dry runs).
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(SessionStore { conn: Mutex::new(conn) })
    }
}

/// Current time in the format stored in `updated_at` columns.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
