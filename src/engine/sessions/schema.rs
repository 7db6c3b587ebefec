// Database schema and migrations for the Auraluxe store.
// Called once by SessionStore::open() / open_in_memory().
// Adding a new table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN (errors are swallowed) at the end of
// run_migrations(). Existing SQL is never modified.

use crate::atoms::error::EngineResult;
use log::info;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    // ── Catalog ──────────────────────────────────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            material TEXT NOT NULL DEFAULT '',
            price REAL NOT NULL DEFAULT 0,
            description TEXT,
            image_urls TEXT NOT NULL DEFAULT '[]',
            video_url TEXT,
            image_360_url TEXT,
            stock INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS product_visual_embeddings (
            product_id TEXT NOT NULL,
            image_url TEXT NOT NULL,
            embedding BLOB,
            visual_analysis TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (product_id, image_url)
        );

        CREATE INDEX IF NOT EXISTS idx_visual_status
            ON product_visual_embeddings(status);
        ",
    )?;

    // ── Shoppers ─────────────────────────────────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            full_name TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_cart_user
            ON cart_items(user_id, product_id);

        CREATE TABLE IF NOT EXISTS favorites (
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, product_id)
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            total REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS user_behavior_embeddings (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            session_id TEXT,
            user_name TEXT,
            user_location TEXT,
            interaction_summary TEXT NOT NULL DEFAULT '',
            behavior_data TEXT NOT NULL DEFAULT '{}',
            preferences TEXT NOT NULL DEFAULT '{}',
            embedding BLOB,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_behavior_user ON user_behavior_embeddings(user_id);
        CREATE INDEX IF NOT EXISTS idx_behavior_session ON user_behavior_embeddings(session_id);
        ",
    )?;

    // ── Agent conversations ──────────────────────────────────────────
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            turns TEXT NOT NULL DEFAULT '[]',
            always_allow INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("[store] Schema ready");
    Ok(())
}
