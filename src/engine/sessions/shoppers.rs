use super::embedding::{f32_vec_to_bytes, rank_by_similarity};
use super::{now_rfc3339, SessionStore};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{CatalogStore, ShopperStore};
use crate::engine::types::*;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

const CART_LINE_SELECT: &str = "SELECT c.id, c.product_id, COALESCE(p.name, ''), c.quantity, COALESCE(p.price, 0)
     FROM cart_items c LEFT JOIN products p ON p.id = c.product_id";

impl CartLine {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(CartLine {
            id: row.get(0)?,
            product_id: row.get(1)?,
            name: row.get(2)?,
            quantity: row.get(3)?,
            price: row.get(4)?,
        })
    }
}

impl SessionStore {
    // ── Profiles, favourites, orders ───────────────────────────────────

    pub fn upsert_profile(&self, user_id: &str, full_name: Option<&str>) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (id, full_name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name",
            params![user_id, full_name],
        )?;
        Ok(())
    }

    pub fn add_favorite(&self, user_id: &str, product_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, product_id) VALUES (?1, ?2)",
            params![user_id, product_id],
        )?;
        Ok(())
    }

    pub fn record_order(&self, user_id: &str, total: f64) -> EngineResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute("INSERT INTO orders (id, user_id, total) VALUES (?1, ?2, ?3)", params![id, user_id, total])?;
        Ok(id)
    }

    fn favorite_ids(&self, user_id: &str) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT product_id FROM favorites WHERE user_id = ?1 ORDER BY created_at, rowid")?;
        let ids = stmt.query_map(params![user_id], |r| r.get::<_, String>(0))?.filter_map(|r| r.ok()).collect();
        Ok(ids)
    }
}

#[async_trait]
impl ShopperStore for SessionStore {
    async fn user_context(&self, user_id: &str) -> EngineResult<UserContext> {
        let (name, total_orders) = {
            let conn = self.conn.lock();
            let name: Option<String> = conn
                .query_row("SELECT full_name FROM profiles WHERE id = ?1", params![user_id], |r| r.get(0))
                .optional()?
                .flatten();
            let total_orders: i64 =
                conn.query_row("SELECT COUNT(*) FROM orders WHERE user_id = ?1", params![user_id], |r| r.get(0))?;
            (name, total_orders)
        };
        let cart = self.cart_lines(user_id).await?;
        let favorite_ids = self.favorite_ids(user_id)?;
        let favorites = self.items_by_ids(&favorite_ids).await?;

        Ok(UserContext { user_id: user_id.to_string(), name, cart, favorites, total_orders })
    }

    async fn cart_line(&self, user_id: &str, product_id: &str) -> EngineResult<Option<CartLine>> {
        let conn = self.conn.lock();
        let line = conn
            .query_row(
                &format!("{} WHERE c.user_id = ?1 AND c.product_id = ?2 ORDER BY c.rowid LIMIT 1", CART_LINE_SELECT),
                params![user_id, product_id],
                CartLine::from_row,
            )
            .optional()?;
        Ok(line)
    }

    async fn insert_cart_line(&self, user_id: &str, product_id: &str, quantity: i64) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cart_items (id, user_id, product_id, quantity) VALUES (?1, ?2, ?3, ?4)",
            params![uuid::Uuid::new_v4().to_string(), user_id, product_id, quantity],
        )?;
        Ok(())
    }

    async fn set_cart_quantity(&self, line_id: &str, quantity: i64) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE cart_items SET quantity = ?1 WHERE id = ?2", params![quantity, line_id])?;
        Ok(())
    }

    async fn cart_lines(&self, user_id: &str) -> EngineResult<Vec<CartLine>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE c.user_id = ?1 ORDER BY c.created_at, c.rowid", CART_LINE_SELECT))?;
        let lines = stmt.query_map(params![user_id], CartLine::from_row)?.filter_map(|r| r.ok()).collect();
        Ok(lines)
    }

    async fn upsert_behavior(&self, record: &BehaviorRecord) -> EngineResult<()> {
        let (column, identity) = match (&record.user_id, &record.session_id) {
            (Some(uid), _) => ("user_id", uid.as_str()),
            (None, Some(sid)) => ("session_id", sid.as_str()),
            (None, None) => return Err("behaviour record needs a user id or session id".into()),
        };

        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row(
                &format!("SELECT id FROM user_behavior_embeddings WHERE {} = ?1 LIMIT 1", column),
                params![identity],
                |r| r.get(0),
            )
            .optional()?;

        let behavior_data = serde_json::to_string(&record.behavior_data)?;
        let preferences = serde_json::to_string(&record.preferences)?;
        let blob = f32_vec_to_bytes(&record.embedding);

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE user_behavior_embeddings SET
                        user_name = ?1, user_location = ?2, interaction_summary = ?3,
                        behavior_data = ?4, preferences = ?5, embedding = ?6, updated_at = ?7
                     WHERE id = ?8",
                    params![
                        record.user_name,
                        record.user_location,
                        record.interaction_summary,
                        behavior_data,
                        preferences,
                        blob,
                        now_rfc3339(),
                        id,
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO user_behavior_embeddings
                        (id, user_id, session_id, user_name, user_location, interaction_summary,
                         behavior_data, preferences, embedding, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        record.id,
                        record.user_id,
                        record.session_id,
                        record.user_name,
                        record.user_location,
                        record.interaction_summary,
                        behavior_data,
                        preferences,
                        blob,
                        now_rfc3339(),
                    ],
                )?;
            }
        }
        Ok(())
    }

    async fn similar_behaviors(&self, embedding: &[f32], threshold: f64, limit: usize) -> EngineResult<Vec<BehaviorRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, user_name, user_location, interaction_summary,
                    behavior_data, preferences, embedding
             FROM user_behavior_embeddings WHERE embedding IS NOT NULL",
        )?;
        let rows: Vec<(BehaviorRecord, Vec<u8>)> = stmt
            .query_map([], |row| {
                let behavior: String = row.get(6)?;
                let prefs: String = row.get(7)?;
                Ok((
                    BehaviorRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        session_id: row.get(2)?,
                        user_name: row.get(3)?,
                        user_location: row.get(4)?,
                        interaction_summary: row.get(5)?,
                        behavior_data: serde_json::from_str(&behavior).unwrap_or_default(),
                        preferences: serde_json::from_str(&prefs).unwrap_or_default(),
                        embedding: vec![],
                        similarity: None,
                    },
                    row.get::<_, Vec<u8>>(8)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rank_by_similarity(embedding, rows, threshold, limit)
            .into_iter()
            .map(|(mut record, score)| {
                record.similarity = Some(score);
                record
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, name: &str, price: f64) -> CatalogItem {
        CatalogItem {
            id: id.into(),
            name: name.into(),
            category: "rings".into(),
            material: "gold".into(),
            price,
            description: None,
            image_urls: vec![],
            video_url: None,
            image_360_url: None,
            stock: 1,
        }
    }

    fn behavior(user: Option<&str>, session: Option<&str>, summary: &str, embedding: Vec<f32>) -> BehaviorRecord {
        BehaviorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.map(String::from),
            session_id: session.map(String::from),
            user_name: None,
            user_location: None,
            interaction_summary: summary.into(),
            behavior_data: json!({}),
            preferences: json!({"categories": ["rings"]}),
            embedding,
            similarity: None,
        }
    }

    #[tokio::test]
    async fn user_context_collects_profile_cart_favorites_orders() {
        let store = SessionStore::open_in_memory().unwrap();
        store.upsert_item(&item("a", "Aurora Ring", 100.0)).unwrap();
        store.upsert_item(&item("b", "Bella Band", 50.0)).unwrap();
        store.upsert_profile("u1", Some("Ava")).unwrap();
        store.add_favorite("u1", "b").unwrap();
        store.record_order("u1", 100.0).unwrap();
        store.insert_cart_line("u1", "a", 2).await.unwrap();

        let ctx = store.user_context("u1").await.unwrap();
        assert_eq!(ctx.name.as_deref(), Some("Ava"));
        assert_eq!(ctx.total_orders, 1);
        assert_eq!(ctx.cart[0].name, "Aurora Ring");
        assert_eq!(ctx.cart[0].quantity, 2);
        assert_eq!(ctx.favorites[0].id, "b");
    }

    #[tokio::test]
    async fn cart_quantity_update() {
        let store = SessionStore::open_in_memory().unwrap();
        store.upsert_item(&item("a", "Aurora Ring", 100.0)).unwrap();
        store.insert_cart_line("u1", "a", 1).await.unwrap();
        let line = store.cart_line("u1", "a").await.unwrap().unwrap();
        store.set_cart_quantity(&line.id, 3).await.unwrap();
        assert_eq!(store.cart_lines("u1").await.unwrap()[0].quantity, 3);
        assert!(store.cart_line("u2", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn behavior_is_superseded_per_identity() {
        let store = SessionStore::open_in_memory().unwrap();
        store.upsert_behavior(&behavior(None, Some("s1"), "first", vec![1.0, 0.0])).await.unwrap();
        store.upsert_behavior(&behavior(None, Some("s1"), "second", vec![1.0, 0.0])).await.unwrap();
        store.upsert_behavior(&behavior(Some("u1"), None, "other", vec![0.0, 1.0])).await.unwrap();

        let similar = store.similar_behaviors(&[1.0, 0.0], 0.7, 5).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].interaction_summary, "second");
        assert!(similar[0].similarity.unwrap() > 0.99);
    }

    #[tokio::test]
    async fn behavior_without_identity_is_rejected() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.upsert_behavior(&behavior(None, None, "x", vec![1.0])).await.is_err());
    }
}
