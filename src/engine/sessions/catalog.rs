use super::embedding::{f32_vec_to_bytes, rank_by_similarity};
use super::{now_rfc3339, SessionStore};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::CatalogStore;
use crate::engine::types::*;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;

const ITEM_COLUMNS: &str =
    "id, name, category, material, price, description, image_urls, video_url, image_360_url, stock";

impl CatalogItem {
    /// Map a row selected with `ITEM_COLUMNS` → CatalogItem.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let images: String = row.get(6)?;
        Ok(CatalogItem {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            material: row.get(3)?,
            price: row.get(4)?,
            description: row.get(5)?,
            image_urls: serde_json::from_str(&images).unwrap_or_default(),
            video_url: row.get(7)?,
            image_360_url: row.get(8)?,
            stock: row.get(9)?,
        })
    }
}

impl AnalysisRecord {
    /// Row (product_id, image_url, embedding, visual_analysis, status, error_message, updated_at).
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let blob: Option<Vec<u8>> = row.get(2)?;
        let analysis: Option<String> = row.get(3)?;
        let status: String = row.get(4)?;
        Ok(AnalysisRecord {
            product_id: row.get(0)?,
            image_url: row.get(1)?,
            embedding: blob.map(|b| super::embedding::bytes_to_f32_vec(&b)),
            visual_analysis: analysis.and_then(|a| serde_json::from_str(&a).ok()),
            status: match status.as_str() {
                "success" => AnalysisStatus::Success,
                "failed" => AnalysisStatus::Failed,
                _ => AnalysisStatus::Pending,
            },
            error_message: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

fn status_str(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Pending => "pending",
        AnalysisStatus::Success => "success",
        AnalysisStatus::Failed => "failed",
    }
}

impl SessionStore {
    // ── Catalog import ─────────────────────────────────────────────────

    pub fn upsert_item(&self, item: &CatalogItem) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO products (id, name, category, material, price, description, image_urls, video_url, image_360_url, stock)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, category = excluded.category, material = excluded.material,
                price = excluded.price, description = excluded.description, image_urls = excluded.image_urls,
                video_url = excluded.video_url, image_360_url = excluded.image_360_url, stock = excluded.stock",
            params![
                item.id,
                item.name,
                item.category,
                item.material,
                item.price,
                item.description,
                serde_json::to_string(&item.image_urls)?,
                item.video_url,
                item.image_360_url,
                item.stock,
            ],
        )?;
        Ok(())
    }

    /// Ids of items that have at least one image, in catalog order.
    pub fn item_ids_with_images(&self) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM products WHERE image_urls != '[]' ORDER BY rowid")?;
        let ids = stmt.query_map([], |r| r.get::<_, String>(0))?.filter_map(|r| r.ok()).collect();
        Ok(ids)
    }
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl CatalogStore for SessionStore {
    async fn get_item(&self, id: &str) -> EngineResult<Option<CatalogItem>> {
        let conn = self.conn.lock();
        let item = conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?1", ITEM_COLUMNS),
                params![id],
                CatalogItem::from_row,
            )
            .optional()?;
        Ok(item)
    }

    async fn list_items(&self, limit: usize) -> EngineResult<Vec<CatalogItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM products ORDER BY rowid LIMIT ?1", ITEM_COLUMNS))?;
        let items = stmt
            .query_map(params![limit as i64], CatalogItem::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    async fn items_by_ids(&self, ids: &[String]) -> EngineResult<Vec<CatalogItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM products WHERE id = ?1", ITEM_COLUMNS))?;
        let mut items = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        for id in ids.iter().filter(|id| seen.insert(id.as_str())) {
            if let Some(item) = stmt.query_row(params![id], CatalogItem::from_row).optional()? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn search_items(
        &self,
        query: &str,
        min_price: Option<f64>,
        max_price: Option<f64>,
        limit: usize,
    ) -> EngineResult<Vec<CatalogItem>> {
        let conn = self.conn.lock();
        // LIKE is case-insensitive for ASCII in SQLite.
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM products
             WHERE name LIKE '%' || ?1 || '%' ESCAPE '\\'
               AND (?2 IS NULL OR price >= ?2)
               AND (?3 IS NULL OR price <= ?3)
             ORDER BY rowid LIMIT ?4",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![escape_like(query), min_price, max_price, limit as i64], CatalogItem::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    async fn match_by_style(&self, embedding: &[f32], threshold: f64, limit: usize) -> EngineResult<Vec<StyleMatch>> {
        let rows: Vec<(String, Vec<u8>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT product_id, embedding FROM product_visual_embeddings
                 WHERE status = 'success' AND embedding IS NOT NULL",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        // One entry per product (its best-matching image).
        let mut seen = HashSet::new();
        Ok(rank_by_similarity(embedding, rows, threshold, usize::MAX)
            .into_iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .take(limit)
            .map(|(product_id, similarity)| StyleMatch { product_id, similarity })
            .collect())
    }

    async fn upsert_analysis(&self, record: &AnalysisRecord) -> EngineResult<()> {
        let analysis = record.visual_analysis.as_ref().map(serde_json::to_string).transpose()?;
        let blob = record.embedding.as_deref().map(f32_vec_to_bytes);
        let updated_at = if record.updated_at.is_empty() { now_rfc3339() } else { record.updated_at.clone() };

        let conn = self.conn.lock();
        // A failed record carries no vector/analysis; the previous ones are kept.
        conn.execute(
            "INSERT INTO product_visual_embeddings
                (product_id, image_url, embedding, visual_analysis, status, error_message, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(product_id, image_url) DO UPDATE SET
                embedding = COALESCE(excluded.embedding, embedding),
                visual_analysis = COALESCE(excluded.visual_analysis, visual_analysis),
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                record.product_id,
                record.image_url,
                blob,
                analysis,
                status_str(record.status),
                record.error_message,
                updated_at,
            ],
        )?;
        Ok(())
    }

    async fn analyses_for(&self, product_ids: &[String]) -> EngineResult<Vec<AnalysisRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT product_id, image_url, embedding, visual_analysis, status, error_message, updated_at
             FROM product_visual_embeddings WHERE product_id = ?1 ORDER BY image_url",
        )?;
        let mut out = Vec::new();
        for id in product_ids {
            out.extend(stmt.query_map(params![id], AnalysisRecord::from_row)?.filter_map(|r| r.ok()));
        }
        Ok(out)
    }
}
