
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert or replace a document, leaving it in the staged state.
    /// Re-upserting an existing id resets it to staged so in-flight
    /// replacements stay invisible to search.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let id = new_document
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let metadata = serde_json::to_string(&new_document.metadata)
            .context("Failed to serialize document metadata")?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source, language, metadata, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'staged', ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                language = excluded.language,
                metadata = excluded.metadata,
                status = 'staged',
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&new_document.title)
        .bind(&new_document.source)
        .bind(&new_document.language)
        .bind(&metadata)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert document")?;

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve upserted document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, title, source, language, metadata, status, created_at, updated_at
            FROM documents WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        Ok(result)
    }

    /// Flip a document's status inside the caller's transaction
    #[inline]
    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: &str,
        status: DocumentStatus,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(now)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update document status")?;

        Ok(())
    }

    /// List committed documents, newest first
    #[inline]
    pub async fn list_committed(
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, title, source, language, metadata, status, created_at, updated_at
            FROM documents WHERE status = 'committed'
            ORDER BY created_at DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list committed documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count_by_status(pool: &SqlitePool, status: DocumentStatus) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE status = ?")
                .bind(status.to_string())
                .fetch_one(pool)
                .await
                .context("Failed to count documents by status")?;

        Ok(count)
    }
}

pub struct FragmentQueries;

impl FragmentQueries {
    /// Insert fragment rows inside the caller's transaction
    #[inline]
    pub async fn create_batch(
        conn: &mut SqliteConnection,
        fragments: Vec<NewFragment>,
    ) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let count = fragments.len();

        for fragment in fragments {
            let metadata = serde_json::to_string(&fragment.metadata)
                .context("Failed to serialize fragment metadata")?;

            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, content, ordinal, token_count, start_offset, end_offset, metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&fragment.id)
            .bind(&fragment.document_id)
            .bind(&fragment.content)
            .bind(fragment.ordinal)
            .bind(fragment.token_count)
            .bind(fragment.start_offset)
            .bind(fragment.end_offset)
            .bind(&metadata)
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("Failed to create fragment in batch")?;
        }

        debug!("Created {} fragments", count);
        Ok(count)
    }

    /// Remove all fragments of a document inside the caller's
    /// transaction, used when re-ingesting under the same id
    #[inline]
    pub async fn delete_for_document(conn: &mut SqliteConnection, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(conn)
            .await
            .context("Failed to delete fragments for document")?;

        Ok(result.rows_affected() as usize)
    }

    #[inline]
    pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<Fragment>> {
        let fragments = sqlx::query_as::<_, Fragment>(
            r#"
            SELECT id, document_id, content, ordinal, token_count, start_offset, end_offset, metadata, created_at
            FROM fragments WHERE document_id = ? ORDER BY ordinal ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list fragments by document")?;

        Ok(fragments)
    }

    /// Fetch the committed fragments among `fragment_ids`, joined with
    /// their documents. Staged documents and unknown ids drop out here.
    #[inline]
    pub async fn committed_hits(
        pool: &SqlitePool,
        fragment_ids: &[String],
    ) -> Result<Vec<FragmentHitRow>> {
        if fragment_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; fragment_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT f.id,
                   f.document_id,
                   f.content,
                   f.ordinal,
                   f.token_count,
                   f.start_offset,
                   f.end_offset,
                   f.metadata,
                   d.title AS document_title,
                   d.created_at AS document_created_at
            FROM fragments f
            JOIN documents d ON d.id = f.document_id
            WHERE d.status = 'committed' AND f.id IN ({placeholders})
            "#
        );

        let mut query = sqlx::query_as::<_, FragmentHitRow>(&sql);
        for id in fragment_ids {
            query = query.bind(id);
        }

        let hits = query
            .fetch_all(pool)
            .await
            .context("Failed to fetch committed fragments")?;

        Ok(hits)
    }

    #[inline]
    pub async fn count_committed(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM fragments f
            JOIN documents d ON d.id = f.document_id
            WHERE d.status = 'committed'
            "#,
        )
        .fetch_one(pool)
        .await
        .context("Failed to count committed fragments")?;

        Ok(count)
    }

    /// Ids of all fragments belonging to committed documents
    #[inline]
    pub async fn committed_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT f.id
            FROM fragments f
            JOIN documents d ON d.id = f.document_id
            WHERE d.status = 'committed'
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list committed fragment ids")?;

        Ok(ids)
    }

    #[inline]
    pub async fn all_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM fragments")
            .fetch_all(pool)
            .await
            .context("Failed to list fragment ids")?;

        Ok(ids)
    }
}
