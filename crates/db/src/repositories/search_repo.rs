//! Repository for `search_words` and `search_index`.

use std::collections::BTreeMap;

use agora_core::types::DbId;
use sqlx::PgPool;

pub struct SearchRepo;

impl SearchRepo {
    /// Replace the index entries of one piece of content.
    ///
    /// Runs in a single transaction so readers never see a half-indexed row.
    pub async fn replace_document(
        pool: &PgPool,
        kind: &str,
        content_id: DbId,
        counts: &BTreeMap<String, i32>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM search_index WHERE content_kind = $1 AND content_id = $2")
            .bind(kind)
            .bind(content_id)
            .execute(&mut *tx)
            .await?;

        for (word, count) in counts {
            let word_id: DbId = sqlx::query_scalar(
                "INSERT INTO search_words (word) VALUES ($1) \
                 ON CONFLICT (word) DO UPDATE SET word = EXCLUDED.word \
                 RETURNING id",
            )
            .bind(word)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO search_index (content_kind, content_id, word_id, word_count) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(kind)
            .bind(content_id)
            .bind(word_id)
            .bind(count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
}
