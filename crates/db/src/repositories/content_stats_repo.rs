//! Thread and topic rollup counters.

use agora_core::types::DbId;
use sqlx::PgPool;

pub struct ContentStatsRepo;

impl ContentStatsRepo {
    /// Recompute a thread's comment count. Returns the new count, or `None`
    /// when the thread does not exist.
    pub async fn recount_thread(pool: &PgPool, thread_id: DbId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE forum_threads SET \
                comment_count = (SELECT COUNT(*) FROM comments WHERE thread_id = $1), \
                last_addition = (SELECT MAX(created_at) FROM comments WHERE thread_id = $1) \
             WHERE id = $1 \
             RETURNING comment_count",
        )
        .bind(thread_id)
        .fetch_optional(pool)
        .await
    }

    /// Recompute a topic's thread and comment counts. Returns the new thread
    /// count, or `None` when the topic does not exist.
    pub async fn recount_topic(pool: &PgPool, topic_id: DbId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE forum_topics SET \
                thread_count = (SELECT COUNT(*) FROM forum_threads WHERE topic_id = $1), \
                comment_count = (SELECT COALESCE(SUM(comment_count), 0)::BIGINT \
                                 FROM forum_threads WHERE topic_id = $1) \
             WHERE id = $1 \
             RETURNING thread_count",
        )
        .bind(topic_id)
        .fetch_optional(pool)
        .await
    }
}
