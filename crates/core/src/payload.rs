//! Keys used inside a task event's free-form payload.
//!
//! Page logic writes these before the event is published; workers read them
//! and treat a missing or mistyped key as "not for me".

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Display name of the acting user, filled in by the dispatcher.
pub const AUTHOR: &str = "author";

/// Title of the topic the task touched.
pub const TOPIC_TITLE: &str = "topic_title";

/// Topic whose rollup counters should be recomputed.
pub const TOPIC_ID: &str = "topic_id";

/// Thread whose rollup counters should be recomputed.
pub const THREAD_ID: &str = "thread_id";

/// Text to feed into the search index, see [`SearchDocument`].
pub const SEARCH: &str = "search";

/// A piece of content to (re)index, stored under [`SEARCH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Content kind, e.g. `"comment"` or `"news"`.
    pub kind: String,
    /// Id of the content row within its kind.
    pub id: DbId,
    /// Raw text to tokenize.
    pub text: String,
}

/// Read an integer id from the payload, ignoring other shapes.
pub fn read_id(data: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<DbId> {
    data.get(key).and_then(serde_json::Value::as_i64)
}

/// Read a [`SearchDocument`] from the payload, if present and well formed.
pub fn read_search_document(
    data: &serde_json::Map<String, serde_json::Value>,
) -> Option<SearchDocument> {
    data.get(SEARCH)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
