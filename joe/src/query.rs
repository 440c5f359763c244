//! Native SQL path: thin wrappers over [`DbConnection`] for
//! `explain`, `explain` with analyze, and `exec`.

use std::time::Duration;

use crate::db::DbConnection;
use crate::error::EngineError;

/// `EXPLAIN (FORMAT TEXT) <query>` — the first half of `explain`/`plan`.
pub async fn explain(conn: &dyn DbConnection, query: &str) -> Result<String, EngineError> {
    let sql = format!("EXPLAIN (FORMAT TEXT) {query}");
    conn.query_text(&sql).await.map_err(|e| classify_query_error(e, query))
}

/// `EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON) <query>` —
/// the second half of `explain`.
pub async fn explain_analyze(conn: &dyn DbConnection, query: &str) -> Result<String, EngineError> {
    let sql = format!("EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON) {query}");
    conn.query_text(&sql).await.map_err(|e| classify_query_error(e, query))
}

/// Runs `query` for effect, returning how long it took.
pub async fn exec(conn: &dyn DbConnection, query: &str) -> Result<Duration, EngineError> {
    conn.execute(query).await.map_err(|e| classify_query_error(e, query))
}

/// Appends a hint when a syntax error's query body contains a
/// non-breaking space (U+00A0 / byte 160) — copy-pasted from a chat
/// client or rich-text editor is the usual source.
pub fn classify_query_error(err: EngineError, query: &str) -> EngineError {
    match err {
        EngineError::Query(msg) if query.contains('\u{a0}') => EngineError::Query(format!(
            "{msg}\nHint: this query contains a non-breaking space (U+00A0) — retype it with an ordinary space."
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_errors_without_nbsp_unchanged() {
        let err = classify_query_error(EngineError::Query("syntax error".into()), "select 1");
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn adds_hint_when_query_contains_nbsp() {
        let query = "select\u{a0}1";
        let err = classify_query_error(EngineError::Query("syntax error".into()), query);
        assert!(err.to_string().contains("non-breaking space"));
    }

    #[test]
    fn only_rewrites_query_errors() {
        let err = classify_query_error(EngineError::Transport("reset".into()), "select\u{a0}1");
        assert!(matches!(err, EngineError::Transport(_)));
    }
}
