//! The per-session database connection collaborator.
//!
//! The engine never talks to `sqlx`/`tokio_postgres` directly outside this
//! module: every handler works against `dyn DbConnection` so the rest of
//! the crate can be exercised with [`crate::testing::FakeDbConnection`]
//! without a live Postgres clone.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::model::CloneDb;

/// One open connection to a clone's Postgres instance.
#[async_trait]
pub trait DbConnection: Send + Sync {
    /// Cheap liveness check, used right after a clone is created and by
    /// the session manager's unwind-on-failure path.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Runs a query expected to produce a single block of preformatted
    /// text (`EXPLAIN`'s `FORMAT TEXT`/`FORMAT JSON` output), returning
    /// the concatenated text of every row's first column.
    async fn query_text(&self, sql: &str) -> Result<String, EngineError>;

    /// Runs a query and returns its result set as rows, header first —
    /// the shape `joe_core::table::render_table` expects.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, EngineError>;

    /// Executes a statement that doesn't return rows (or whose rows are
    /// discarded), returning how long it took to run.
    async fn execute(&self, sql: &str) -> Result<Duration, EngineError>;

    /// Like `query_rows`, but with `$1`, `$2`, ... bound as text
    /// parameters rather than interpolated into `sql` — the only path
    /// that may carry chat-message-derived values into a query, so it
    /// never builds SQL by string formatting user input.
    async fn query_rows_params(&self, sql: &str, params: &[String]) -> Result<Vec<Vec<String>>, EngineError>;
}

/// Opens the per-session connection to a freshly created clone. Kept as
/// its own collaborator trait (rather than a bare associated function on
/// [`PgConnection`]) so [`crate::session_manager::SessionManager`] can be
/// exercised with [`crate::testing::FakeDbConnector`] without a live
/// Postgres clone — the same reason [`DbConnection`] itself is a trait.
#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&self, db: &CloneDb) -> Result<Box<dyn DbConnection>, EngineError>;
}

/// Connects via real `sqlx` Postgres pools, per [`PgConnection::connect`].
#[derive(Default)]
pub struct PgConnector;

#[async_trait]
impl DbConnector for PgConnector {
    async fn connect(&self, db: &CloneDb) -> Result<Box<dyn DbConnection>, EngineError> {
        Ok(Box::new(PgConnection::connect(db).await?))
    }
}

/// Real connection to a Database Lab clone, backed by a small `sqlx`
/// connection pool (capped at one connection — a session never issues
/// concurrent queries, since commands for one user are serialized).
pub struct PgConnection {
    pool: sqlx::PgPool,
}

impl PgConnection {
    /// Opens a connection to `db`, pinging it once before returning so
    /// callers can treat construction failure the same as a ping failure
    /// (see `SessionManager::ensure`, step 7).
    pub async fn connect(db: &CloneDb) -> Result<Self, EngineError> {
        let url = format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            db.username,
            db.password.expose(),
            db.host,
            db.port,
            db.dbname,
            db.sslmode
        );

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(joe_core::HTTP_TIMEOUT_SECS))
            .connect(&url)
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let conn = Self { pool };
        conn.ping().await?;
        Ok(conn)
    }
}

#[async_trait]
impl DbConnection for PgConnection {
    async fn ping(&self) -> Result<(), EngineError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn query_text(&self, sql: &str) -> Result<String, EngineError> {
        use sqlx::Row;

        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(classify)?;
        let mut out = String::new();
        for row in &rows {
            let line: String = row.try_get(0).unwrap_or_default();
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, EngineError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(classify)?;
        rows_to_cells(&rows)
    }

    async fn execute(&self, sql: &str) -> Result<Duration, EngineError> {
        let start = std::time::Instant::now();
        sqlx::query(sql).execute(&self.pool).await.map_err(classify)?;
        Ok(start.elapsed())
    }

    async fn query_rows_params(&self, sql: &str, params: &[String]) -> Result<Vec<Vec<String>>, EngineError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        rows_to_cells(&rows)
    }
}

/// Shared row-to-`Vec<Vec<String>>` extraction for `query_rows` and
/// `query_rows_params`: header row first, then every row's cells as text
/// (integers rendered plainly, everything else via its string form).
fn rows_to_cells(rows: &[sqlx::postgres::PgRow]) -> Result<Vec<Vec<String>>, EngineError> {
    use sqlx::{Column, Row, TypeInfo, ValueRef};

    let mut out = Vec::with_capacity(rows.len() + 1);

    if let Some(first) = rows.first() {
        out.push(first.columns().iter().map(|c| c.name().to_string()).collect());
    }

    for row in rows {
        let mut cells = Vec::with_capacity(row.columns().len());
        for i in 0..row.columns().len() {
            let raw = row.try_get_raw(i).map_err(classify)?;
            let cell = if raw.is_null() {
                "NULL".to_string()
            } else {
                match row.column(i).type_info().name() {
                    "INT4" | "INT8" | "INT2" => row
                        .try_get::<i64, _>(i)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    _ => row.try_get::<String, _>(i).unwrap_or_default(),
                }
            };
            cells.push(cell);
        }
        out.push(cells);
    }

    Ok(out)
}

/// Classifies a `sqlx::Error` into a [`EngineError`]: connection-level
/// failures (pool timeouts, broken pipes, connection resets) are
/// `Transport` and retriable; anything the database itself rejected is a
/// `Query` error surfaced verbatim.
fn classify(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            EngineError::Transport(err.to_string())
        }
        _ => EngineError::Query(err.to_string()),
    }
}
