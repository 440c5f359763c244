//! Per-command handlers. Each takes the
//! in-flight `CommandRecord`, the reply `Message`, the session's open
//! `DbConnection`, and the `Messenger` for artifact uploads, and returns
//! `Result<(), EngineError>` — the dispatcher wraps the error into the
//! command record and the reply on failure.

use joe_core::cut_text;

use crate::db::DbConnection;
use crate::error::EngineError;
use crate::explain::{render_recommendations, ExplainParser};
use crate::messenger::Messenger;
use crate::model::{CommandRecord, Message, PsqlMeta};
use crate::psql;
use crate::query;

/// `explain <q>`: text plan, then an analyzed/JSON plan, tips, and stats.
pub async fn explain(
    command: &mut CommandRecord,
    message: &mut Message,
    conn: &dyn DbConnection,
    messenger: &dyn Messenger,
    explain_parser: &dyn ExplainParser,
) -> Result<(), EngineError> {
    let plan_text = query::explain(conn, &command.query).await?;
    command.plan_text = Some(plan_text.clone());

    let (preview, _truncated) = cut_text(&plan_text, joe_core::PLAN_PREVIEW_SIZE);
    let plan_link = messenger
        .add_artifact("plan.txt", &plan_text, &message.channel_id, message.thread_id.as_deref())
        .await?;

    let before_plan_block = message.text.len();
    message.append(&format!("*Plan:*\n```{preview}```\nFull plan: {plan_link}"));

    let plan_exec_json = query::explain_analyze(conn, &command.query).await?;
    command.plan_exec_json = Some(plan_exec_json.clone());

    let explain = explain_parser.parse(&plan_exec_json)?;
    let rendered = explain.render_text();
    command.plan_exec_text = Some(rendered.clone());

    let json_link = messenger
        .add_artifact("plan.json", &plan_exec_json, &message.channel_id, message.thread_id.as_deref())
        .await?;
    let text_link = messenger
        .add_artifact("plan.txt", &rendered, &message.channel_id, message.thread_id.as_deref())
        .await?;

    // Replaces the "Plan:" preview with "Plan with execution:", per the
    // message-append law's one named exception.
    message.text.truncate(before_plan_block);
    let (exec_preview, _) = cut_text(&rendered, joe_core::PLAN_PREVIEW_SIZE);
    message.append(&format!(
        "*Plan with execution:*\n```{exec_preview}```\nFull plan (json): {json_link}\nFull plan (rendered): {text_link}"
    ));

    let tips = explain.tips();
    let recommendations = render_recommendations(&tips);
    command.recommendations = Some(recommendations.clone());
    message.append(&format!("*Recommendations:*\n{recommendations}"));

    let stats = explain.render_stats();
    command.stats = Some(stats.clone());
    message.append(&format!("*Summary:*\n{stats}"));

    Ok(())
}

/// `plan <q>`: the first half of `explain` only. Hypothetical indexes
/// created earlier via `hypo create` on this connection are honored
/// automatically — `hypopg` intercepts the planner for the life of the
/// session, so no special handling is needed here.
pub async fn plan(
    command: &mut CommandRecord,
    message: &mut Message,
    conn: &dyn DbConnection,
    messenger: &dyn Messenger,
) -> Result<(), EngineError> {
    let plan_text = query::explain(conn, &command.query).await?;
    command.plan_text = Some(plan_text.clone());

    let (preview, _) = cut_text(&plan_text, joe_core::PLAN_PREVIEW_SIZE);
    let plan_link = messenger
        .add_artifact("plan.txt", &plan_text, &message.channel_id, message.thread_id.as_deref())
        .await?;
    message.append(&format!("*Plan:*\n```{preview}```\nFull plan: {plan_link}"));

    Ok(())
}

/// `exec <q>`.
pub async fn exec(command: &CommandRecord, message: &mut Message, conn: &dyn DbConnection) -> Result<(), EngineError> {
    let duration = query::exec(conn, &command.query).await?;
    message.append(&format!(
        "The query has been executed. Duration: {:.3} ms",
        duration.as_secs_f64() * 1000.0
    ));
    Ok(())
}

/// `hypo <sub> [args]`: ensures the `hypopg` extension then dispatches.
/// `create`/`desc`/`drop` each carry the chat-message-derived argument as
/// a bound `$1` parameter rather than interpolating it into the SQL text.
pub async fn hypo(command: &CommandRecord, message: &mut Message, conn: &dyn DbConnection) -> Result<(), EngineError> {
    conn.execute("CREATE EXTENSION IF NOT EXISTS hypopg").await?;

    let mut parts = command.query.splitn(2, ' ');
    let sub = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    let rows = match sub.as_str() {
        "create" => {
            conn.query_rows_params("SELECT * FROM hypopg_create_index($1)", &[arg.to_string()])
                .await?
        }
        "desc" if arg.is_empty() => conn.query_rows("SELECT * FROM hypopg_list_indexes()").await?,
        "desc" => {
            conn.query_rows_params(
                "SELECT hypopg_get_indexdef($1::oid) AS indexdef, hypopg_relation_size($1::oid) AS size_bytes",
                &[arg.to_string()],
            )
            .await?
        }
        "drop" => {
            conn.query_rows_params("SELECT hypopg_drop_index($1::oid)", &[arg.to_string()])
                .await?
        }
        "reset" => conn.query_rows("SELECT hypopg_reset()").await?,
        other => return Err(EngineError::Query(format!("unknown hypo sub-command: {other}"))),
    };

    message.append(&joe_core::render_table(&rows));
    Ok(())
}

/// `activity`: `pg_stat_activity`, with `query` truncated to
/// [`joe_core::ACTIVITY_QUERY_PREVIEW`] chars.
pub async fn activity(message: &mut Message, conn: &dyn DbConnection) -> Result<(), EngineError> {
    let sql = format!(
        "SELECT pid, usename, state, left(query, {}) AS query, query_start FROM pg_stat_activity",
        joe_core::ACTIVITY_QUERY_PREVIEW
    );
    let rows = conn.query_rows(&sql).await?;
    message.append(&joe_core::render_table(&rows));
    Ok(())
}

/// `terminate <pid>`.
pub async fn terminate(command: &CommandRecord, message: &mut Message, conn: &dyn DbConnection) -> Result<(), EngineError> {
    let pid: i64 = command
        .query
        .trim()
        .parse()
        .map_err(|_| EngineError::Query(format!("`{}` is not a valid pid", command.query)))?;

    let sql = format!("SELECT pg_terminate_backend({pid}) AS terminated");
    let rows = conn.query_rows(&sql).await?;
    message.append(&joe_core::render_table(&rows));
    Ok(())
}

/// `\d`-family psql meta-commands, run through the strict psql meta path.
pub async fn psql_meta(
    meta: PsqlMeta,
    command: &CommandRecord,
    message: &mut Message,
    db: &crate::model::CloneDb,
) -> Result<(), EngineError> {
    let output = psql::run(meta, &command.query, db).await?;
    message.append(&format!("```{output}```"));
    Ok(())
}
