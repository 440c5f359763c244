//! Black-box end-to-end scenarios exercised against the real
//! `ProcessingService` wired to the in-memory `Fake*` collaborators from
//! `joe::testing` — no live Postgres, Database Lab, or chat workspace.
//! One test per named scenario (S1-S6).

use std::sync::Arc;
use std::time::Duration;

use joe::dispatcher::EnterpriseCommandBuilder;
use joe::explain::JsonExplainParser;
use joe::model::{IncomingMessage, Status};
use joe::session_manager::{SessionManager, SessionManagerConfig};
use joe::service::{ProcessingService, ProcessingServiceConfig};
use joe::testing::{
    FakeDatabaseLabClient, FakeDbConnection, FakeDbConnector, FakeMessenger, FakePlatformClient, FakeUserInformer,
};
use joe::user_registry::UserRegistry;

const ANALYZE_JSON: &str = r#"[{
    "Plan": {
        "Node Type": "Result",
        "Total Cost": 0.01,
        "Actual Total Time": 0.002,
        "Actual Rows": 1,
        "Plans": []
    },
    "Planning Time": 0.01,
    "Execution Time": 0.02
}]"#;

struct Harness {
    service: ProcessingService,
    registry: Arc<UserRegistry>,
    session_mgr: Arc<SessionManager>,
    messenger: Arc<FakeMessenger>,
    lab: Arc<FakeDatabaseLabClient>,
    conn: Arc<FakeDbConnection>,
    platform: Arc<FakePlatformClient>,
}

fn build_harness(quota_limit: u32, quota_interval: Duration, history_enabled: bool) -> Harness {
    let lab = Arc::new(FakeDatabaseLabClient::new());
    let conn = Arc::new(FakeDbConnection::new());
    let platform = Arc::new(FakePlatformClient::new());
    let messenger = Arc::new(FakeMessenger::new());

    let session_mgr = Arc::new(SessionManager::new(
        lab.clone(),
        platform.clone(),
        Arc::new(FakeDbConnector::new(conn.clone())),
        SessionManagerConfig {
            dblab_project: "test-project".to_string(),
            dbname: "postgres".to_string(),
            sslmode: "disable".to_string(),
            platform_project: "test-platform-project".to_string(),
            history_enabled,
        },
    ));

    let registry = Arc::new(UserRegistry::new(quota_limit, quota_interval));

    let service = ProcessingService::new(
        registry.clone(),
        session_mgr.clone(),
        platform.clone(),
        messenger.clone(),
        Arc::new(JsonExplainParser),
        Arc::new(EnterpriseCommandBuilder),
        Arc::new(FakeUserInformer::new()),
        ProcessingServiceConfig {
            history_enabled,
            audit_enabled: false,
            min_notify_duration: Duration::from_secs(600),
        },
    );

    Harness {
        service,
        registry,
        session_mgr,
        messenger,
        lab,
        conn,
        platform,
    }
}

fn incoming(user_id: &str, channel_id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        channel_id: channel_id.to_string(),
        channel_type: "channel".to_string(),
        user_id: user_id.to_string(),
        text: text.to_string(),
        is_bot: false,
        subtype: String::new(),
        timestamp: chrono::Utc::now(),
        thread_id: None,
        session_id: None,
        snippet_url: None,
    }
}

/// S1: `help` requires no session and lists every command plus a version.
#[tokio::test]
async fn s1_help_lists_commands_without_a_session() {
    let h = build_harness(100, Duration::from_secs(60), false);

    let reply = h
        .service
        .process_message_event(incoming("u1", "c1", "help"))
        .await
        .unwrap()
        .expect("help always replies");

    assert!(reply.text.starts_with("*Supported commands:*"));
    for cmd in ["explain", "plan", "exec", "reset", "hypo", "help"] {
        assert!(reply.text.contains(cmd), "missing `{cmd}` bullet in help text");
    }
    assert!(reply.text.contains("Version: "));
    assert_eq!(reply.status, Status::Ok);
    assert!(h.lab.destroyed.lock().unwrap().is_empty(), "help must not touch Database Lab");
}

/// A bare DDL statement is never itself a recognized command word, so
/// it's dropped — but it still gets its ephemeral hint first, since the
/// hint check runs independently of whether the text parses.
#[tokio::test]
async fn bare_ddl_text_gets_a_hint_even_though_it_is_dropped() {
    let h = build_harness(100, Duration::from_secs(60), false);

    let reply = h
        .service
        .process_message_event(incoming("u1", "c1", "create index foo on bar(baz)"))
        .await
        .unwrap();

    assert!(reply.is_none(), "an unrecognized command word is still dropped");

    let published = h.messenger.published.lock().unwrap();
    let hint = published
        .iter()
        .find(|m| m.text.contains("did you mean `exec`?"))
        .expect("a hint was published even though the message itself was dropped");
    assert_eq!(hint.channel_id, "c1");
}

/// S2: a user's first `explain` starts a session, runs both halves of
/// the plan, uploads artifacts, and reports "Looks good" with no tips.
#[tokio::test]
async fn s2_first_explain_starts_a_session_and_reports_a_full_plan() {
    let h = build_harness(100, Duration::from_secs(60), false);
    h.conn.stub_text("EXPLAIN (FORMAT TEXT) select 1", "Result  (cost=0.00..0.01 rows=1 width=4)\n");
    h.conn
        .stub_text("EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON) select 1", ANALYZE_JSON);

    let reply = h
        .service
        .process_message_event(incoming("u1", "c1", "explain select 1"))
        .await
        .unwrap()
        .expect("explain always replies");

    assert!(reply.text.contains("```explain select 1```"));
    assert!(reply.text.contains("Session: `"));
    // The initial "*Plan:*" preview is replaced in place by "*Plan with
    // execution:*" once the analyzed plan comes back, per the
    // message-append law's one named exception — so only the latter
    // survives in the final text.
    assert!(!reply.text.contains("*Plan:*\n"));
    assert!(reply.text.contains("*Plan with execution:*"));
    assert!(reply.text.contains("Full plan (json): https://chat.example.com/files/plan.json"));
    assert!(reply.text.contains("Full plan (rendered): https://chat.example.com/files/plan.txt"));
    assert!(reply.text.contains("*Recommendations:*"));
    assert!(reply.text.contains(":white_check_mark: Looks good"));
    assert!(reply.text.contains("*Summary:*"));
    assert_eq!(reply.status, Status::Ok);

    // The session-start message (a separate reply-stream message) carries
    // the "Starting new session..." narration and the foreword.
    let published = h.messenger.published.lock().unwrap();
    let start_message = published
        .iter()
        .find(|m| m.text.contains("Starting new session"))
        .expect("a session-start message was published");
    assert!(start_message.text.contains("Session started: `"));
    assert!(start_message.text.contains("Assistant version: "));
    assert_eq!(start_message.status, Status::Ok);

    // History is disabled for this harness, so nothing was posted to
    // Platform even though `explain` is the one command that would
    // otherwise append a `command_link`.
    assert!(h.platform.posted.lock().unwrap().is_empty());
}

/// With history enabled, a finished `explain` posts its command record
/// to Platform and appends the returned `command_link` to the reply —
/// the one case §4.5 calls out by name.
#[tokio::test]
async fn explain_with_history_enabled_appends_the_command_link() {
    let h = build_harness(100, Duration::from_secs(60), true);
    h.conn.stub_text("EXPLAIN (FORMAT TEXT) select 1", "Result\n");
    h.conn
        .stub_text("EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON) select 1", ANALYZE_JSON);
    h.platform.set_command_link("https://platform.example.com/commands/42");

    let reply = h
        .service
        .process_message_event(incoming("u1", "c1", "explain select 1"))
        .await
        .unwrap()
        .expect("explain always replies");

    assert_eq!(reply.status, Status::Ok);
    assert!(reply.text.contains("History: https://platform.example.com/commands/42"));
    assert_eq!(h.platform.posted.lock().unwrap().len(), 1);
}

/// S3: with `limit=2, interval=60s`, a third command in the same window
/// is rejected with a rate-limit message naming both numbers.
#[tokio::test]
async fn s3_quota_exceeded_on_the_third_request() {
    let h = build_harness(2, Duration::from_secs(60), false);

    for _ in 0..2 {
        let reply = h
            .service
            .process_message_event(incoming("u1", "c1", "exec select 1"))
            .await
            .unwrap()
            .expect("first two execs succeed");
        assert_eq!(reply.status, Status::Ok);
    }

    let err = h
        .service
        .process_message_event(incoming("u1", "c1", "exec select 1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("limit of requests per 60 second"));
    assert!(err.to_string().contains("(2)"));

    let published = h.messenger.published.lock().unwrap();
    let failed = published.last().expect("the rejected command still publishes a message");
    assert_eq!(failed.status, Status::Error);
    assert!(failed.text.contains("per 60 second"));
}

/// S4: a transport error on `exec` whose clone the lab reports gone
/// triggers one reboot-and-retry; the re-run exec then succeeds.
#[tokio::test]
async fn s4_reset_after_idle_kill_reruns_and_succeeds() {
    let h = build_harness(100, Duration::from_secs(60), false);

    // First exec starts a session and succeeds, so there's a live clone
    // to lose.
    let first = h
        .service
        .process_message_event(incoming("u1", "c1", "exec select 1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, Status::Ok);

    // Simulate a dropped connection on the *next* exec, and the clone
    // being gone by the time the engine checks.
    h.conn.stub_error_once(
        "select 2",
        joe::error::EngineError::Transport("connection reset by peer".to_string()),
    );
    h.lab.set_active(false);

    let reply = h
        .service
        .process_message_event(incoming("u1", "c1", "exec select 2"))
        .await
        .unwrap()
        .expect("the rebooted retry succeeds");

    assert_eq!(reply.status, Status::Ok);
    assert!(reply.text.contains("Session was closed by Database Lab."));
    assert!(reply.text.contains("The query has been executed."));
}

/// S5: a psql meta-command argument containing a semicolon is rejected
/// before ever reaching a child process.
#[tokio::test]
async fn s5_strict_psql_rejects_semicolons() {
    let h = build_harness(100, Duration::from_secs(60), false);

    let err = h
        .service
        .process_message_event(incoming("u1", "c1", "\\d public.orders;drop table x"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("should not contain semicolons"));

    let published = h.messenger.published.lock().unwrap();
    let failed = published.last().expect("a reply is still published for the rejected command");
    assert_eq!(failed.status, Status::Error);
    assert!(failed.text.contains("should not contain semicolons"));
}

/// S6: idle sweep stops every session whose clone is both past its
/// idle window and reported gone by the lab, then posts one summary
/// message per affected channel.
#[tokio::test]
async fn s6_idle_sweep_reports_one_summary_per_channel() {
    let h = build_harness(100, Duration::from_secs(60), false);
    h.conn.stub_text("EXPLAIN (FORMAT TEXT) select 1", "Result\n");

    // Zero idle minutes so the sessions created below are immediately
    // past their window, without waiting out a real 60-minute clock.
    h.lab.set_max_idle_minutes(0);

    for user in ["u1", "u2"] {
        let reply = h
            .service
            .process_message_event(incoming(user, "c1", "plan select 1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.status, Status::Ok);
    }

    // Both clones are now past their idle window and the lab reports
    // them gone.
    h.lab.set_active(false);

    joe::idle_sweeper::sweep(&h.registry, &h.session_mgr, h.messenger.as_ref()).await;

    let published = h.messenger.published.lock().unwrap();
    let summary = published
        .iter()
        .find(|m| m.text.contains("Stopped idle sessions for:"))
        .expect("one idle-sweep summary message was published");
    assert_eq!(summary.channel_id, "c1");
    assert!(summary.text.contains("<@u1>"));
    assert!(summary.text.contains("<@u2>"));

    let stopped_count = published
        .iter()
        .filter(|m| m.text.contains("Stopped idle sessions for:"))
        .count();
    assert_eq!(stopped_count, 1, "exactly one summary per affected channel");
}
