//! Command dispatch table and retry policy.

use crate::commands;
use crate::db::DbConnection;
use crate::error::EngineError;
use crate::explain::ExplainParser;
use crate::messenger::Messenger;
use crate::model::{CloneDb, CommandKind, CommandRecord, Message};

/// The `CommandBuilder` capability (DESIGN NOTES): binds the
/// Enterprise-only `activity`/`terminate` commands and help text,
/// letting a community build no-op them rather than forking the
/// dispatcher with a deep inheritance split.
pub trait CommandBuilder: Send + Sync {
    fn supports_activity(&self) -> bool;
    fn supports_terminate(&self) -> bool;
    fn enterprise_help_text(&self) -> &'static str;
}

pub struct CommunityCommandBuilder;

impl CommandBuilder for CommunityCommandBuilder {
    fn supports_activity(&self) -> bool {
        false
    }
    fn supports_terminate(&self) -> bool {
        false
    }
    fn enterprise_help_text(&self) -> &'static str {
        ""
    }
}

pub struct EnterpriseCommandBuilder;

impl CommandBuilder for EnterpriseCommandBuilder {
    fn supports_activity(&self) -> bool {
        true
    }
    fn supports_terminate(&self) -> bool {
        true
    }
    fn enterprise_help_text(&self) -> &'static str {
        "`activity` - show pg_stat_activity\n`terminate <pid>` - terminate a backend by pid"
    }
}

/// Everything a handler needs to run a query against the session's
/// clone and, where applicable, upload artifacts.
pub struct HandlerCtx<'a> {
    pub conn: &'a dyn DbConnection,
    pub clone_db: &'a CloneDb,
    pub messenger: &'a dyn Messenger,
    pub explain_parser: &'a dyn ExplainParser,
    pub command_builder: &'a dyn CommandBuilder,
}

/// Routes `kind` to its handler. `Help` never reaches here — it's
/// handled before a session is required.
pub async fn dispatch_command(
    kind: CommandKind,
    command: &mut CommandRecord,
    message: &mut Message,
    ctx: &HandlerCtx<'_>,
) -> Result<(), EngineError> {
    match kind {
        CommandKind::Help => unreachable!("help is dispatched before a session is ensured"),
        CommandKind::Explain => {
            commands::explain(command, message, ctx.conn, ctx.messenger, ctx.explain_parser).await
        }
        CommandKind::Plan => commands::plan(command, message, ctx.conn, ctx.messenger).await,
        CommandKind::Exec => commands::exec(command, message, ctx.conn).await,
        CommandKind::Reset => {
            unreachable!("reset needs Session access for its reboot path; handled in the service layer")
        }
        CommandKind::Hypo => commands::hypo(command, message, ctx.conn).await,
        CommandKind::Activity => {
            if !ctx.command_builder.supports_activity() {
                return Err(EngineError::Query(
                    "Enterprise feature. Not supported in CE version".to_string(),
                ));
            }
            commands::activity(message, ctx.conn).await
        }
        CommandKind::Terminate => {
            if !ctx.command_builder.supports_terminate() {
                return Err(EngineError::Query(
                    "Enterprise feature. Not supported in CE version".to_string(),
                ));
            }
            commands::terminate(command, message, ctx.conn).await
        }
        CommandKind::Psql(meta) => commands::psql_meta(meta, command, message, ctx.clone_db).await,
    }
}

/// The full help text: base commands plus
/// whatever the active `CommandBuilder` contributes, plus the version.
pub fn help_text(command_builder: &dyn CommandBuilder) -> String {
    let mut lines = vec![
        "*Supported commands:*".to_string(),
        "`explain <query>` - show the query plan, then run it and show the plan with execution stats".to_string(),
        "`plan <query>` - show the query plan without running it".to_string(),
        "`exec <query>` - run a statement".to_string(),
        "`reset` - reset the session's database state".to_string(),
        "`hypo create|desc|drop|reset [args]` - manage hypothetical indexes via hypopg".to_string(),
        "`\\d`, `\\d+`, `\\dt`, `\\dt+`, `\\di`, `\\di+`, `\\l`, `\\l+`, `\\dv`, `\\dv+`, `\\dm`, `\\dm+` - psql meta-commands".to_string(),
        "`help` - show this message".to_string(),
    ];

    let enterprise = command_builder.enterprise_help_text();
    if !enterprise.is_empty() {
        lines.push(enterprise.to_string());
    }

    lines.push(format!("Version: {}", env!("CARGO_PKG_VERSION")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_help_omits_enterprise_commands() {
        let text = help_text(&CommunityCommandBuilder);
        assert!(!text.contains("activity"));
        assert!(text.contains("Version: "));
    }

    #[test]
    fn enterprise_help_includes_activity_and_terminate() {
        let text = help_text(&EnterpriseCommandBuilder);
        assert!(text.contains("activity"));
        assert!(text.contains("terminate"));
    }
}
