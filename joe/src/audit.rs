//! Audit log (enterprise `--audit-enabled`): one JSON object per
//! accepted command, emitted on a dedicated `tracing` target so an
//! operator can route it to a separate sink without a bespoke file
//! logger — `log.Audit` in the original becomes this target.

use serde::Serialize;

use crate::model::{CommandRecord, UserInfo};

#[derive(Debug, Serialize)]
struct AuditLine<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "realName")]
    real_name: &'a str,
    command: &'a str,
    query: &'a str,
}

/// Logs one audit line at the `audit` target, level `info`.
pub fn record(user: &UserInfo, cmd: &CommandRecord) {
    let line = AuditLine {
        id: &user.id,
        name: &user.name,
        real_name: &user.real_name,
        command: &cmd.command,
        query: &cmd.query,
    };

    match serde_json::to_string(&line) {
        Ok(json) => tracing::info!(target: "audit", "{json}"),
        Err(e) => tracing::warn!(target: "audit", "failed to serialize audit line: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandKind;

    #[test]
    fn serializes_the_documented_shape() {
        let user = UserInfo {
            id: "U1".into(),
            name: "ann".into(),
            real_name: "Ann Operator".into(),
        };
        let cmd = CommandRecord::new(&user, CommandKind::Explain, "select 1");

        let line = AuditLine {
            id: &user.id,
            name: &user.name,
            real_name: &user.real_name,
            command: &cmd.command,
            query: &cmd.query,
        };
        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"realName\":\"Ann Operator\""));
        assert!(json.contains("\"command\":\"explain\""));
    }
}
