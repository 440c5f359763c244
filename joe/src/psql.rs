//! Strict psql meta-command path: runs a real `psql` child
//! process so `\d`-family output matches the real tool byte-for-byte,
//! rather than re-deriving catalog queries in Rust.

use std::io::Write;

use tokio::process::Command;

use crate::error::EngineError;
use crate::model::{CloneDb, PsqlMeta};

/// Rejects `arg` outright if it contains a newline, semicolon, space, or
/// a backslash anywhere past index 0, matching
/// `strings.ContainsAny(apiCmd.Query, "\n;\\ ")`: the *entire* argument
/// is rejected, not stripped-then-run.
pub fn sanitize_arg(arg: &str) -> Result<String, EngineError> {
    if arg.contains('\n') {
        return Err(EngineError::Query("query should not contain newlines".to_string()));
    }
    if arg.contains(';') {
        return Err(EngineError::Query("query should not contain semicolons".to_string()));
    }
    if arg.contains(' ') {
        return Err(EngineError::Query("query should not contain spaces".to_string()));
    }
    if arg.chars().skip(1).any(|c| c == '\\') {
        return Err(EngineError::Query(
            "query should not contain backslashes after the leading character".to_string(),
        ));
    }

    Ok(arg.strip_prefix('\\').unwrap_or(arg).to_string())
}

/// Runs `cmd arg` (e.g. `\d public.orders`) through a real `psql`
/// subprocess against the session's clone, returning stdout as the
/// table text for the reply.
pub async fn run(cmd: PsqlMeta, arg: &str, db: &CloneDb) -> Result<String, EngineError> {
    let sanitized = sanitize_arg(arg)?;
    let command_line = format!("{} {sanitized}", cmd.as_str());

    let mut tmp = tempfile::NamedTempFile::new().map_err(|e| EngineError::Transport(e.to_string()))?;
    tmp.write_all(command_line.as_bytes())
        .map_err(|e| EngineError::Transport(e.to_string()))?;
    tmp.flush().map_err(|e| EngineError::Transport(e.to_string()))?;

    let output = Command::new("psql")
        .arg("-h")
        .arg(&db.host)
        .arg("-p")
        .arg(db.port.to_string())
        .arg("-U")
        .arg(&db.username)
        .arg("-d")
        .arg(&db.dbname)
        .arg("-f")
        .arg(tmp.path())
        .env("PGPASSWORD", db.password.expose())
        .output()
        .await
        .map_err(|e| EngineError::Transport(e.to_string()))?;

    if !output.status.success() {
        return Err(EngineError::Query(String::from_utf8_lossy(&output.stderr).to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_plain_identifier() {
        assert_eq!(sanitize_arg("public.orders").unwrap(), "public.orders");
    }

    #[test]
    fn strips_the_leading_backslash_only() {
        assert_eq!(sanitize_arg("\\orders").unwrap(), "orders");
    }

    #[test]
    fn rejects_newlines() {
        assert!(sanitize_arg("orders\ndrop table x").unwrap_err().to_string().contains("newline"));
    }

    #[test]
    fn rejects_semicolons() {
        let err = sanitize_arg("public.orders;drop table x").unwrap_err();
        assert!(err.to_string().contains("should not contain semicolons"));
    }

    #[test]
    fn rejects_spaces() {
        assert!(sanitize_arg("public orders").unwrap_err().to_string().contains("spaces"));
    }

    #[test]
    fn rejects_backslashes_after_the_leading_character() {
        let err = sanitize_arg("\\orders\\drop").unwrap_err();
        assert!(err.to_string().contains("backslashes"));
    }
}
