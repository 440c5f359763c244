//! Filters and normalizes incoming messages before they reach the
//! command dispatcher.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DropReason, IncomingMessage};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Validates and normalizes one incoming message, or reports why it was
/// dropped.
pub fn validate(mut incoming: IncomingMessage) -> Result<IncomingMessage, DropReason> {
    if incoming.is_bot || incoming.user_id.is_empty() {
        return Err(DropReason::BotOrSystem);
    }

    if incoming.thread_id.is_some() {
        return Err(DropReason::ThreadReply);
    }

    if !incoming.subtype.is_empty() && incoming.subtype != "file_share" {
        return Err(DropReason::Unsupported);
    }

    if incoming.channel_id.is_empty() {
        return Err(DropReason::ChannelMissing);
    }

    incoming.text = normalize(&incoming.text);

    if incoming.text.is_empty() {
        return Err(DropReason::Unsupported);
    }

    Ok(incoming)
}

/// Trims surrounding backticks, un-escapes the handful of HTML entities a
/// chat transport commonly sends, straightens curly quotes, and collapses
/// whitespace runs.
fn normalize(text: &str) -> String {
    let trimmed = text.trim().trim_matches('`');

    let unescaped = trimmed
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    let straightened = unescaped
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    WHITESPACE_RUN.replace_all(&straightened, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> IncomingMessage {
        IncomingMessage {
            channel_id: "C1".into(),
            channel_type: "channel".into(),
            user_id: "U1".into(),
            text: text.into(),
            is_bot: false,
            subtype: String::new(),
            timestamp: chrono::Utc::now(),
            thread_id: None,
            session_id: None,
            snippet_url: None,
        }
    }

    #[test]
    fn drops_bot_messages() {
        let mut m = msg("explain select 1");
        m.is_bot = true;
        assert_eq!(validate(m).unwrap_err(), DropReason::BotOrSystem);
    }

    #[test]
    fn drops_messages_with_no_user_id() {
        let mut m = msg("explain select 1");
        m.user_id = String::new();
        assert_eq!(validate(m).unwrap_err(), DropReason::BotOrSystem);
    }

    #[test]
    fn drops_thread_replies() {
        let mut m = msg("explain select 1");
        m.thread_id = Some("T1".into());
        assert_eq!(validate(m).unwrap_err(), DropReason::ThreadReply);
    }

    #[test]
    fn drops_messages_with_no_channel() {
        let mut m = msg("explain select 1");
        m.channel_id = String::new();
        assert_eq!(validate(m).unwrap_err(), DropReason::ChannelMissing);
    }

    #[test]
    fn drops_unsupported_subtypes() {
        let mut m = msg("explain select 1");
        m.subtype = "channel_join".into();
        assert_eq!(validate(m).unwrap_err(), DropReason::Unsupported);
    }

    #[test]
    fn accepts_file_share_subtype() {
        let mut m = msg("explain select 1");
        m.subtype = "file_share".into();
        assert!(validate(m).is_ok());
    }

    #[test]
    fn normalizes_backticks_entities_and_quotes() {
        let m = msg("`explain select \u{201c}a\u{201d}   from t &amp; u`");
        let out = validate(m).unwrap();
        assert_eq!(out.text, "explain select \"a\" from t & u");
    }

    #[test]
    fn collapses_whitespace_runs() {
        let m = msg("explain   select    1");
        let out = validate(m).unwrap();
        assert_eq!(out.text, "explain select 1");
    }
}
