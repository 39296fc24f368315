use tracing::{debug, warn};

use relay_core::{
    metrics::ProcessUsage,
    messaging::types::Command,
    replies,
};

use crate::router::AppState;

use super::send_reply;

/// Commands answered by the bot itself. Anything else starting with `/` is
/// treated as ordinary text.
const KNOWN_COMMANDS: &[&str] = &["start", "help", "stats"];

pub(crate) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// The command name when `text` invokes one of the bot's own commands.
/// Arguments are ignored; none of them take any.
pub(crate) fn parse_known_command(text: &str) -> Option<String> {
    if !text.trim_start().starts_with('/') {
        return None;
    }
    let (cmd, _args) = parse_command(text);
    KNOWN_COMMANDS.contains(&cmd.as_str()).then_some(cmd)
}

pub async fn handle_command(cmd: Command, state: &AppState) {
    if let Err(e) = state.pipeline.admit(cmd.user_id) {
        debug!(user_id = cmd.user_id.0, command = %cmd.name, error = %e, "command throttled");
        send_reply(state, cmd.chat_id, replies::THROTTLED).await;
        return;
    }

    match cmd.name.as_str() {
        "start" => send_reply(state, cmd.chat_id, replies::GREETING).await,
        "help" => send_reply(state, cmd.chat_id, replies::HELP).await,
        "stats" => handle_stats(cmd, state).await,
        other => debug!(command = other, "ignoring unknown command"),
    }
}

async fn handle_stats(cmd: Command, state: &AppState) {
    if !state.cfg.is_operator(cmd.user_id) {
        debug!(user_id = cmd.user_id.0, "stats requested by non-operator");
        return;
    }

    let snapshot = state.pipeline.metrics().snapshot();
    let usage = ProcessUsage::sample().await;
    match snapshot.to_report(&usage) {
        Ok(report) => send_reply(state, cmd.chat_id, &report).await,
        Err(e) => warn!(error = %e, "failed to render stats report"),
    }
}
