//! Telegram update handlers.
//!
//! Each Telegram message is translated into a transport-neutral
//! [`IncomingUpdate`] and routed to a command, text or voice handler. Every
//! routed update produces at most one outbound message.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use relay_core::{
    domain::{ChatId, UserId, VoiceFile},
    messaging::types::{fit_message, Command, InboundMessage, IncomingUpdate, Payload},
};

use crate::router::AppState;

mod commands;
mod text;
mod voice;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(update) = to_update(&msg) else {
        debug!(chat_id = msg.chat.id.0, "ignoring unsupported message");
        return Ok(());
    };
    dispatch(update, &state).await;
    Ok(())
}

/// Route one update. Never fails; delivery problems are logged.
pub async fn dispatch(update: IncomingUpdate, state: &AppState) {
    match update {
        IncomingUpdate::Command(cmd) => commands::handle_command(cmd, state).await,
        IncomingUpdate::Message(msg) => match msg.payload {
            Payload::Text(_) => text::handle_text(msg, state).await,
            Payload::Voice(_) => voice::handle_voice(msg, state).await,
        },
    }
}

fn to_update(msg: &Message) -> Option<IncomingUpdate> {
    let user = msg.from()?;
    classify(
        ChatId(msg.chat.id.0),
        UserId(user.id.0 as i64),
        msg.text(),
        msg.voice().map(voice::voice_file),
    )
}

fn classify(
    chat_id: ChatId,
    user_id: UserId,
    text: Option<&str>,
    voice: Option<VoiceFile>,
) -> Option<IncomingUpdate> {
    if let Some(text) = text {
        if let Some(name) = commands::parse_known_command(text) {
            return Some(IncomingUpdate::Command(Command {
                chat_id,
                user_id,
                name,
            }));
        }
        return Some(IncomingUpdate::Message(InboundMessage {
            chat_id,
            user_id,
            payload: Payload::Text(text.to_string()),
        }));
    }

    voice.map(|voice| {
        IncomingUpdate::Message(InboundMessage {
            chat_id,
            user_id,
            payload: Payload::Voice(voice),
        })
    })
}

async fn send_reply(state: &AppState, chat_id: ChatId, text: &str) {
    let limit = state.messenger.capabilities().max_message_len;
    let text = fit_message(text, limit);
    if let Err(e) = state.messenger.send_text(chat_id, &text).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}
