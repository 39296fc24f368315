use crate::domain::{ChatId, UserId, VoiceFile};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Message(InboundMessage),
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub name: String,
}

/// A user message that goes through the governed pipeline.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub payload: Payload,
}

#[derive(Clone, Debug)]
pub enum Payload {
    Text(String),
    Voice(VoiceFile),
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest accepted text, in UTF-16 code units (Telegram's unit).
    pub max_message_len: usize,
}

/// Clamp an outgoing text to `max_units` UTF-16 code units, marking the cut
/// with an ellipsis. Characters are never split.
pub fn fit_message(text: &str, max_units: usize) -> String {
    if text.encode_utf16().count() <= max_units {
        return text.to_string();
    }

    let ellipsis = '…';
    let budget = max_units.saturating_sub(ellipsis.len_utf16());
    let mut used = 0usize;
    let mut out = String::new();
    for c in text.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        out.push(c);
    }
    out.push(ellipsis);
    out
}
