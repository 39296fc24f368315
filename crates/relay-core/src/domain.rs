/// Telegram user id (numeric). Rate limits are partitioned by this key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Remote voice file as announced by the chat transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceFile {
    pub file_id: String,
    /// Size declared by the transport, before any download.
    pub size_bytes: u64,
}
