//! User-facing texts. Raw error details never end up here.

use crate::errors::{InputKind, MessageError};

pub const GREETING: &str = "Привет! Отправьте текст или голосовое сообщение, и я отвечу.";
pub const HELP: &str = "Доступные команды: /start, /help, /stats";
pub const THROTTLED: &str = "Пожалуйста, подождите немного перед следующим запросом.";
pub const EMPTY_TRANSCRIPTION: &str = "Не удалось распознать речь в голосовом сообщении.";
pub const VOICE_FAILED: &str = "Не удалось обработать голосовое сообщение. Попробуйте позже.";
pub const TEXT_FAILED: &str = "Произошла ошибка при обращении к AI-сервису. Попробуйте позже.";

const MIB: u64 = 1024 * 1024;

/// Whole megabytes when the limit is aligned, one decimal otherwise.
fn megabytes(bytes: u64) -> String {
    if bytes % MIB == 0 {
        (bytes / MIB).to_string()
    } else {
        format!("{:.1}", bytes as f64 / MIB as f64)
    }
}

pub fn input_too_large(input: InputKind, limit: u64) -> String {
    match input {
        InputKind::Voice => format!(
            "Голосовое сообщение слишком большое. Максимальный размер: {}MB.",
            megabytes(limit)
        ),
        InputKind::Text => {
            format!("Сообщение слишком длинное. Максимальная длина: {limit} символов.")
        }
    }
}

/// Reply for a failed message of the given input kind.
pub fn for_failure(err: &MessageError, input: InputKind) -> String {
    match err {
        MessageError::Throttled => THROTTLED.to_string(),
        MessageError::InputTooLarge { input, limit, .. } => input_too_large(*input, *limit),
        MessageError::EmptyTranscription => EMPTY_TRANSCRIPTION.to_string(),
        MessageError::Upstream(_) => match input {
            InputKind::Voice => VOICE_FAILED.to_string(),
            InputKind::Text => TEXT_FAILED.to_string(),
        },
    }
}
