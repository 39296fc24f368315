use tracing::debug;

use relay_core::{
    domain::VoiceFile,
    messaging::types::{InboundMessage, Payload},
};

use crate::router::AppState;

use super::send_reply;

/// Only the file reference and the declared size travel inward; the audio is
/// fetched by the pipeline after the size check.
pub(crate) fn voice_file(voice: &teloxide::types::Voice) -> VoiceFile {
    VoiceFile {
        file_id: voice.file.id.clone(),
        size_bytes: u64::from(voice.file.size),
    }
}

pub async fn handle_voice(msg: InboundMessage, state: &AppState) {
    if let Payload::Voice(voice) = &msg.payload {
        debug!(
            user_id = msg.user_id.0,
            size_bytes = voice.size_bytes,
            "voice received"
        );
    }

    let reply = state.pipeline.process(&msg).await;
    send_reply(state, msg.chat_id, &reply.text).await;
}
