use tracing::debug;

use relay_core::messaging::types::{InboundMessage, Payload};

use crate::router::AppState;

use super::send_reply;

pub async fn handle_text(msg: InboundMessage, state: &AppState) {
    if let Payload::Text(text) = &msg.payload {
        debug!(user_id = msg.user_id.0, chars = text.chars().count(), "text received");
    }

    let reply = state.pipeline.process(&msg).await;
    send_reply(state, msg.chat_id, &reply.text).await;
}
