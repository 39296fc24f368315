use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{config::Config, messaging::port::MessagingPort, pipeline::Pipeline};

use crate::handlers;

/// Shared state handed to every update handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub fn build_bot(cfg: &Config) -> Bot {
    Bot::new(cfg.bot_token.clone())
}

/// Long-poll Telegram until `shutdown` fires.
///
/// In-flight handlers are allowed to finish; no new updates are fetched once
/// shutdown starts.
pub async fn run_polling(
    bot: Bot,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed, continuing"),
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!(update_id = upd.id, "unhandled update");
        })
        .build();

    let token = dispatcher.shutdown_token();
    let stopper = tokio::spawn(async move {
        shutdown.cancelled().await;
        info!("stopping dispatcher");
        // The dispatcher reports idle until its polling loop is up.
        loop {
            match token.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });

    dispatcher.dispatch().await;
    stopper.abort();
    info!("dispatcher stopped");
    Ok(())
}
