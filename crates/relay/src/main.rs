use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_core::{
    config::Config,
    janitor::Janitor,
    messaging::port::MessagingPort,
    metrics::ProcessUsage,
    pipeline::Pipeline,
    retry::RetryingAi,
};
use relay_openai::{OpenAiClient, OpenAiConfig};
use relay_telegram::{
    router::{build_bot, run_polling, AppState},
    TelegramFiles, TelegramMessenger,
};

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    info!(
        admin_configured = cfg.admin_user_id.is_some(),
        rate_limit_requests = cfg.rate_limit_requests,
        rate_limit_window_secs = cfg.rate_limit_window.as_secs(),
        cache_ttl_secs = cfg.cache_ttl.as_secs(),
        "configuration loaded"
    );

    let openai = OpenAiClient::new(OpenAiConfig {
        api_key: cfg.ai_api_key.clone(),
        base_url: cfg.ai_base_url.clone(),
        completion_model: cfg.completion_model.clone(),
        transcription_model: cfg.transcription_model.clone(),
        timeout: cfg.upstream_timeout,
    })?;
    let ai = Arc::new(RetryingAi::new(openai, cfg.retry_policy()));

    let bot = build_bot(&cfg);
    let files = Arc::new(TelegramFiles::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let pipeline = Arc::new(Pipeline::new(cfg.pipeline_settings(), ai, files));

    let shutdown = CancellationToken::new();
    let janitor = Janitor::new(pipeline.cache(), pipeline.metrics(), cfg.janitor_interval)
        .spawn(shutdown.child_token());

    pipeline
        .metrics()
        .snapshot()
        .log("startup", &ProcessUsage::sample().await);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        pipeline: pipeline.clone(),
        messenger,
    });
    let polled = run_polling(bot, state, shutdown.clone()).await;

    shutdown.cancel();
    let _ = janitor.await;
    pipeline
        .metrics()
        .snapshot()
        .log("final", &ProcessUsage::sample().await);

    polled.map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
