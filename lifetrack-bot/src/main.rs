use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use lifetrack_bot::channels::{start_telegram_listener, BotDispatcher, TelegramNotifier};
use lifetrack_bot::config::Config;
use lifetrack_bot::graphql::{GraphQLClient, GraphQLExecutor};
use lifetrack_bot::nl::NlPipeline;
use lifetrack_bot::notifications::NotificationPoller;
use lifetrack_bot::sessions::SessionStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Starting LifeTrack bot against {}", config.backend_url);

    let executor: Arc<dyn GraphQLExecutor> = match GraphQLClient::new(&config.backend_url, config.backend_timeout()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to create backend client: {}", e);
            std::process::exit(1);
        }
    };
    let sessions = Arc::new(SessionStore::new());

    let mut dispatcher = BotDispatcher::new(
        executor.clone(),
        sessions.clone(),
        PathBuf::from(&config.file_storage_path),
    );

    if config.nl.enabled {
        match NlPipeline::from_config(&config.nl).await {
            Ok(pipeline) => {
                log::info!("Natural-language queries enabled");
                dispatcher = dispatcher.with_nl(Arc::new(pipeline));
            }
            Err(e) => log::error!("Natural-language queries disabled, pipeline failed to start: {}", e),
        }
    } else {
        log::info!("Natural-language queries disabled (set NL_QUERIES_ENABLED=true to enable)");
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let shutdown = CancellationToken::new();

    let poller = NotificationPoller::new(
        executor.clone(),
        sessions.clone(),
        Arc::new(TelegramNotifier::new(bot.clone())),
    );
    let interval = config.notification_interval();
    let poller_shutdown = shutdown.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(interval, poller_shutdown).await;
    });

    if let Err(e) = start_telegram_listener(bot, Arc::new(dispatcher), shutdown.clone()).await {
        log::error!("Telegram listener failed: {}", e);
    }

    shutdown.cancel();
    if let Err(e) = poller_handle.await {
        log::error!("Notification loop ended abnormally: {}", e);
    }
    log::info!("LifeTrack bot stopped");
}
