mod chatbot;
mod classifier;
mod config;

use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use chatbot::presence::Presence;
use chatbot::{ChatbotEngine, DuckDuckGo, GeminiClient, Router, TelegramClient, TracingPresence};
use config::Config;

const DEFAULT_CONFIG_PATH: &str = "jarvis.json";

struct BotState {
    engine: ChatbotEngine,
    router: Router,
    telegram: TelegramClient,
    max_chunk_len: usize,
}

impl BotState {
    async fn new(config: Config, bot: &Bot) -> Result<Self, String> {
        // Get bot info; the numeric id is also the token prefix
        let (bot_user_id, bot_username) = match bot.get_me().await {
            Ok(me) => {
                info!("Bot user ID: {}, username: @{}", me.id, me.username());
                (me.id.0 as i64, Some(me.username().to_string()))
            }
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                let id = config
                    .telegram_bot_token
                    .split(':')
                    .next()
                    .and_then(|id| id.parse::<i64>().ok())
                    .unwrap_or(0);
                (id, None)
            }
        };

        let router = Router::new(bot_user_id, bot_username.as_deref(), config.trigger.clone())
            .map_err(|e| format!("Failed to build mention matcher: {e}"))?;

        let gemini = GeminiClient::new(config.gemini.clone())?;
        info!("Using model {}", config.gemini.model);

        let mut engine = ChatbotEngine::new(config.chatbot.clone(), Arc::new(gemini))
            .with_presence(Arc::new(TracingPresence));

        if let Some(ref url) = config.web_search_url {
            match DuckDuckGo::new(url.clone(), config.request_timeout_secs) {
                Ok(search) => {
                    info!("Web search fallback enabled ({})", url);
                    engine = engine.with_search(Arc::new(search));
                }
                Err(e) => warn!("Web search fallback disabled: {e}"),
            }
        }

        Ok(Self {
            engine,
            router,
            telegram: TelegramClient::new(bot.clone(), bot_user_id, bot_username),
            max_chunk_len: config.max_chunk_len,
        })
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let (config_path, config) = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path);
            (Some(path), config)
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            (Some(DEFAULT_CONFIG_PATH.to_string()), Config::load(DEFAULT_CONFIG_PATH))
        }
        None => (None, Config::from_env()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let (file_layer, _guard) = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("jarvis.log"))
    {
        Ok(log_file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                );
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to open log file, logging to stdout only: {e}");
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(file_layer)
        .init();

    info!("🚀 Starting jarvis...");
    match config_path {
        Some(path) => info!("Loaded config from {path}"),
        None => info!("No config file, using defaults and environment"),
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let state = match BotState::new(config, &bot).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Fatal: {e}");
            std::process::exit(1);
        }
    };
    state.engine.notify(Presence::Ready);

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(event) = state.telegram.to_inbound_event(&msg) else {
        return Ok(());
    };
    let Some(routed) = state.router.route(&event, &state.telegram).await else {
        return Ok(());
    };

    let text_preview: String = routed.text.chars().take(50).collect();
    info!(
        "📨 {} in chat {}: \"{}\" (image: {})",
        routed.user_id,
        msg.chat.id,
        text_preview,
        routed.image.is_some()
    );

    let typing = state.telegram.start_typing(msg.chat.id.0);
    let reply = state
        .engine
        .handle(routed.user_id, &routed.mention, &routed.text, routed.image)
        .await;
    typing.abort();

    state
        .telegram
        .send_reply(msg.chat.id.0, &reply, state.max_chunk_len, Some(msg.id.0))
        .await;

    Ok(())
}
