//! `chat-tts` binary: connect to chat and speak `!tts` requests.
//!
//! Configuration comes from `$CHAT_TTS_CONFIG` (default `./chat-tts.toml`) and
//! environment overrides; logging honours `RUST_LOG`.

use chat_tts::bot::ONLINE_TEXT;
use chat_tts::{
    BotConfig, ChatNotifier, Dispatcher, EventEmitter, HttpVolumeResolver, JobQueue, Sanitizer,
    SystemSpeech, TtsBot, TwitchChat, VoiceConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::load()?;
    tracing::info!(
        channel = %config.chat.channel,
        volume_api = %config.volume_api.base_url,
        voice = ?config.tts.voice,
        "TTS bot starting"
    );

    let events = EventEmitter::default();
    let queue = JobQueue::new();
    let speech = Arc::new(SystemSpeech::detect()?);
    let resolver = Arc::new(HttpVolumeResolver::new(&config.volume_api)?);

    let (chat, inbound) = TwitchChat::connect(&config.chat).await?;
    let notifier: Arc<dyn ChatNotifier> = Arc::new(chat);

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        speech,
        Arc::clone(&notifier),
        VoiceConfig::from(&config.tts),
        events.clone(),
        config.poll_interval,
    ));
    let dispatcher_handle = Arc::clone(&dispatcher).start();

    let bot = TtsBot::new(
        queue,
        resolver,
        notifier,
        Sanitizer::new(config.tts.max_message_length),
        events,
    );
    bot.say(ONLINE_TEXT).await;

    bot.serve(inbound, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C; shutting down");
        }
    })
    .await;

    dispatcher.shutdown();
    if tokio::time::timeout(Duration::from_secs(30), dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher did not finish the in-flight job in time");
    }

    let stats = dispatcher.stats().await;
    tracing::info!(
        spoken = stats.spoken,
        failed = stats.failed,
        dropped = stats.pending,
        "TTS bot stopped"
    );
    Ok(())
}
