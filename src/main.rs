use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use team_finder::bot::{Bot, BotDeps};
use team_finder::channels::{Channel, TelegramChannel};
use team_finder::config::BotConfig;
use team_finder::conversation::{ConversationEngine, SessionStore, spawn_prune_task};
use team_finder::entitlement::{EntitlementGate, SystemClock};
use team_finder::payments::{PaymentCoordinator, PurchaseStats};
use team_finder::store::{LibSqlBackend, UserRepository};
use team_finder::summary::{AnthropicSummarizer, ProfileSummarizer, TemplateSummarizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env()?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("🤝 Team Finder v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let repo: Arc<dyn UserRepository> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open database at {}: {e}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Summaries ────────────────────────────────────────────────────────
    let summarizer: Arc<dyn ProfileSummarizer> = match config.anthropic_api_key.clone() {
        Some(key) => {
            eprintln!("   Summaries: {}", config.summary_model);
            Arc::new(AnthropicSummarizer::new(key, config.summary_model.clone()))
        }
        None => {
            eprintln!("   Summaries: template (ANTHROPIC_API_KEY not set)");
            Arc::new(TemplateSummarizer)
        }
    };

    // ── Core ─────────────────────────────────────────────────────────────
    let clock = Arc::new(SystemClock);
    let gate = Arc::new(EntitlementGate::with_subscription_days(
        Arc::clone(&repo),
        clock.clone(),
        config.subscription_days,
    ));
    let sessions = Arc::new(SessionStore::new(clock, config.session_idle_timeout));
    let _prune_handle = spawn_prune_task(Arc::clone(&sessions));

    let telegram = Arc::new(
        TelegramChannel::new(config.telegram_token.clone(), config.allowed_users.clone())
            .with_provider_token(config.provider_token.clone()),
    );
    eprintln!(
        "   Telegram: allowed {}",
        if config.allowed_users.iter().any(|u| u == "*") {
            "everyone".to_string()
        } else {
            config.allowed_users.join(", ")
        }
    );

    let payments = Arc::new(PaymentCoordinator::new(
        telegram.clone(),
        Arc::clone(&repo),
        Arc::clone(&gate),
        Arc::clone(&summarizer),
        Arc::clone(&sessions),
        Arc::new(PurchaseStats::new()),
    ));
    let engine = Arc::new(ConversationEngine::new(Arc::clone(&repo), sessions));

    if let Err(e) = telegram.health_check().await {
        tracing::warn!(error = %e, "Telegram health check failed");
    }

    let deps = BotDeps {
        repo,
        gate,
        engine,
        payments,
        summarizer,
    };
    let bot = Arc::new(Bot::new(deps, telegram));
    bot.run().await?;

    Ok(())
}

fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer().with_target(false);

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "team-finder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
