use std::sync::Arc;

use tracing::{error, info, warn};

use mlk_core::{
    config::Config,
    engine::{Engine, EngineDeps},
    messaging::{
        port::MessagingProvider,
        throttled::{ThrottleConfig, ThrottledProvider},
    },
    ports::{ContentGenerator, FallbackGenerator, ProviderValidator},
    settings::Timings,
    store::StateStore,
};
use mlk_openai::OpenAiCommenter;
use mlk_scraper::ScraperCliSource;
use mlk_telegram::GatewayProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mlk_core::logging::init("mlk")?;

    let cfg = Config::load()?;
    let store = StateStore::open(&cfg.db_path)?;
    info!(db = %cfg.db_path.display(), "state store ready");

    // Space out account calls to keep flood-wait answers rare; the worker still
    // honours the waits it does get.
    let raw: Arc<dyn MessagingProvider> = Arc::new(GatewayProvider::new(
        cfg.gateway_url.clone(),
        cfg.gateway_token.clone(),
    ));
    let provider: Arc<dyn MessagingProvider> = Arc::new(ThrottledProvider::new(
        raw,
        ThrottleConfig {
            global_min_interval: cfg.throttle,
            ..ThrottleConfig::default()
        },
    ));

    let generator: Arc<dyn ContentGenerator> = match cfg.openai_api_key.clone() {
        Some(key) => Arc::new(OpenAiCommenter::new(
            Some(key),
            cfg.openai_model.clone(),
            cfg.prompt_file.clone(),
        )),
        None => {
            warn!("OPENAI_API_KEY not set, only fallback comments will be posted");
            Arc::new(FallbackGenerator)
        }
    };

    let engine = Engine::new(
        store,
        EngineDeps {
            provider: provider.clone(),
            source: Arc::new(ScraperCliSource::new(
                cfg.scraper_cmd.clone(),
                cfg.scraper_args.clone(),
                cfg.scraper_timeout,
            )),
            validator: Arc::new(ProviderValidator::new(provider)),
            generator,
        },
        Timings::default(),
        cfg.processed_retention_days,
    )?;

    match engine.restore_on_boot().await {
        Ok(true) => info!("previous run resumed"),
        Ok(false) => info!("engine idle, waiting for /run"),
        Err(e) => error!(error = %e, "failed to resume previous run"),
    }

    match cfg.bot_token.clone() {
        Some(token) => {
            let bot = mlk_telegram::router::run_polling(token, engine.clone(), cfg.admin_users.clone());
            tokio::select! {
                res = bot => {
                    if let Err(e) = res {
                        error!(error = %e, "control bot failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
            }
        }
        None => {
            warn!("MLK_BOT_TOKEN not set, control bot disabled");
            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
        }
    }

    engine.shutdown().await?;
    Ok(())
}
