use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use checkout_api::config::{AppConfig, ProviderConfig};
use checkout_api::database::connection::get_db_pool;
use checkout_api::database::memory::MemoryStore;
use checkout_api::database::postgres::PgStore;
use checkout_api::database::Stores;
use checkout_api::routes;
use checkout_api::services::coop_service::CoopService;
use checkout_api::services::email_service::EmailService;
use checkout_api::services::mpesa_service::MpesaService;
use checkout_api::services::notifier::NotificationDispatcher;
use checkout_api::services::payment_provider::PaymentProvider;
use checkout_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let (stores, pool) = if config.uses_memory_store() {
        tracing::warn!("⚠️ DATABASE_URL=memory, data will not survive a restart");
        (Stores::from_shared(Arc::new(MemoryStore::new())), None)
    } else {
        let pool = get_db_pool(&config).await.context("failed to connect to database")?;
        (Stores::from_shared(Arc::new(PgStore::new(pool.clone()))), Some(pool))
    };

    let email = EmailService::new(&config.email);
    if config.email.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not set, email notifications will be skipped");
    }
    let dispatcher = NotificationDispatcher::new(Arc::new(email), config.notify_retry);

    let mut app_state = AppState::new(stores, dispatcher.clone(), config.checkout.clone())
        .with_config_info(config.get_config_info());

    match initialize_provider(&config).await {
        Some(provider) => {
            tracing::info!("✅ {} payment provider ready", provider.name());
            app_state = app_state.with_payment_provider(provider);
        }
        None => tracing::warn!("💤 Payments disabled: {} credentials missing", config.provider_kind.as_str()),
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("🚀 Server starting on {}", addr);
    axum::serve(listener, routes::app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Waiting for in-flight notifications");
    dispatcher.drain().await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("👋 Shutdown complete");
    Ok(())
}

async fn initialize_provider(config: &AppConfig) -> Option<Arc<dyn PaymentProvider>> {
    match config.provider.clone()? {
        ProviderConfig::Mpesa(mpesa) => {
            tracing::info!("📱 Short code: {}", mpesa.short_code);
            tracing::info!("🌐 Environment: {}", mpesa.environment);

            let service = match MpesaService::new(mpesa, config.checkout.merchant_offset) {
                Ok(service) => service,
                Err(e) => {
                    tracing::error!("❌ Failed to build M-Pesa client: {}", e);
                    return None;
                }
            };

            // A failed check only warns; requests will surface the auth error themselves.
            if let Err(e) = service.get_access_token().await {
                tracing::warn!("⚠️ M-Pesa credential check failed: {}", e);
            }
            let provider: Arc<dyn PaymentProvider> = Arc::new(service);
            Some(provider)
        }
        ProviderConfig::Coop(coop) => {
            let service = match CoopService::new(coop) {
                Ok(service) => service,
                Err(e) => {
                    tracing::error!("❌ Failed to build Co-op client: {}", e);
                    return None;
                }
            };

            if let Err(e) = service.get_access_token().await {
                tracing::warn!("⚠️ Co-op credential check failed: {}", e);
            }
            let provider: Arc<dyn PaymentProvider> = Arc::new(service);
            Some(provider)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
