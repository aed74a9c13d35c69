//! Storefront backend - catalog, carts, orders and payments over HTTP

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{self, AppState};
use storefront::config::Config;
use storefront::payment::{PaymentGateway, RazorpayClient};
use storefront::publisher::EventPublisher;
use storefront::services::{CartService, CatalogService, OrderService, ZoneService};
use storefront::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if !config.is_production() {
        tracing::warn!(environment = %config.environment, "running outside production; placeholder secrets may be in use");
    }

    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    sqlx::migrate!("./migrations").run(&db).await.context("failed to run migrations")?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                None
            }
        },
        None => None,
    };
    let publisher = EventPublisher::new(nats);

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(RazorpayClient::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
        config.razorpay_webhook_secret.clone(),
    ));

    let state = AppState {
        orders: OrderService::new(store.clone(), gateway, config.pricing.clone(), publisher.clone()).with_tx_timeout(config.tx_timeout),
        catalog: CatalogService::new(store.clone(), publisher).with_tx_timeout(config.tx_timeout),
        carts: CartService::new(store.clone()).with_tx_timeout(config.tx_timeout),
        zones: ZoneService::new(store).with_tx_timeout(config.tx_timeout),
        secret_key: Arc::from(config.secret_key.as_str()),
    };
    let app = api::router(state, &config.allowed_origins);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "storefront listening");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
