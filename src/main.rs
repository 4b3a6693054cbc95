//! Bakery order management service

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bakery_orders::api::{router, AppState};
use bakery_orders::config::Config;
use bakery_orders::messaging::{EventPublisher, NatsPublisher, NoopPublisher};
use bakery_orders::store::{MemoryStore, PgStore};
use bakery_orders::{Role, User};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env()?;

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                warn!(error = %e, "NATS unavailable, order events disabled");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            let store = Arc::new(store);
            AppState::new(store.clone(), store.clone(), store, publisher)
        }
        None => {
            warn!("DATABASE_URL not set, data is kept in memory only");
            let store = Arc::new(MemoryStore::new());
            AppState::new(store.clone(), store.clone(), store, publisher)
        }
    };

    if let Some(email) = &config.bootstrap_admin_email {
        bootstrap_admin(&state, email).await?;
    }

    let app = router(state);
    info!("Bakery orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

/// Seeds the first admin so the `x-user-id` header has someone to name.
async fn bootstrap_admin(state: &AppState, email: &str) -> Result<()> {
    if state.users.count_any_matching(None).await? > 0 {
        return Ok(());
    }
    let admin = User::new(email, "Bakery", "Admin", Role::Admin);
    let admin = state.users.save(&admin, admin.clone()).await?;
    info!(id = ?admin.id, %email, "bootstrap admin created");
    Ok(())
}
