//! Banking service binary

use anyhow::Context;
use banking_service::{BankingService, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    init_tracing();

    tracing::info!("Starting banking service");

    let config = match std::env::var("CONFIG_FILE") {
        Ok(path) => ServiceConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => ServiceConfig::from_env().context("loading config from environment")?,
    };

    let service = BankingService::open(config)
        .await
        .context("opening ledger")?;

    if let Some(admin) = service.bootstrap_superadmin().await? {
        tracing::info!(username = %admin.username, "Superadmin ready");
    }

    tracing::info!(
        data_dir = %service.config().ledger.data_dir.display(),
        "Banking service ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down banking service");
    service.shutdown().await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
