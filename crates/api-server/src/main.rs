//! API Server binary entrypoint.

use anyhow::Context;
use api_server::{ApiServer, ServerConfig};
use clap::Parser;
use portfolio_core::config::DatabaseConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// HedgeAI risk desk API server.
#[derive(Debug, Parser)]
#[command(name = "api-server", version, about)]
struct Args {
    /// Bind address (overrides API_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides PORT / API_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Do not run database migrations on startup.
    #[arg(long, env = "SKIP_MIGRATIONS")]
    skip_migrations: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "api_server=debug,auth=info,portfolio_core=info,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let db_config = DatabaseConfig::from_env()?;
    let pool = portfolio_core::db::create_pool(&db_config)
        .await
        .context("Failed to connect to the database")?;

    if !args.skip_migrations {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../../migrations").run(&pool).await?;
    } else {
        tracing::info!("Skipping migrations");
    }

    let mut config = ServerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let server = ApiServer::new(config, pool)?;
    server.run().await?;

    Ok(())
}
