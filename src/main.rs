//! Model Gateway - access control in front of the model API
//! Mission: Only authenticated, authorized, in-quota traffic reaches a handler

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use modelgate_backend::{
    app::cors_layer,
    auth::{ApiKeyStore, RestStore, SqliteStore, SupabaseIdentityProvider, UserStore},
    config::{GatewayConfig, StoreBackend},
    Gateway,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "modelgate")]
#[command(about = "Access-control gateway for the model API")]
struct Args {
    /// Address to listen on (overrides BIND_ADDR / PORT)
    #[arg(long)]
    bind: Option<String>,

    /// Use a local SQLite store instead of the REST store
    #[arg(long)]
    sqlite: Option<String>,

    /// Provider subject id to register as an active local user (SQLite store only, repeatable)
    #[arg(long = "seed-user", value_name = "USER_ID")]
    seed_users: Vec<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = GatewayConfig::from_env().context("Invalid gateway configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(path) = args.sqlite {
        config.store_backend = StoreBackend::Sqlite { path };
    }

    info!("🚀 Model gateway starting");

    let http_client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let provider = Arc::new(SupabaseIdentityProvider::new(
        http_client.clone(),
        &config.provider_url,
        config.provider_anon_key.clone(),
    ));

    let (users, keys): (Arc<dyn UserStore>, Arc<dyn ApiKeyStore>) = match &config.store_backend {
        StoreBackend::Rest => {
            let store = Arc::new(RestStore::new(
                http_client.clone(),
                &config.provider_url,
                config.store_key(),
            ));
            info!("🗄️  Using REST store at {}", config.provider_url);
            if !args.seed_users.is_empty() {
                warn!("--seed-user only applies to the SQLite store; ignoring");
            }
            (store.clone() as Arc<dyn UserStore>, store as Arc<dyn ApiKeyStore>)
        }
        StoreBackend::Sqlite { path } => {
            let store = Arc::new(SqliteStore::new(path)?);
            warn!("⚠️  Using local SQLite store at {} (development only)", path);
            if !args.seed_users.is_empty() {
                let created = store
                    .seed_users(&args.seed_users)
                    .context("Failed to seed local users")?;
                info!("👤 Seeded {} local user(s)", created);
            }
            (store.clone() as Arc<dyn UserStore>, store as Arc<dyn ApiKeyStore>)
        }
    };

    let cors = cors_layer(config.allowed_origins.as_deref())?;
    let bind_addr = config.bind_addr.clone();

    let gateway = Gateway::new(config, provider, users, keys);
    let sweeper = gateway.spawn_sweeps();
    info!("🧹 {} background sweeps running", sweeper.len());

    let app = gateway
        .router()
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("🎯 API server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.shutdown().await;
    info!("👋 Model gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving rather than exit immediately.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize tracing with an env-driven filter
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelgate_backend=debug,modelgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate-root .env when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
