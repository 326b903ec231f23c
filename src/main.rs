use clap::Parser;
use ledger_gateway::application::engine::AccountTransactionEngine;
use ledger_gateway::config::GatewayConfig;
use ledger_gateway::domain::ports::{LedgerStore, LedgerStoreRef};
use ledger_gateway::gateway::auth::{AuthGuard, SigningKey};
use ledger_gateway::gateway::idempotency::IdempotencyGuard;
use ledger_gateway::gateway::rate_limit::RateLimiter;
use ledger_gateway::gateway::{Gateway, GatewayParts};
use ledger_gateway::infrastructure::directory::InMemoryCustomerDirectory;
use ledger_gateway::infrastructure::in_memory::InMemoryLedgerStore;
use ledger_gateway::infrastructure::ttl_store::InMemoryTtlStore;
use ledger_gateway::interfaces::http;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply to anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Token signing secret. Becomes the active signing key.
    #[arg(long, env = "LEDGER_GATEWAY_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Validate the configuration, print a summary and exit.
    #[arg(long)]
    check_config: bool,
}

fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path).into_diagnostic()?,
        None => GatewayConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(secret) = &cli.jwt_secret {
        config
            .auth
            .signing_keys
            .insert(0, SigningKey::new("cli", secret.clone()));
    }
    if let Some(db_path) = &cli.db_path {
        config.ledger.db_path = Some(db_path.clone());
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn ledger_store(config: &GatewayConfig) -> Result<LedgerStoreRef> {
    #[cfg(feature = "storage-rocksdb")]
    {
        if let Some(db_path) = &config.ledger.db_path {
            let store = ledger_gateway::infrastructure::rocksdb::RocksDBLedgerStore::open(db_path)
                .into_diagnostic()?;
            info!(path = %db_path.display(), "using rocksdb ledger store");
            return Ok(Arc::new(store));
        }
    }

    if config.ledger.db_path.is_some() {
        warn!("db_path is set but rocksdb support is not compiled in; using in-memory store");
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.check_config {
        println!("configuration ok");
        println!("listen: {}", config.server.listen);
        println!(
            "signing keys: {}",
            config
                .auth
                .signing_keys
                .iter()
                .map(|key| key.kid.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!(
            "rate limit: {}/s burst {}",
            config.rate_limit.requests_per_second, config.rate_limit.burst_size
        );
        println!(
            "circuit breaker: threshold {} cooldown {}s",
            config.circuit_breaker.failure_threshold, config.circuit_breaker.open_timeout_secs
        );
        return Ok(());
    }

    let store = ledger_store(&config)?;
    let last_customer = store.last_customer().await.into_diagnostic()?;
    if let Some(last) = last_customer {
        info!(last_customer = %last, "new customer ids continue after existing accounts");
    }
    let directory = Arc::new(
        InMemoryCustomerDirectory::with_cost(config.auth.password_cost).starting_after(last_customer),
    );
    let engine = AccountTransactionEngine::new(store, config.ledger.lock_timeout());
    let gateway = Gateway::new(GatewayParts {
        accounts: Arc::new(engine),
        directory: directory.clone(),
        verifier: directory,
        auth: AuthGuard::new(
            config.auth.signing_keys.clone(),
            config.auth.token_ttl(),
            Arc::new(InMemoryTtlStore::new()),
        ),
        rate_limiter: RateLimiter::new(&config.rate_limit),
        idempotency: IdempotencyGuard::new(Arc::new(InMemoryTtlStore::new()), config.idempotency.ttl()),
        breaker: config.circuit_breaker.breaker_config(),
    });

    let purger = gateway.clone();
    let retention = config.idempotency.retention();
    let mut ticker = tokio::time::interval(config.idempotency.purge_interval());
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let purged = purger.purge_expired(retention).await;
            if purged > 0 {
                info!(purged, "expired idempotency keys and revocations purged");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .into_diagnostic()?;
    info!(addr = %config.server.listen, "ledger gateway listening");
    axum::serve(listener, http::router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}
