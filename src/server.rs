//! HTTP server bootstrap for the personhood gateway.
//!
//! This module wires together:
//! - configuration
//! - the chain RPC client and backend signing key pool
//! - the nonce reservation store (Postgres or in-memory)
//! - the verification pipeline and session projections
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::chain::{
    BootstrapReport, ChainRpc, IdentityRegistry, JsonRpcChain, KeyRegistrar, SigningKeyPool,
};
use crate::crypto::root_seed_from_hex;
use crate::infra::{is_retryable_db_error, InMemoryNonceStore, NonceStore, PgNonceStore, Retry, RetryConfig};
use crate::pipeline::{HttpProofVerifier, VerificationPipeline, VerificationPolicy};
use crate::projection::{InMemorySessionStore, SessionStore};

/// Server configuration, loaded entirely from the environment.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Base URL of the external proof verifier service.
    pub verifier_url: String,
    pub verifier_timeout: Duration,
    /// Chain JSON-RPC endpoint.
    pub chain_rpc_url: String,
    pub chain_rpc_timeout: Duration,
    /// Account of the registry contract receiving verification records.
    pub registry_contract_id: String,
    /// Account that owns the backend signing key pool.
    pub backend_account_id: String,
    /// Root seed the pool's lane keys are derived from.
    pub key_pool_root_seed: [u8; 32],
    pub key_pool_size: u32,
    /// Challenge string wallets must sign.
    pub signing_challenge: String,
    /// Recipient the signed message must address.
    pub signing_recipient: String,
    pub signature_max_age: Duration,
    pub clock_skew: Duration,
    pub sanctions_check_enabled: bool,
    /// Cross-process nonce store; in-memory fallback when unset.
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    pub session_ttl: Duration,
    /// How long a projection may sit pending before the status endpoint
    /// consults the chain instead.
    pub status_fallback_grace: Duration,
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("verifier_url", &self.verifier_url)
            .field("chain_rpc_url", &self.chain_rpc_url)
            .field("registry_contract_id", &self.registry_contract_id)
            .field("backend_account_id", &self.backend_account_id)
            .field("key_pool_root_seed", &"<redacted>")
            .field("key_pool_size", &self.key_pool_size)
            .field("database_url", &self.database_url.as_deref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Required values fail startup with a descriptive error; optional ones
    /// fall back to documented defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_parsed("PORT", 8080)?;
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {host}:{port}: {e}"))?;

        let seed_hex = require_env("BACKEND_KEY_SEED")?;
        let key_pool_root_seed = root_seed_from_hex(&seed_hex)
            .map_err(|e| anyhow::anyhow!("BACKEND_KEY_SEED is unusable: {e}"))?;

        let registry_contract_id = require_env("REGISTRY_CONTRACT_ID")?;
        let signing_recipient = match std::env::var("SIGNING_RECIPIENT") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => registry_contract_id.clone(),
        };

        Ok(Self {
            listen_addr,
            verifier_url: require_env("VERIFIER_URL")?,
            verifier_timeout: Duration::from_millis(env_parsed("VERIFIER_TIMEOUT_MS", 60_000u64)?),
            chain_rpc_url: require_env("CHAIN_RPC_URL")?,
            chain_rpc_timeout: Duration::from_millis(env_parsed("CHAIN_RPC_TIMEOUT_MS", 30_000u64)?),
            registry_contract_id,
            backend_account_id: require_env("BACKEND_ACCOUNT_ID")?,
            key_pool_root_seed,
            key_pool_size: env_parsed("KEY_POOL_SIZE", 4u32)?,
            signing_challenge: require_env("SIGNING_CHALLENGE")?,
            signing_recipient,
            signature_max_age: Duration::from_millis(env_parsed(
                "SIGNATURE_MAX_AGE_MS",
                600_000u64,
            )?),
            clock_skew: Duration::from_millis(env_parsed("CLOCK_SKEW_MS", 10_000u64)?),
            sanctions_check_enabled: env_flag("OFAC_CHECK_ENABLED", true),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_db_connections: env_parsed("MAX_DB_CONNECTIONS", 10u32)?,
            session_ttl: Duration::from_secs(env_parsed("SESSION_TTL_SECS", 3600u64)?),
            status_fallback_grace: Duration::from_millis(env_parsed(
                "STATUS_FALLBACK_GRACE_MS",
                5_000u64,
            )?),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS").ok(),
        })
    }

    fn policy(&self) -> VerificationPolicy {
        VerificationPolicy {
            challenge: self.signing_challenge.clone(),
            recipient: self.signing_recipient.clone(),
            max_signature_age: self.signature_max_age,
            clock_skew: self.clock_skew,
            sanctions_check_enabled: self.sanctions_check_enabled,
            ..VerificationPolicy::default()
        }
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => anyhow::bail!("{name} must be set"),
    }
}

fn env_parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}={raw:?} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        Err(_) => default,
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
    pub sessions: Arc<dyn SessionStore>,
    pub registry: Arc<IdentityRegistry>,
    pub keys: Arc<SigningKeyPool>,
    pub bootstrap: Arc<RwLock<BootstrapReport>>,
    pub status_fallback_grace: Duration,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting personhood gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Verifier: {}", config.verifier_url);
    info!("  Chain RPC: {}", config.chain_rpc_url);
    info!("  Registry contract: {}", config.registry_contract_id);
    info!("  Backend account: {}", config.backend_account_id);
    info!("  Key pool size: {}", config.key_pool_size);

    let rpc: Arc<dyn ChainRpc> = Arc::new(JsonRpcChain::new(
        &config.chain_rpc_url,
        config.chain_rpc_timeout,
    )?);

    let keys = Arc::new(SigningKeyPool::derive(
        &config.backend_account_id,
        &config.key_pool_root_seed,
        config.key_pool_size,
    ));

    let nonces = build_nonce_store(&config).await?;

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.session_ttl));
    let verifier = Arc::new(HttpProofVerifier::new(
        &config.verifier_url,
        config.verifier_timeout,
    )?);
    let registry = Arc::new(IdentityRegistry::new(
        Arc::clone(&rpc),
        config.registry_contract_id.clone(),
    ));

    let pipeline = Arc::new(VerificationPipeline::new(
        verifier,
        Arc::clone(&rpc),
        Arc::clone(&registry),
        nonces,
        Arc::clone(&sessions),
        Arc::clone(&keys),
        config.policy(),
    ));

    // Key registration runs in the background; a failed bootstrap degrades
    // lane capacity but never blocks startup.
    let bootstrap = Arc::new(RwLock::new(BootstrapReport::default()));
    {
        let registrar = KeyRegistrar::new(Arc::clone(&rpc), Arc::clone(&keys));
        let report = Arc::clone(&bootstrap);
        tokio::spawn(async move {
            let outcome = registrar.ensure_pool_registered().await;
            report.write().await.record(outcome);
        });
    }

    let state = AppState {
        pipeline,
        sessions,
        registry,
        keys,
        bootstrap,
        status_fallback_grace: config.status_fallback_grace,
    };

    let app = build_router(&config)?.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Personhood gateway is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Pick the nonce store backend.
///
/// With `DATABASE_URL` set, replay protection is cross-process: connect,
/// bootstrap the schema (retrying transient failures), and start a purge
/// janitor. Without it, fall back to the in-memory store and warn.
async fn build_nonce_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn NonceStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; nonce replay protection is per-process only");
        return Ok(Arc::new(InMemoryNonceStore::new()));
    };

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(database_url)
        .await?;

    Retry::new(RetryConfig::database())
        .run_with_predicate(
            "schema-bootstrap",
            || crate::migrations::run_postgres(&pool),
            is_retryable_db_error,
        )
        .await?;
    info!("Nonce reservation schema ready");

    let store = Arc::new(PgNonceStore::new(pool));

    let janitor = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        interval.tick().await;
        loop {
            interval.tick().await;
            match janitor.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired nonce reservations removed"),
                Err(e) => warn!(error = %e, "nonce reservation purge failed"),
            }
        }
    });

    Ok(store)
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = env_flag("LOG_JSON", false);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
        return;
    }
    info!("Shutdown signal received, draining in-flight requests");
}

pub fn build_router(config: &GatewayConfig) -> anyhow::Result<Router<AppState>> {
    let mut router = Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(crate::api::handlers::health))
        .route("/ready", get(crate::api::handlers::ready))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_origins(config.cors_allowed_origins.as_deref())? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_origins(origins: Option<&str>) -> anyhow::Result<Option<CorsLayer>> {
    let origins = match origins {
        Some(v) => v.trim(),
        None => return Ok(None),
    };
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}
