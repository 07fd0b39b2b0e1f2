//! limitgate binary entry point.

use limitgate::config::{ConfigLoader, GatewayConfig};
use limitgate::http::Gateway;
use limitgate::limiter::{
    FixedWindowLimiter, Limiter, LimiterRegistry, SlidingWindowLimiter, TokenBucketLimiter,
};
use limitgate::policy::Policy;
use limitgate::provider::ConsulKv;
use limitgate::service::{ConfigService, LimiterService};
use limitgate::snapshot::{FIXED_WINDOW, SLIDING_WINDOW, TOKEN_BUCKET};
use limitgate::store::{RedisScoreStore, ResilientScoreStore, ScoreStore, ScriptHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/limitgate.toml";

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if let Err(e) = run(&config_path).await {
        error!(error = %e, "gateway failed to start");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new().load(config_path)?;
    info!(config_path, "configuration loaded");

    let (store, scripts) = connect_score_store(&config).await?;

    // Register algorithms and instantiate one limiter per script.
    let registry = LimiterRegistry::new();
    registry.register(FIXED_WINDOW, FixedWindowLimiter::factory)?;
    registry.register(TOKEN_BUCKET, TokenBucketLimiter::factory)?;
    registry.register(SLIDING_WINDOW, SlidingWindowLimiter::factory)?;

    let mut limiters: HashMap<String, Arc<dyn Limiter>> = HashMap::new();
    for (name, script) in scripts {
        let limiter = registry.create(name, Arc::clone(&store), script)?;
        limiters.insert(name.to_string(), limiter);
    }
    info!(algorithms = ?registry.list(), "rate limiters initialized");

    let policy = Policy::new(&config.app.whitelisted_ips)?;
    info!(whitelisted_ips = policy.len(), "whitelist policy initialized");

    // Initial policy fetch is fatal; the watch keeps it fresh afterwards.
    let provider = Arc::new(ConsulKv::new(&config.consul.addr)?);
    let config_service = Arc::new(ConfigService::new(
        provider,
        config.app.fetch_config_period(),
    ));
    config_service.load_once(&config.app.config_key).await?;

    let shutdown = CancellationToken::new();
    let watch_handle = config_service.start_watch(&config.app.config_key, shutdown.clone());

    let limiter_service = Arc::new(LimiterService::new(config_service, limiters, policy));
    let gateway = Arc::new(Gateway::new(limiter_service, &config.app.backend_addr)?);

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, backend = %config.app.backend_addr, "gateway listening");

    spawn_signal_handler(shutdown.clone());

    gateway
        .run(listener, shutdown, config.server.shutdown_timeout())
        .await?;

    // The shutdown token also cancels the watch; wait for it to exit.
    if tokio::time::timeout(config.server.shutdown_timeout(), watch_handle)
        .await
        .is_err()
    {
        error!("policy watch did not stop within the shutdown timeout");
    }

    info!("shutdown complete");
    Ok(())
}

/// Connect to the score store, load the script files and pre-load their
/// digests, and wrap the store with the circuit breaker.
async fn connect_score_store(
    config: &GatewayConfig,
) -> Result<(Arc<dyn ScoreStore>, Vec<(&'static str, ScriptHandle)>), Box<dyn std::error::Error>> {
    let redis = RedisScoreStore::connect(
        &config.redis.url,
        config.redis.connection_timeout(),
        config.redis.operation_timeout(),
    )
    .await?;
    redis.ping().await?;
    info!(url = %config.redis.url, "score store connected");

    let mut scripts = Vec::new();
    for name in [FIXED_WINDOW, TOKEN_BUCKET, SLIDING_WINDOW] {
        let script = ScriptHandle::load(&config.app.script_dir, name)?;
        // Digest pre-load is a latency optimization; eval falls back to the
        // full text on a digest miss.
        if let Err(e) = redis.preload(&script).await {
            error!(script = name, error = %e, "script preload failed");
        }
        scripts.push((name, script));
    }
    info!(count = scripts.len(), "decision scripts loaded");

    let store: Arc<dyn ScoreStore> = Arc::new(ResilientScoreStore::new(
        redis,
        config.redis.circuit_breaker_max_failures,
        config.redis.circuit_breaker_timeout(),
    ));
    Ok((store, scripts))
}

/// Cancel the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    shutdown.cancel();
                    return;
                },
            };

            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received shutdown signal");
        }

        shutdown.cancel();
    });
}
