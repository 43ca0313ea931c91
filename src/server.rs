//! Reusable auth service runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full server lifecycle:
//! database init, migrations, REST API, blacklist sweeper, metrics and
//! graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::identity::AuthService;
use crate::application::security::{BlacklistSweeper, RateLimiter, TokenBlacklist};
use crate::config::{AppConfig, CacheBackend};
use crate::domain::SharedCache;
use crate::infrastructure::crypto::TokenIssuer;
use crate::infrastructure::{
    init_database, run_migrations, DatabaseCache, InMemoryCache, UserRepository,
};
use crate::interfaces::http::middleware::AuthState;
use crate::interfaces::http::modules::health::HealthState;
use crate::interfaces::http::modules::metrics::MetricsState;
use crate::interfaces::http::{create_api_router, AppState};
use crate::shared::{SharedClock, ShutdownCoordinator, ShutdownSignal, SystemClock};

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

// ── Wiring ─────────────────────────────────────────────────────────

/// Everything the router and background tasks share.
pub struct Components {
    pub state: AppState,
    pub blacklist: Arc<TokenBlacklist>,
}

/// Assemble the auth core and HTTP state from configuration.
pub fn build_components(
    config: &AppConfig,
    db: DatabaseConnection,
    clock: SharedClock,
    metrics: PrometheusHandle,
) -> Components {
    let deadline = config.dependency_timeout();

    let cache: SharedCache = match config.cache.backend {
        CacheBackend::Memory => Arc::new(InMemoryCache::new(clock.clone())),
        CacheBackend::Database => Arc::new(DatabaseCache::new(db.clone(), clock.clone())),
    };
    info!(backend = ?config.cache.backend, "Cache backend selected");

    let issuer = Arc::new(TokenIssuer::new(config.jwt_config(), clock.clone()));
    let blacklist = Arc::new(
        TokenBlacklist::new(cache.clone(), clock.clone())
            .with_policy(config.security.on_backend_error)
            .with_deadline(deadline),
    );
    let rate_limiter = Arc::new(
        RateLimiter::new(config.rate_limit.clone(), cache, clock).with_deadline(deadline),
    );

    let service = AuthService::new(
        Arc::new(UserRepository::new(db.clone())),
        config.password_hasher(),
        issuer,
        blacklist.clone(),
        rate_limiter,
    )
    .with_deadline(deadline);

    let state = AppState {
        auth: AuthState {
            service: Arc::new(service),
            trust_forwarded_for: config.server.trust_forwarded_for,
        },
        health: HealthState {
            db,
            started_at: Arc::new(Instant::now()),
        },
        metrics: MetricsState { handle: metrics },
    };

    Components { state, blacklist }
}

/// The global metrics recorder can only be installed once per process;
/// later calls reuse it.
fn prometheus_handle() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("Prometheus metrics recorder installed");
    Ok(PROM_HANDLE.get_or_init(|| handle).clone())
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running auth service.
pub struct ServerHandle {
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the REST API is bound to.
    pub local_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the service:
    /// 1. Install the Prometheus recorder
    /// 2. Connect to the database and run migrations
    /// 3. Start the blacklist sweeper
    /// 4. Start the REST API (with Swagger UI)
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let config = opts.config;
        info!("Starting Monera auth service...");

        let metrics = prometheus_handle()?;

        let db = init_database(&config.database_config()).await?;
        if opts.auto_migrate {
            run_migrations(&db).await?;
        }

        let components = build_components(&config, db.clone(), SystemClock::shared(), metrics);

        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        let sweeper_task = BlacklistSweeper::new(
            components.blacklist,
            Duration::from_secs(config.security.blacklist_sweep_interval_secs),
        )
        .start(shutdown_signal.clone());

        let router = create_api_router(components.state);
        let listener = tokio::net::TcpListener::bind(config.api_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("REST API server listening on http://{}", local_addr);
        info!("Swagger UI available at http://{}/docs/", local_addr);

        let api_shutdown = shutdown_signal.clone();
        let api_server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("REST API server received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        Ok(Self {
            config,
            local_addr,
            db,
            shutdown,
            api_task,
            sweeper_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for every task to stop once shutdown has been triggered, up to
    /// the configured timeout.
    pub async fn wait(self) {
        info!("Waiting for server tasks to complete...");

        let Self {
            db,
            shutdown,
            api_task,
            sweeper_task,
            ..
        } = self;

        let tasks = async move {
            match api_task.await {
                Ok(()) => info!("REST API server stopped"),
                Err(e) => error!("REST API server task panicked: {}", e),
            }
            if let Err(e) = sweeper_task.await {
                error!("Blacklist sweeper task panicked: {}", e);
            }
        };

        if tokio::time::timeout(shutdown.timeout(), tasks).await.is_err() {
            warn!(
                timeout_secs = shutdown.timeout().as_secs(),
                "Shutdown timed out; abandoning in-flight work"
            );
        }

        if let Err(e) = db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("Database connection closed");
        }

        info!("Monera auth service shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// Initialize tracing (logging) from the application config.
///
/// `RUST_LOG` wins over `logging.level` when set. Call once at process
/// startup, before [`ServerHandle::start`].
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.logging.format.to_lowercase().as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if result.is_err() {
        warn!("Tracing subscriber already installed; keeping the existing one");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_starts_and_stops() {
        let mut config = AppConfig::default();
        config.server.api_host = "127.0.0.1".into();
        config.server.api_port = 0;
        config.server.shutdown_timeout = 5;
        config.database.url = "sqlite::memory:".into();
        config.database.max_connections = 1;
        config.security.bcrypt_cost = 4;

        let handle = ServerHandle::start(ServerOptions {
            config,
            auto_migrate: true,
        })
        .await
        .unwrap();
        assert!(handle.is_running());
        assert_ne!(handle.local_addr.port(), 0);

        tokio::time::timeout(Duration::from_secs(10), handle.shutdown())
            .await
            .expect("server did not shut down");
    }
}
