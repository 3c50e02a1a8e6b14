use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parlor_auth::JwtVerifier;
use parlor_chats::{AttachmentStorage, SqliteChatStore};
use parlor_config::{AppConfig, NotificationsConfig};
use parlor_database::initialize_database;
use parlor_realtime::{
    DeliveryEngine, NoopNotificationPublisher, NotificationPublisher, RedisNotificationPublisher,
    SessionRegistry,
};
use redis::aio::ConnectionManager;
use sqlx::SqlitePool;
use tracing::{info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// The long-lived services a server process is assembled from.
#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub store: Arc<SqliteChatStore>,
    pub registry: Arc<SessionRegistry>,
    pub engine: DeliveryEngine,
    pub verifier: Arc<JwtVerifier>,
    pub redis_conn: Option<ConnectionManager>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise chat database")?;

        let store = Arc::new(SqliteChatStore::new(
            db_pool.clone(),
            AttachmentStorage::new(&config.uploads.root),
        ));
        let registry = Arc::new(SessionRegistry::new());

        let redis_conn = connect_redis(&config.notifications).await;
        let notifier: Arc<dyn NotificationPublisher> = match &redis_conn {
            Some(conn) => Arc::new(RedisNotificationPublisher::new(
                conn.clone(),
                config.notifications.queue.clone(),
            )),
            None => Arc::new(NoopNotificationPublisher),
        };

        let engine = DeliveryEngine::new(store.clone(), registry.clone(), notifier);
        if config.auth.uses_default_secret() {
            warn!("auth.jwt_secret is the built-in development secret; set PARLOR__AUTH__JWT_SECRET");
        }
        let verifier = Arc::new(JwtVerifier::from_config(&config.auth));

        info!(
            uploads_root = %config.uploads.root,
            notifications = redis_conn.is_some(),
            "backend services ready"
        );

        Ok(Self {
            db_pool,
            store,
            registry,
            engine,
            verifier,
            redis_conn,
        })
    }
}

/// Notifications are optional: any failure here leaves publishing disabled.
async fn connect_redis(config: &NotificationsConfig) -> Option<ConnectionManager> {
    let url = config.redis_url.as_deref()?;

    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "invalid redis url, message notifications disabled");
            return None;
        }
    };

    match tokio::time::timeout(REDIS_CONNECT_TIMEOUT, ConnectionManager::new(client)).await {
        Ok(Ok(conn)) => {
            info!(queue = %config.queue, "redis connection established");
            Some(conn)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to connect to redis, message notifications disabled");
            None
        }
        Err(_) => {
            warn!("timed out connecting to redis, message notifications disabled");
            None
        }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
