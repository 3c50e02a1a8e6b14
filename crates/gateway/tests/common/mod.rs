#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use chrono::Duration;
use parlor_auth::JwtVerifier;
use parlor_chats::{AttachmentStorage, SqliteChatStore};
use parlor_config::{DatabaseConfig, RealtimeConfig};
use parlor_gateway::{create_router, GatewayState};
use parlor_realtime::{DeliveryEngine, NoopNotificationPublisher, SessionRegistry};
use tempfile::TempDir;

pub const SECRET: &str = "gateway-test-secret";

pub struct TestContext {
    pub state: GatewayState,
    pub store: Arc<SqliteChatStore>,
    pub verifier: JwtVerifier,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_realtime(RealtimeConfig::default()).await
    }

    pub async fn with_realtime(realtime: RealtimeConfig) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", temp_dir.path().join("gateway.db").display()),
            max_connections: 5,
        };
        let pool = parlor_database::initialize_database(&config)
            .await
            .expect("initialise database");

        let store = Arc::new(SqliteChatStore::new(
            pool,
            AttachmentStorage::new(temp_dir.path()),
        ));
        let registry = Arc::new(SessionRegistry::new());
        let engine = DeliveryEngine::new(
            store.clone(),
            registry,
            Arc::new(NoopNotificationPublisher),
        );
        let verifier = JwtVerifier::new(SECRET, Duration::hours(1));
        let state = GatewayState::new(
            engine,
            Arc::new(verifier.clone()),
            realtime,
            AttachmentStorage::new(temp_dir.path()),
        );

        Self {
            state,
            store,
            verifier,
            _temp_dir: temp_dir,
        }
    }

    pub fn uploads_root(&self) -> &Path {
        self._temp_dir.path()
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn token(&self, user_id: &str) -> String {
        self.verifier.issue(user_id).expect("issue token")
    }

    /// Serve the router on an ephemeral port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve router");
        });
        addr
    }
}
