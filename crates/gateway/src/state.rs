//! Shared application state for the gateway

use std::sync::Arc;

use parlor_auth::CredentialVerifier;
use parlor_chats::{AttachmentStorage, ChatStore};
use parlor_config::RealtimeConfig;
use parlor_realtime::{DeliveryEngine, SessionRegistry};

/// Everything a request handler or websocket connection needs.
#[derive(Clone)]
pub struct GatewayState {
    engine: DeliveryEngine,
    verifier: Arc<dyn CredentialVerifier>,
    realtime: RealtimeConfig,
    uploads: AttachmentStorage,
}

impl GatewayState {
    pub fn new(
        engine: DeliveryEngine,
        verifier: Arc<dyn CredentialVerifier>,
        realtime: RealtimeConfig,
        uploads: AttachmentStorage,
    ) -> Self {
        Self {
            engine,
            verifier,
            realtime,
            uploads,
        }
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        self.engine.store()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.engine.registry()
    }

    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.verifier.as_ref()
    }

    pub fn realtime(&self) -> &RealtimeConfig {
        &self.realtime
    }

    pub fn uploads(&self) -> &AttachmentStorage {
        &self.uploads
    }
}
