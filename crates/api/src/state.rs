//! Shared application state

use std::sync::Arc;

use crate::ai::{AiResponder, CircuitBreakerConfig};
use crate::auth::JwtManager;
use crate::chat::{ChatCoordinator, CoordinatorSettings, EscalationStateMachine, IngestionPipeline};
use crate::config::Config;
use crate::store::SessionStore;
use crate::websocket::WebSocketState;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub chat: Arc<ChatCoordinator>,
    pub jwt: JwtManager,
    pub ws_state: WebSocketState,
}

impl AppState {
    /// Wire the coordinator, rooms and auth around a store and an AI responder
    pub fn new(config: Config, store: Arc<dyn SessionStore>, ai: Arc<dyn AiResponder>) -> Self {
        let ws_state = WebSocketState::new();
        let pipeline = IngestionPipeline::new(
            Arc::clone(&store),
            ai,
            EscalationStateMachine::new(config.need_human_debounce()),
            config.ai_timeout(),
            config.max_message_bytes,
        );
        let chat = ChatCoordinator::new(
            pipeline,
            Arc::clone(&ws_state.rooms),
            CoordinatorSettings {
                disconnect_grace: config.disconnect_grace(),
            },
        );
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        Self {
            config: Arc::new(config),
            store,
            chat: Arc::new(chat),
            jwt,
            ws_state,
        }
    }

    /// Circuit breaker settings for the HTTP AI responder
    pub fn breaker_config(config: &Config) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: config.ai_failure_threshold.max(1),
            ..CircuitBreakerConfig::default()
        }
    }
}
