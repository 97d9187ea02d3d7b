use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    // API settings
    pub api_bind_addr: String,
    pub cors_allowed_origins: String,
    pub client_url: String,

    // Hosted auth provider (Supabase-compatible)
    pub auth_base_url: String,
    pub auth_service_key: String,

    // LiveKit realtime audio
    pub livekit_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    pub livekit_agent_name: String,

    // Dodo Payments
    pub dodo_payments_api_key: String,
    pub dodo_product_id: String,
    pub dodo_webhook_secret: String,
    pub dodo_test_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "repcoach.db".to_string(),
            api_bind_addr: "127.0.0.1:3001".to_string(),
            cors_allowed_origins: "http://localhost:5173".to_string(),
            client_url: "http://localhost:5173".to_string(),
            auth_base_url: "".to_string(),
            auth_service_key: "".to_string(),
            livekit_url: "".to_string(),
            livekit_api_key: "".to_string(),
            livekit_api_secret: "".to_string(),
            livekit_agent_name: "hype_me_up".to_string(),
            dodo_payments_api_key: "".to_string(),
            dodo_product_id: "".to_string(),
            dodo_webhook_secret: "".to_string(),
            dodo_test_mode: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("RepCoach.toml"))
            .merge(Json::file("RepCoach.json"))
            .merge(Env::raw())
            .extract()
    }
}
