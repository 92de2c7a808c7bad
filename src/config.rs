use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::utils::CircuitBreakerConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Loaded from a YAML file (default `config/default.yaml`, or `AGUA_CONFIG`),
// then overridden by environment variables. `.env` is read by `main` before
// this runs.
//
// ============================================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orders: OrderSettings,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: "0.0.0.0:8080".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory store.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seed demo users and products into the in-memory store.
    #[serde(default)]
    pub seed_demo_data: bool,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            seed_demo_data: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrderSettings {
    /// Added to `created_at` to produce the estimate shown to customers.
    pub estimated_delivery_minutes: i64,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self { estimated_delivery_minutes: 60 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_phone: Option<String>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl NotificationsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// HTTP endpoint of the transactional mail relay.
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    /// Base URL of the phone-number resource, e.g.
    /// `https://graph.facebook.com/v19.0/<phone-number-id>`.
    pub api_url: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub server_key: Option<String>,
}

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com/fcm/send".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 30,
            success_threshold: 2,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            timeout: Duration::from_secs(settings.timeout_secs),
            success_threshold: settings.success_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { check_interval_secs: 10 }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise starts from defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yml::from_str::<Config>(&contents)
                .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(address) = var("SERVER_ADDRESS") {
            self.server.address = address;
        }
        if let Some(email) = var("ADMIN_EMAIL") {
            self.notifications.admin_email = Some(email);
        }
        if let Some(phone) = var("ADMIN_PHONE") {
            self.notifications.admin_phone = Some(phone);
        }
        if let Some(key) = var("FCM_SERVER_KEY") {
            self.notifications
                .push
                .get_or_insert_with(|| PushConfig {
                    endpoint: default_fcm_endpoint(),
                    server_key: None,
                })
                .server_key = Some(key);
        }
        if let Some(token) = var("WHATSAPP_ACCESS_TOKEN") {
            if let Some(whatsapp) = self.notifications.whatsapp.as_mut() {
                whatsapp.access_token = token;
            }
        }
    }
}
