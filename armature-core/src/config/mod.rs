use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Framework settings, loaded from an optional `armature` file plus
/// `APP__`-prefixed environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    /// When true, every entity mutation on a logged entity type produces a
    /// before/after Log Entry.
    #[serde(default = "default_mutation_log")]
    pub mutation_log_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub access_token_expiry_minutes: i64,
}

fn default_mutation_log() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_token_expiry() -> i64 {
    480
}

impl Settings {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("armature").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
