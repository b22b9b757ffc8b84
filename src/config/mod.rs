//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Path to the map JSON file loaded at startup
    pub map_path: String,
    /// Map name persisted with each round record
    pub map_name: String,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,
    /// Supabase JWT secret for token verification
    pub supabase_jwt_secret: String,

    /// Base URL of the external token payout service
    pub payout_api_url: String,
    /// API key for the payout service
    pub payout_api_key: String,
    /// Tokens distributed to the winning team each round
    pub round_reward_tokens: u64,

    /// Shared secret for the admin endpoints (X-Admin-Key header)
    pub admin_key: String,
    /// Allowed client origin for CORS
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let round_reward_tokens = env::var("ROUND_REWARD_TOKENS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("ROUND_REWARD_TOKENS"))?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            map_path: env::var("MAP_PATH").unwrap_or_else(|_| "maps/classic.json".to_string()),
            map_name: env::var("MAP_NAME").unwrap_or_else(|_| "classic".to_string()),

            supabase_url: env::var("SUPABASE_URL")
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?,

            payout_api_url: env::var("PAYOUT_API_URL")
                .map_err(|_| ConfigError::Missing("PAYOUT_API_URL"))?,
            payout_api_key: env::var("PAYOUT_API_KEY")
                .map_err(|_| ConfigError::Missing("PAYOUT_API_KEY"))?,
            round_reward_tokens,

            admin_key: env::var("ADMIN_KEY").map_err(|_| ConfigError::Missing("ADMIN_KEY"))?,
            client_origin: env::var("CLIENT_ORIGIN")
                .map_err(|_| ConfigError::Missing("CLIENT_ORIGIN"))?,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
}
