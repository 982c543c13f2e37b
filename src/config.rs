use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Auth
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiry_hours: i64,

    // Media host
    pub media_api_base_url: String,
    pub media_cloud_name: String,
    pub media_api_key: String,
    pub media_api_secret: String,
    pub media_upload_folder: String,
    pub media_timeout_seconds: u64,
    pub max_upload_bytes: usize,

    // Quotations
    pub quotation_default_validity_days: i64,
}

/// Parse an optional numeric env var, falling back to `default` when unset or malformed.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = env_or("REDIS_CACHE_TTL_SECONDS", 600);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }
        let jwt_issuer =
            env::var("JWT_ISSUER").unwrap_or_else(|_| "interiorquote".to_string());
        let jwt_expiry_hours = env_or("JWT_EXPIRY_HOURS", 24);

        // Media host
        let media_api_base_url = env::var("MEDIA_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string());
        let media_cloud_name =
            env::var("MEDIA_CLOUD_NAME").context("MEDIA_CLOUD_NAME must be set")?;
        let media_api_key = env::var("MEDIA_API_KEY").context("MEDIA_API_KEY must be set")?;
        let media_api_secret =
            env::var("MEDIA_API_SECRET").context("MEDIA_API_SECRET must be set")?;
        let media_upload_folder = env::var("MEDIA_UPLOAD_FOLDER")
            .unwrap_or_else(|_| "interiorquote/projects".to_string());
        let media_timeout_seconds = env_or("MEDIA_TIMEOUT_SECONDS", 30);
        let max_upload_bytes = env_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024);

        let quotation_default_validity_days = env_or("QUOTATION_DEFAULT_VALIDITY_DAYS", 15);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            jwt_secret,
            jwt_issuer,
            jwt_expiry_hours,
            media_api_base_url,
            media_cloud_name,
            media_api_key,
            media_api_secret,
            media_upload_folder,
            media_timeout_seconds,
            max_upload_bytes,
            quotation_default_validity_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_is_case_insensitive() {
        assert_eq!(Environment::from_str("PRODUCTION"), Environment::Prod);
        assert_eq!(Environment::from_str("prod"), Environment::Prod);
        assert_eq!(Environment::from_str("Staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything-else"), Environment::Dev);
        assert!(Environment::Dev.is_dev());
        assert!(Environment::Prod.is_prod());
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("IQ_TEST_NUMERIC", "not-a-number");
        assert_eq!(env_or("IQ_TEST_NUMERIC", 7u32), 7);
        std::env::set_var("IQ_TEST_NUMERIC", "42");
        assert_eq!(env_or("IQ_TEST_NUMERIC", 7u32), 42);
        assert_eq!(env_or("IQ_TEST_UNSET_NUMERIC", 3i64), 3);
    }
}
