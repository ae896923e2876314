//! Configuration module

use std::env;
use std::str::FromStr;

/// How the collector treats the `X-Source-Credential` header on inbound reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Missing or mismatching credentials are accepted. Reporters that predate
    /// credentialing keep working; any supplied credential is still stored.
    Optional,
    /// A credential is mandatory and must match the one stored on first contact.
    Required,
}

impl CredentialPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }
}

impl FromStr for CredentialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "optional" => Ok(Self::Optional),
            "required" => Ok(Self::Required),
            other => Err(format!("unknown credential policy '{}'", other)),
        }
    }
}

const DEFAULT_JWT_SECRET: &str = "watchpost-dev-secret-change-in-production";
const DEFAULT_ADMIN_PASSWORD: &str = "change-me";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL, or `memory` for the in-process store
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// JWT secret key
    pub jwt_secret: String,

    /// JWT expiration in hours
    pub jwt_expiration_hours: u64,

    /// Inbound report credential handling
    pub credential_policy: CredentialPolicy,

    /// Bootstrap admin account, created when no user exists yet
    pub admin_email: String,
    pub admin_password: String,

    /// Allowed CORS origins (`*` or comma separated list)
    pub cors_origins: String,

    /// Emit JSON log lines instead of the human readable format
    pub json_logs: bool,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "memory".to_string(),
            port: 8080,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration_hours: 24,
            credential_policy: CredentialPolicy::Optional,
            admin_email: "admin@watchpost.local".to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            cors_origins: "*".to_string(),
            json_logs: false,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let credential_policy = match env::var("CREDENTIAL_POLICY") {
            Ok(v) => v.parse().map_err(anyhow::Error::msg)?,
            Err(_) => defaults.credential_policy,
        };

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or(defaults.database_url),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or(defaults.jwt_secret),

            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or(defaults.jwt_expiration_hours),

            credential_policy,

            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or(defaults.admin_email),

            admin_password: env::var("ADMIN_PASSWORD")
                .unwrap_or(defaults.admin_password),

            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or(defaults.cors_origins),

            json_logs: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            environment: env::var("ENVIRONMENT")
                .unwrap_or(defaults.environment),
        };

        config.check_secrets()?;
        Ok(config)
    }

    /// Production must not run with the built-in JWT secret or admin password
    pub fn check_secrets(&self) -> anyhow::Result<()> {
        if !self.is_production() {
            return Ok(());
        }
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        if self.admin_password == DEFAULT_ADMIN_PASSWORD {
            anyhow::bail!("ADMIN_PASSWORD must be set in production");
        }
        Ok(())
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether to run against the in-process store instead of PostgreSQL
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_policy_parse() {
        assert_eq!("optional".parse(), Ok(CredentialPolicy::Optional));
        assert_eq!(" Required ".parse(), Ok(CredentialPolicy::Required));
        assert!("strict".parse::<CredentialPolicy>().is_err());
    }

    #[test]
    fn test_defaults_use_memory_store() {
        let config = Config::default();
        assert!(config.uses_memory_store());
        assert!(!config.is_production());
        assert_eq!(config.credential_policy, CredentialPolicy::Optional);
    }

    #[test]
    fn test_production_rejects_default_secrets() {
        let dev = Config::default();
        assert!(dev.check_secrets().is_ok());

        let prod = Config { environment: "production".to_string(), ..Config::default() };
        assert!(prod.check_secrets().is_err());

        let prod = Config {
            jwt_secret: "a-long-random-secret".to_string(),
            ..prod
        };
        let err = prod.check_secrets().unwrap_err();
        assert!(err.to_string().contains("ADMIN_PASSWORD"));

        let prod = Config { admin_password: "n0t-the-default".to_string(), ..prod };
        assert!(prod.check_secrets().is_ok());
    }
}
