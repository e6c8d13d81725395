use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct PepConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Upper bound on simultaneous connections for this process. When
    /// the service is replicated, the per-process bound must be the
    /// store's connection ceiling divided by the replica count.
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Endpoints and credentials for the external identity/resource
/// registry (Keycloak-shaped).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub admin_token_url: String,
    pub admin_client_id: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_grant_type: String,
    pub client_token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_grant_type: String,
    pub resource_url: String,
    pub policy_url: String,
    pub user_attribute_url: String,
    /// Every outbound registry call is bounded by this timeout; on
    /// expiry the call fails with a connectivity error instead of
    /// hanging.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Expected issuer of inbound bearer tokens.
    pub issuer: String,
    /// Algorithm of inbound bearer tokens, e.g. RS256.
    pub bearer_algorithm: String,
    /// Public key of the identity realm, PEM file.
    pub realm_public_key_path: String,
    /// Key pair used to sign and verify device policy statements.
    pub signing_private_key_path: String,
    pub signing_public_key_path: String,
    /// Signing algorithm identifier, e.g. RS256. Fixed for the process
    /// lifetime; rotation requires a restart.
    pub signing_algorithm: String,
}

impl PepConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = PepConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("pep-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            registry: RegistryConfig {
                admin_token_url: get_env("REGISTRY_ADMIN_TOKEN_URL", None, is_prod)?,
                admin_client_id: get_env("REGISTRY_ADMIN_CLIENT_ID", None, is_prod)?,
                admin_username: get_env("REGISTRY_ADMIN_USERNAME", None, is_prod)?,
                admin_password: get_env("REGISTRY_ADMIN_PASSWORD", None, is_prod)?,
                admin_grant_type: get_env("REGISTRY_ADMIN_GRANT_TYPE", Some("password"), is_prod)?,
                client_token_url: get_env("REGISTRY_CLIENT_TOKEN_URL", None, is_prod)?,
                client_id: get_env("REGISTRY_CLIENT_ID", None, is_prod)?,
                client_secret: get_env("REGISTRY_CLIENT_SECRET", None, is_prod)?,
                client_grant_type: get_env(
                    "REGISTRY_CLIENT_GRANT_TYPE",
                    Some("client_credentials"),
                    is_prod,
                )?,
                resource_url: get_env("REGISTRY_RESOURCE_URL", None, is_prod)?,
                policy_url: get_env("REGISTRY_POLICY_URL", None, is_prod)?,
                user_attribute_url: get_env("REGISTRY_USER_ATTRIBUTE_URL", None, is_prod)?,
                request_timeout_seconds: get_env(
                    "REGISTRY_REQUEST_TIMEOUT_SECONDS",
                    Some("10"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
            },
            security: SecurityConfig {
                issuer: get_env("BEARER_ISSUER", None, is_prod)?,
                bearer_algorithm: get_env("BEARER_ALGORITHM", Some("RS256"), is_prod)?,
                realm_public_key_path: get_env("REALM_PUBLIC_KEY_PATH", None, is_prod)?,
                signing_private_key_path: get_env("SIGNING_PRIVATE_KEY_PATH", None, is_prod)?,
                signing_public_key_path: get_env("SIGNING_PUBLIC_KEY_PATH", None, is_prod)?,
                signing_algorithm: get_env("SIGNING_ALGORITHM", Some("RS256"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        if self.registry.request_timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REGISTRY_REQUEST_TIMEOUT_SECONDS must be greater than 0"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
