//! Client for the external identity/resource registry.
//!
//! The registry issues the opaque identifiers linking local policy
//! documents to its own records, stores one free-form attribute per
//! user, and exposes the role registry backing the available-policy
//! vocabulary. Every outbound call is bounded by the configured
//! timeout; there are no automatic retries.

use async_trait::async_trait;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::models::Service;
use crate::services::metrics::REGISTRY_CALLS;

/// Internal role the registry attaches to every client; not a policy.
const INTERNAL_ROLE: &str = "uma_protection";

#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Stable opaque identifier previously assigned to the user, if
    /// any.
    async fn user_identifier(&self, sub: &str) -> Result<Option<String>, AppError>;
    /// First-use provisioning: mint an identifier and persist it as
    /// the user's attribute.
    async fn assign_user_identifier(&self, sub: &str) -> Result<String, AppError>;
    /// The policy vocabulary advertised by the registry.
    async fn available_policies(&self) -> Result<Vec<String>, AppError>;
    /// Register a service resource; returns the registry identifier.
    async fn register_service(&self, service: &Service) -> Result<String, AppError>;
    async fn update_service(&self, identifier: &str, service: &Service)
        -> Result<(), AppError>;
    async fn delete_service(&self, identifier: &str) -> Result<(), AppError>;
}

#[derive(Deserialize)]
struct TokenEnvelope {
    access_token: String,
}

#[derive(Deserialize)]
struct RoleName {
    name: String,
}

#[derive(Deserialize)]
struct ResourceCreated {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct AttributesEnvelope {
    attributes: UserAttributes,
}

#[derive(Deserialize)]
struct UserAttributes {
    device_policy_list: Vec<String>,
}

/// reqwest-backed registry client. The HTTP connection pool is
/// process-wide: one client, created at startup, reused by every
/// request.
pub struct RegistryHttpClient {
    http: reqwest::Client,
    config: RegistryConfig,
}

impl RegistryHttpClient {
    pub fn new(config: RegistryConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { http, config })
    }

    async fn fetch_token(&self, url: &str, form: &[(&str, &str)]) -> Result<String, AppError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| unreachable_err("token", e))?;

        let response = check_status("token", response).await?;
        let envelope: TokenEnvelope = response
            .json()
            .await
            .map_err(|e| unreachable_err("token", e))?;
        Ok(envelope.access_token)
    }

    /// Administrator token used for user-attribute and role reads.
    async fn admin_token(&self) -> Result<String, AppError> {
        self.fetch_token(
            &self.config.admin_token_url,
            &[
                ("client_id", &self.config.admin_client_id),
                ("username", &self.config.admin_username),
                ("password", &self.config.admin_password),
                ("grant_type", &self.config.admin_grant_type),
            ],
        )
        .await
    }

    /// Client token used for resource registration.
    async fn client_token(&self) -> Result<String, AppError> {
        self.fetch_token(
            &self.config.client_token_url,
            &[
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("grant_type", &self.config.client_grant_type),
            ],
        )
        .await
    }
}

fn unreachable_err(operation: &str, e: reqwest::Error) -> AppError {
    REGISTRY_CALLS
        .with_label_values(&[operation, "unreachable"])
        .inc();
    AppError::UpstreamUnavailable(anyhow::anyhow!("registry {} call failed: {}", operation, e))
}

async fn check_status(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        REGISTRY_CALLS.with_label_values(&[operation, "ok"]).inc();
        return Ok(response);
    }

    REGISTRY_CALLS
        .with_label_values(&[operation, "rejected"])
        .inc();
    let detail = response.text().await.unwrap_or_default();
    tracing::error!(
        operation = operation,
        status = status.as_u16(),
        detail = %detail,
        "registry rejected the request"
    );
    Err(AppError::UpstreamRejected {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait]
impl ResourceRegistry for RegistryHttpClient {
    #[instrument(skip(self))]
    async fn user_identifier(&self, sub: &str) -> Result<Option<String>, AppError> {
        let token = self.admin_token().await?;
        let url = format!("{}/{}", self.config.user_attribute_url, sub);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| unreachable_err("user_identifier", e))?;
        let response = check_status("user_identifier", response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| unreachable_err("user_identifier", e))?;
        // A user without the attribute yields an unparsable envelope;
        // that is the "not yet provisioned" case, not an error.
        let identifier = serde_json::from_str::<AttributesEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.attributes.device_policy_list.into_iter().next());
        Ok(identifier)
    }

    #[instrument(skip(self))]
    async fn assign_user_identifier(&self, sub: &str) -> Result<String, AppError> {
        let token = self.admin_token().await?;
        let url = format!("{}/{}", self.config.user_attribute_url, sub);
        let identifier = Uuid::new_v4().to_string();

        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "attributes": { "device_policy_list": identifier }
            }))
            .send()
            .await
            .map_err(|e| unreachable_err("assign_user_identifier", e))?;
        check_status("assign_user_identifier", response).await?;

        Ok(identifier)
    }

    #[instrument(skip(self))]
    async fn available_policies(&self) -> Result<Vec<String>, AppError> {
        let token = self.admin_token().await?;

        let response = self
            .http
            .get(&self.config.policy_url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| unreachable_err("available_policies", e))?;
        let response = check_status("available_policies", response).await?;

        let roles: Vec<RoleName> = response
            .json()
            .await
            .map_err(|e| unreachable_err("available_policies", e))?;
        Ok(roles
            .into_iter()
            .map(|role| role.name)
            .filter(|name| name != INTERNAL_ROLE)
            .collect())
    }

    #[instrument(skip(self, service), fields(service_id = %service.name))]
    async fn register_service(&self, service: &Service) -> Result<String, AppError> {
        let token = self.client_token().await?;

        let response = self
            .http
            .post(&self.config.resource_url)
            .bearer_auth(&token)
            .json(service)
            .send()
            .await
            .map_err(|e| unreachable_err("register_service", e))?;
        let response = check_status("register_service", response).await?;

        let created: ResourceCreated = response
            .json()
            .await
            .map_err(|e| unreachable_err("register_service", e))?;
        Ok(created.id)
    }

    #[instrument(skip(self, service), fields(service_id = %service.name))]
    async fn update_service(
        &self,
        identifier: &str,
        service: &Service,
    ) -> Result<(), AppError> {
        let token = self.client_token().await?;
        let url = format!("{}/{}", self.config.resource_url, identifier);

        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .json(service)
            .send()
            .await
            .map_err(|e| unreachable_err("update_service", e))?;
        check_status("update_service", response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, identifier: &str) -> Result<(), AppError> {
        let token = self.client_token().await?;
        let url = format!("{}/{}", self.config.resource_url, identifier);

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| unreachable_err("delete_service", e))?;
        check_status("delete_service", response).await?;
        Ok(())
    }
}
