//! Common test utilities for pep-service integration tests.
//!
//! The router is exercised in-process through `tower::ServiceExt`; the
//! policy store and the identity registry are in-memory fakes, so no
//! Postgres or registry instance is required.

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pep_service::config::{
    DatabaseConfig, Environment, PepConfig, RegistryConfig, SecurityConfig,
};
use pep_service::middleware::BearerVerifier;
use pep_service::models::{Device, Service};
use pep_service::services::{PolicyService, PolicySigner, PolicyStore, ResourceRegistry};
use pep_service::{build_router, AppState};
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;

pub const ISSUER: &str = "http://localhost/auth/realms/test";

/// One key pair per concern per test process; RSA generation is too
/// slow to repeat per test.
static REALM_KEY_PAIR: Lazy<(String, String)> = Lazy::new(generate_key_pair);
static SIGNING_KEY_PAIR: Lazy<(String, String)> = Lazy::new(generate_key_pair);

fn generate_key_pair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("generate test key");
    let public_key = RsaPublicKey::from(&private_key);
    (
        private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode private key")
            .to_string(),
        public_key
            .to_public_key_pem(LineEnding::LF)
            .expect("encode public key"),
    )
}

#[derive(Serialize)]
struct TestClaims {
    preferred_username: String,
    sub: String,
    iss: String,
    exp: i64,
    realm_access: serde_json::Value,
}

/// Mint a bearer token the app's verifier accepts.
pub fn bearer_token(username: &str, roles: &[&str]) -> String {
    let claims = TestClaims {
        preferred_username: username.to_string(),
        sub: format!("sub-{}", username),
        iss: ISSUER.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp(),
        realm_access: serde_json::json!({ "roles": roles }),
    };
    encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &EncodingKey::from_rsa_pem(REALM_KEY_PAIR.0.as_bytes()).expect("test encoding key"),
    )
    .expect("sign test bearer token")
}

#[derive(Default)]
pub struct InMemoryStore {
    devices: Mutex<HashMap<(String, String), (String, Device)>>,
    services: Mutex<HashMap<(String, String), (Option<String>, Service)>>,
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_device(
        &self,
        registry_identifier: &str,
        device: &Device,
        username: &str,
    ) -> Result<(), AppError> {
        self.devices.lock().unwrap().insert(
            (device.device_id.clone(), username.to_string()),
            (registry_identifier.to_string(), device.clone()),
        );
        Ok(())
    }

    async fn update_device(&self, device: &Device, username: &str) -> Result<(), AppError> {
        let mut devices = self.devices.lock().unwrap();
        if let Some(entry) = devices.get_mut(&(device.device_id.clone(), username.to_string())) {
            entry.1 = device.clone();
        }
        Ok(())
    }

    async fn delete_device(&self, device_id: &str, username: &str) -> Result<(), AppError> {
        self.devices
            .lock()
            .unwrap()
            .remove(&(device_id.to_string(), username.to_string()));
        Ok(())
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>, AppError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .find(|((id, _), _)| id == device_id)
            .map(|(_, (_, device))| device.clone()))
    }

    async fn devices_for_user(
        &self,
        registry_identifier: &str,
        username: &str,
    ) -> Result<Vec<Device>, AppError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|((_, user), (identifier, _))| {
                user == username && identifier == registry_identifier
            })
            .map(|(_, (_, device))| device.clone())
            .collect())
    }

    async fn insert_service(
        &self,
        registry_identifier: &str,
        username: &str,
        service: &Service,
    ) -> Result<(), AppError> {
        self.services.lock().unwrap().insert(
            (service.name.clone(), username.to_string()),
            (Some(registry_identifier.to_string()), service.clone()),
        );
        Ok(())
    }

    async fn update_service(&self, service: &Service, username: &str) -> Result<(), AppError> {
        let mut services = self.services.lock().unwrap();
        if let Some(entry) = services.get_mut(&(service.name.clone(), username.to_string())) {
            entry.1 = service.clone();
        }
        Ok(())
    }

    async fn delete_service(&self, service_id: &str, username: &str) -> Result<(), AppError> {
        self.services
            .lock()
            .unwrap()
            .remove(&(service_id.to_string(), username.to_string()));
        Ok(())
    }

    async fn service_registry_identifier(
        &self,
        service_id: &str,
        username: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(&(service_id.to_string(), username.to_string()))
            .and_then(|(identifier, _)| identifier.clone()))
    }

    async fn services_for_user(&self, username: &str) -> Result<Vec<Service>, AppError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|((_, user), _)| user == username)
            .map(|(_, (_, service))| service.clone())
            .collect())
    }

    async fn service_scopes(&self, service_id: &str) -> Result<Option<Service>, AppError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .find(|((id, _), _)| id == service_id)
            .map(|(_, (_, service))| service.clone()))
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    identifiers: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ResourceRegistry for FakeRegistry {
    async fn user_identifier(&self, sub: &str) -> Result<Option<String>, AppError> {
        Ok(self.identifiers.lock().unwrap().get(sub).cloned())
    }

    async fn assign_user_identifier(&self, sub: &str) -> Result<String, AppError> {
        let identifier = format!("registry-{}", sub);
        self.identifiers
            .lock()
            .unwrap()
            .insert(sub.to_string(), identifier.clone());
        Ok(identifier)
    }

    async fn available_policies(&self) -> Result<Vec<String>, AppError> {
        Ok(vec![
            "anonymization_policy".to_string(),
            "commercial_policy".to_string(),
            "storage_policy".to_string(),
        ])
    }

    async fn register_service(&self, service: &Service) -> Result<String, AppError> {
        Ok(format!("resource-{}", service.name))
    }

    async fn update_service(&self, _identifier: &str, _service: &Service) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete_service(&self, _identifier: &str) -> Result<(), AppError> {
        Ok(())
    }
}

fn test_config() -> PepConfig {
    PepConfig {
        common: CommonConfig { port: 0 },
        environment: Environment::Dev,
        service_name: "pep-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        registry: RegistryConfig {
            admin_token_url: "http://registry.invalid/token".to_string(),
            admin_client_id: "admin-cli".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            admin_grant_type: "password".to_string(),
            client_token_url: "http://registry.invalid/token".to_string(),
            client_id: "pep".to_string(),
            client_secret: "secret".to_string(),
            client_grant_type: "client_credentials".to_string(),
            resource_url: "http://registry.invalid/resource".to_string(),
            policy_url: "http://registry.invalid/policy".to_string(),
            user_attribute_url: "http://registry.invalid/users".to_string(),
            request_timeout_seconds: 1,
        },
        security: SecurityConfig {
            issuer: ISSUER.to_string(),
            bearer_algorithm: "RS256".to_string(),
            realm_public_key_path: "unused".to_string(),
            signing_private_key_path: "unused".to_string(),
            signing_public_key_path: "unused".to_string(),
            signing_algorithm: "RS256".to_string(),
        },
    }
}

/// Build the full router over in-memory fakes.
pub fn spawn_app() -> Router {
    let store: Arc<dyn PolicyStore> = Arc::new(InMemoryStore::default());
    let registry = Arc::new(FakeRegistry::default());
    let signer = Arc::new(
        PolicySigner::from_pem(
            SIGNING_KEY_PAIR.0.as_bytes(),
            SIGNING_KEY_PAIR.1.as_bytes(),
            Algorithm::RS256,
        )
        .expect("build test signer"),
    );
    let bearer = Arc::new(
        BearerVerifier::from_pem(REALM_KEY_PAIR.1.as_bytes(), Algorithm::RS256, ISSUER)
            .expect("build test bearer verifier"),
    );

    let policy = PolicyService::new(store.clone(), registry, signer);

    build_router(AppState {
        config: test_config(),
        store,
        policy,
        bearer,
    })
}
