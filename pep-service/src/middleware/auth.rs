use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use service_core::error::AppError;
use std::fs;
use std::str::FromStr;

use crate::config::SecurityConfig;
use crate::models::Requester;
use crate::AppState;

/// Realm role required to manage device policies.
pub const DEVICE_OWNER_ROLE: &str = "device_owner";
/// Realm role required to manage service policies.
pub const SERVICE_OWNER_ROLE: &str = "service_owner";

#[derive(Debug, Deserialize)]
struct RealmAccess {
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BearerClaims {
    preferred_username: String,
    sub: String,
    realm_access: RealmAccess,
}

/// Verifies inbound bearer tokens against the identity realm's public
/// key and checks realm-role membership.
pub struct BearerVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl BearerVerifier {
    pub fn new(config: &SecurityConfig) -> Result<Self, AppError> {
        let public_pem = fs::read(&config.realm_public_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read realm public key from {}: {}",
                config.realm_public_key_path,
                e
            ))
        })?;
        let algorithm = Algorithm::from_str(&config.bearer_algorithm).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unsupported bearer algorithm {}: {}",
                config.bearer_algorithm,
                e
            ))
        })?;
        Self::from_pem(&public_pem, algorithm, &config.issuer)
    }

    pub fn from_pem(
        public_pem: &[u8],
        algorithm: Algorithm,
        issuer: &str,
    ) -> Result<Self, AppError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_pem).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid realm public key: {}", e))
        })?;

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        // The realm issues audience-less tokens for this service.
        validation.validate_aud = false;

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Decode the token and check the required realm role, yielding
    /// the identity the orchestration layer consumes.
    pub fn requester(&self, token: &str, required_role: &str) -> Result<Requester, AppError> {
        let data = decode::<BearerClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("invalid_bearer_token")))?;

        if !data
            .claims
            .realm_access
            .roles
            .iter()
            .any(|role| role == required_role)
        {
            tracing::debug!(roles = ?data.claims.realm_access.roles, "missing realm role");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "invalid_bearer_token"
            )));
        }

        Ok(Requester {
            preferred_username: data.claims.preferred_username,
            sub: data.claims.sub,
        })
    }
}

async fn authorize(
    state: &AppState,
    mut req: Request,
    next: Next,
    required_role: &str,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let requester = state.bearer.requester(token, required_role)?;

    // Handlers pick the identity up through the extractor below.
    req.extensions_mut().insert(requester);
    Ok(next.run(req).await)
}

pub async fn device_owner_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, req, next, DEVICE_OWNER_ROLE).await
}

pub async fn service_owner_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, req, next, SERVICE_OWNER_ROLE).await
}

/// Extractor handing handlers the verified requester identity.
pub struct OwnerIdentity(pub Requester);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OwnerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let requester = parts.extensions.get::<Requester>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Requester missing from request extensions"
            ))
        })?;
        Ok(OwnerIdentity(requester.clone()))
    }
}
