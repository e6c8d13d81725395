use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey, Header};
use moka::sync::Cache;
use service_core::error::AppError;
use std::fs;
use std::str::FromStr;

use crate::config::SecurityConfig;
use crate::models::Device;
use crate::services::metrics::SIGNER_OPERATIONS;

/// Number of recent sign/verify results kept per process.
const RESULT_CACHE_SIZE: u64 = 32;

/// Signs canonical device encodings and verifies presented tokens.
///
/// Key material and algorithm are loaded once and immutable for the
/// process lifetime; rotation requires a restart. The result caches are
/// a pure performance optimization: signing is a pure function from
/// content to token, so identical inputs short-circuit to the cached
/// token. Failed verifications are never cached, so malformed input
/// pays the full validation cost on every attempt.
pub struct PolicySigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    header_b64: String,
    sign_cache: Cache<Vec<u8>, String>,
    verify_cache: Cache<String, Device>,
}

impl PolicySigner {
    /// Load the signing key pair from the configured PEM files.
    pub fn new(config: &SecurityConfig) -> Result<Self, AppError> {
        let private_pem = fs::read(&config.signing_private_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read signing private key from {}: {}",
                config.signing_private_key_path,
                e
            ))
        })?;
        let public_pem = fs::read(&config.signing_public_key_path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Failed to read signing public key from {}: {}",
                config.signing_public_key_path,
                e
            ))
        })?;
        let algorithm = Algorithm::from_str(&config.signing_algorithm).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unsupported signing algorithm {}: {}",
                config.signing_algorithm,
                e
            ))
        })?;

        Self::from_pem(&private_pem, &public_pem, algorithm)
    }

    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        algorithm: Algorithm,
    ) -> Result<Self, AppError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid public key: {}", e)))?;

        let header = serde_json::to_vec(&Header::new(algorithm))
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid header: {}", e)))?;

        tracing::info!(algorithm = ?algorithm, "policy signer initialized");

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            header_b64: URL_SAFE_NO_PAD.encode(header),
            sign_cache: Cache::new(RESULT_CACHE_SIZE),
            verify_cache: Cache::new(RESULT_CACHE_SIZE),
        })
    }

    /// Sign a canonical byte sequence, producing a compact token
    /// (`header.payload.signature`, each base64url encoded).
    ///
    /// Idempotent within one process lifetime: equal inputs return the
    /// identical cached token without re-running the signature.
    pub fn sign(&self, payload: &[u8]) -> Result<String, AppError> {
        if let Some(token) = self.sign_cache.get(payload) {
            SIGNER_OPERATIONS.with_label_values(&["sign", "hit"]).inc();
            return Ok(token);
        }

        let message = format!("{}.{}", self.header_b64, URL_SAFE_NO_PAD.encode(payload));
        let signature = crypto::sign(message.as_bytes(), &self.encoding_key, self.algorithm)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Signing failed: {}", e)))?;
        let token = format!("{}.{}", message, signature);

        self.sign_cache.insert(payload.to_vec(), token.clone());
        SIGNER_OPERATIONS.with_label_values(&["sign", "miss"]).inc();
        Ok(token)
    }

    /// Verify a presented token and decode the device claims inside.
    ///
    /// Any failure mode (malformed token, wrong key, tampered payload,
    /// unsupported algorithm) is `InvalidSignature`. Only successful
    /// verifications are cached.
    pub fn verify(&self, token: &str) -> Result<Device, AppError> {
        if let Some(device) = self.verify_cache.get(token) {
            SIGNER_OPERATIONS
                .with_label_values(&["verify", "hit"])
                .inc();
            return Ok(device);
        }

        let device = self.verify_uncached(token).inspect_err(|_| {
            SIGNER_OPERATIONS
                .with_label_values(&["verify", "error"])
                .inc();
        })?;

        self.verify_cache.insert(token.to_string(), device.clone());
        SIGNER_OPERATIONS
            .with_label_values(&["verify", "miss"])
            .inc();
        Ok(device)
    }

    fn verify_uncached(&self, token: &str) -> Result<Device, AppError> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(AppError::InvalidSignature),
            };

        let header = jsonwebtoken::decode_header(token).map_err(|_| AppError::InvalidSignature)?;
        if header.alg != self.algorithm {
            return Err(AppError::InvalidSignature);
        }

        // The signed message is everything before the final dot.
        let message = &token[..header_b64.len() + 1 + payload_b64.len()];
        let valid = crypto::verify(
            signature,
            message.as_bytes(),
            &self.decoding_key,
            self.algorithm,
        )
        .map_err(|_| AppError::InvalidSignature)?;
        if !valid {
            return Err(AppError::InvalidSignature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::InvalidSignature)?;
        serde_json::from_slice(&payload).map_err(|_| AppError::InvalidSignature)
    }
}


#[cfg(test)]
mod tests {
    use super::test_keys::{KEY_PAIR, OTHER_KEY_PAIR};
    use super::*;
    use crate::models::Policy;

    fn signer() -> PolicySigner {
        PolicySigner::from_pem(
            KEY_PAIR.0.as_bytes(),
            KEY_PAIR.1.as_bytes(),
            Algorithm::RS256,
        )
        .unwrap()
    }

    fn device() -> Device {
        Device {
            device_id: "device_a".to_string(),
            policy_list: vec![Policy::CommercialPolicy, Policy::AnonymizationPolicy],
            storage_policy: None,
        }
    }

    #[test]
    fn verify_returns_the_signed_claims() {
        let signer = signer();
        let device = device();
        let token = signer.sign(&device.canonical_bytes().unwrap()).unwrap();

        let decoded = signer.verify(&token).unwrap();
        assert_eq!(decoded, device);
    }

    #[test]
    fn sign_is_deterministic_within_one_process() {
        let signer = signer();
        let bytes = device().canonical_bytes().unwrap();

        let first = signer.sign(&bytes).unwrap();
        let second = signer.sign(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn token_signed_with_another_key_is_rejected() {
        let forger = PolicySigner::from_pem(
            OTHER_KEY_PAIR.0.as_bytes(),
            OTHER_KEY_PAIR.1.as_bytes(),
            Algorithm::RS256,
        )
        .unwrap();
        let token = forger
            .sign(&device().canonical_bytes().unwrap())
            .unwrap();

        let verifier = signer();
        assert!(matches!(
            verifier.verify(&token),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = signer();
        let token = signer.sign(&device().canonical_bytes().unwrap()).unwrap();

        let mut tampered = Device {
            device_id: "device_a".to_string(),
            policy_list: vec![Policy::CommercialPolicy],
            storage_policy: None,
        }
        .canonical_bytes()
        .unwrap();
        tampered.extend_from_slice(b" ");

        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(tampered),
            parts[2]
        );
        assert!(matches!(
            signer.verify(&forged),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let signer = signer();
        for token in ["", "garbage", "a.b", "a.b.c.d", "not even close"] {
            assert!(
                matches!(signer.verify(token), Err(AppError::InvalidSignature)),
                "token {token:?} should be invalid"
            );
        }
    }

    #[test]
    fn failed_verifications_are_not_cached() {
        let signer = signer();
        // A bad token must fail identically on every attempt; a cached
        // failure would surface as a panic or a stale Ok here.
        for _ in 0..3 {
            assert!(matches!(
                signer.verify("aaaa.bbbb.cccc"),
                Err(AppError::InvalidSignature)
            ));
        }
    }
}
