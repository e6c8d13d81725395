//! Use-case orchestration: the functions the HTTP surface delegates to.
//!
//! Cross-system consistency caveat: service writes are a registry call
//! followed by a store write, in that order, without a transaction. A
//! failure between the two steps leaves the systems inconsistent; the
//! error is surfaced immediately and the caller is expected to retry
//! the whole operation.

use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;

use crate::dtos::{PolicyUpdated, ServiceUpdated, SignedMessage};
use crate::models::{Device, GatewayService, Requester, Service, UserDevicesPolicy, UserServicesPolicies};
use crate::services::compat::is_service_allowed;
use crate::services::database::PolicyStore;
use crate::services::metrics::FILTER_DECISIONS;
use crate::services::registry::ResourceRegistry;
use crate::services::signer::PolicySigner;

#[derive(Clone)]
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    registry: Arc<dyn ResourceRegistry>,
    signer: Arc<PolicySigner>,
}

impl PolicyService {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        registry: Arc<dyn ResourceRegistry>,
        signer: Arc<PolicySigner>,
    ) -> Self {
        Self {
            store,
            registry,
            signer,
        }
    }

    // -------------------------------------------------------------------
    // Device policies
    // -------------------------------------------------------------------

    /// Register a device's policy list for the requesting user.
    ///
    /// Resolves the user's registry identifier first, provisioning one
    /// on first use; the identifier is persisted at the registry before
    /// the first store write so re-registrations reuse it.
    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    pub async fn register_device(
        &self,
        requester: &Requester,
        device: &Device,
    ) -> Result<PolicyUpdated, AppError> {
        let identifier = match self.registry.user_identifier(&requester.sub).await? {
            Some(identifier) => identifier,
            None => self.registry.assign_user_identifier(&requester.sub).await?,
        };

        self.store
            .insert_device(&identifier, device, &requester.preferred_username)
            .await?;
        Ok(PolicyUpdated::default())
    }

    /// Direct pass-through: the registry identifier is set once at
    /// first registration and not re-derived here.
    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    pub async fn update_device(
        &self,
        requester: &Requester,
        device: &Device,
    ) -> Result<PolicyUpdated, AppError> {
        self.store
            .update_device(device, &requester.preferred_username)
            .await?;
        Ok(PolicyUpdated::default())
    }

    #[instrument(skip(self))]
    pub async fn delete_device(
        &self,
        requester: &Requester,
        device_id: &str,
    ) -> Result<PolicyUpdated, AppError> {
        self.store
            .delete_device(device_id, &requester.preferred_username)
            .await?;
        Ok(PolicyUpdated::default())
    }

    /// The available-policy vocabulary plus the requester's devices.
    #[instrument(skip(self))]
    pub async fn user_device_policies(
        &self,
        requester: &Requester,
    ) -> Result<UserDevicesPolicy, AppError> {
        let available_policy = self.registry.available_policies().await?;

        let device_policy_list = match self.registry.user_identifier(&requester.sub).await? {
            Some(identifier) => {
                self.store
                    .devices_for_user(&identifier, &requester.preferred_username)
                    .await?
            }
            // Never registered anything: no namespace yet.
            None => Vec::new(),
        };

        Ok(UserDevicesPolicy {
            available_policy,
            device_policy_list,
        })
    }

    /// Produce the signed statement of a device's current policy list.
    #[instrument(skip(self))]
    pub async fn signed_device_statement(
        &self,
        device_id: &str,
    ) -> Result<SignedMessage, AppError> {
        let device = self
            .store
            .device(device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("device not found")))?;

        let payload = device
            .canonical_bytes()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Encoding failed: {}", e)))?;
        let signature = self.signer.sign(&payload)?;
        Ok(SignedMessage { signature })
    }

    // -------------------------------------------------------------------
    // Service policies
    // -------------------------------------------------------------------

    /// Register a service: registry first (to obtain the identifier
    /// linking the rows), then the store.
    #[instrument(skip(self, service), fields(service_id = %service.name))]
    pub async fn register_service(
        &self,
        requester: &Requester,
        service: &Service,
    ) -> Result<ServiceUpdated, AppError> {
        let identifier = self.registry.register_service(service).await?;
        self.store
            .insert_service(&identifier, &requester.preferred_username, service)
            .await?;
        Ok(ServiceUpdated::default())
    }

    #[instrument(skip(self, service), fields(service_id = %service.name))]
    pub async fn update_service(
        &self,
        requester: &Requester,
        service: &Service,
    ) -> Result<ServiceUpdated, AppError> {
        let identifier = self
            .store
            .service_registry_identifier(&service.name, &requester.preferred_username)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("service {} not found", service.name))
            })?;

        self.registry.update_service(&identifier, service).await?;
        self.store
            .update_service(service, &requester.preferred_username)
            .await?;
        Ok(ServiceUpdated::default())
    }

    /// Delete a service. A service with no registry identifier is
    /// treated as already deleted: success, registry untouched.
    #[instrument(skip(self))]
    pub async fn delete_service(
        &self,
        requester: &Requester,
        service_id: &str,
    ) -> Result<ServiceUpdated, AppError> {
        if let Some(identifier) = self
            .store
            .service_registry_identifier(service_id, &requester.preferred_username)
            .await?
        {
            self.registry.delete_service(&identifier).await?;
            self.store
                .delete_service(service_id, &requester.preferred_username)
                .await?;
        }
        Ok(ServiceUpdated::default())
    }

    #[instrument(skip(self))]
    pub async fn user_service_policies(
        &self,
        requester: &Requester,
    ) -> Result<UserServicesPolicies, AppError> {
        let available_policy = self.registry.available_policies().await?;
        let service_policy_list = self
            .store
            .services_for_user(&requester.preferred_username)
            .await?;

        Ok(UserServicesPolicies {
            available_policy,
            service_policy_list,
        })
    }

    // -------------------------------------------------------------------
    // Gateway filtering
    // -------------------------------------------------------------------

    /// Filter the candidate services down to those whose required
    /// scopes the signed device satisfies.
    ///
    /// The token must verify before any filtering proceeds; a
    /// verification failure is an authentication failure, not an empty
    /// result. Input order is preserved; an unknown listed service id
    /// fails the whole request.
    #[instrument(skip(self, request), fields(candidates = request.service_list.len()))]
    pub async fn filter_services(
        &self,
        request: &GatewayService,
    ) -> Result<Vec<Service>, AppError> {
        let device = self.signer.verify(&request.sign_device)?;

        // One clock snapshot for the whole pass.
        let now = Utc::now().naive_utc();

        let mut allowed = Vec::new();
        for service_id in &request.service_list {
            let service = self.store.service_scopes(service_id).await?.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("service {} not found", service_id))
            })?;

            if is_service_allowed(
                &service.resource_scopes,
                &device.policy_list,
                device.storage_policy,
                now,
            ) {
                FILTER_DECISIONS.with_label_values(&["allowed"]).inc();
                allowed.push(service);
            } else {
                FILTER_DECISIONS.with_label_values(&["denied"]).inc();
            }
        }
        Ok(allowed)
    }
}
