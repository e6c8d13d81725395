//! Postgres-backed policy store.

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::models::{Device, Service};
use crate::services::metrics::DB_QUERY_DURATION;

/// CRUD boundary over device/service policy documents keyed by
/// (entity id, owner).
///
/// Lookups return `Option`; turning an absent row into `NotFound` is an
/// orchestration decision, not a storage one.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn insert_device(
        &self,
        registry_identifier: &str,
        device: &Device,
        username: &str,
    ) -> Result<(), AppError>;
    async fn update_device(&self, device: &Device, username: &str) -> Result<(), AppError>;
    async fn delete_device(&self, device_id: &str, username: &str) -> Result<(), AppError>;
    async fn device(&self, device_id: &str) -> Result<Option<Device>, AppError>;
    async fn devices_for_user(
        &self,
        registry_identifier: &str,
        username: &str,
    ) -> Result<Vec<Device>, AppError>;

    async fn insert_service(
        &self,
        registry_identifier: &str,
        username: &str,
        service: &Service,
    ) -> Result<(), AppError>;
    async fn update_service(&self, service: &Service, username: &str) -> Result<(), AppError>;
    async fn delete_service(&self, service_id: &str, username: &str) -> Result<(), AppError>;
    async fn service_registry_identifier(
        &self,
        service_id: &str,
        username: &str,
    ) -> Result<Option<String>, AppError>;
    async fn services_for_user(&self, username: &str) -> Result<Vec<Service>, AppError>;
    /// Required scopes of a service, looked up without an owner: the
    /// gateway filter addresses services by id alone.
    async fn service_scopes(&self, service_id: &str) -> Result<Option<Service>, AppError>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "pep-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::StoreFailure(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::StoreFailure(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Explicit pool teardown for graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn encode<T: serde::Serialize>(document: &T) -> Result<String, AppError> {
        serde_json::to_string(document)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode document: {}", e)))
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::StoreFailure(anyhow::anyhow!("Corrupt policy document: {}", e)))
    }
}

fn store_err(query: &str, e: sqlx::Error) -> AppError {
    AppError::StoreFailure(anyhow::anyhow!("{} failed: {}", query, e))
}

#[async_trait]
impl PolicyStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreFailure(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    async fn insert_device(
        &self,
        registry_identifier: &str,
        device: &Device,
        username: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_device"])
            .start_timer();

        sqlx::query(
            "INSERT INTO device_mapping (registry_identifier, device_id, username, policy_document)
             VALUES ($1, $2, $3, $4::jsonb)",
        )
        .bind(registry_identifier)
        .bind(&device.device_id)
        .bind(username)
        .bind(Self::encode(device)?)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_device", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, device), fields(device_id = %device.device_id))]
    async fn update_device(&self, device: &Device, username: &str) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_device"])
            .start_timer();

        sqlx::query(
            "UPDATE device_mapping SET policy_document = $1::jsonb
             WHERE device_id = $2 AND username = $3",
        )
        .bind(Self::encode(device)?)
        .bind(&device.device_id)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("update_device", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_device(&self, device_id: &str, username: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM device_mapping WHERE device_id = $1 AND username = $2")
            .bind(device_id)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("delete_device", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn device(&self, device_id: &str) -> Result<Option<Device>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["device"])
            .start_timer();

        let raw: Option<String> = sqlx::query_scalar(
            "SELECT policy_document::text FROM device_mapping WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("device", e))?;

        timer.observe_duration();
        raw.map(|doc| Self::decode(&doc)).transpose()
    }

    #[instrument(skip(self))]
    async fn devices_for_user(
        &self,
        registry_identifier: &str,
        username: &str,
    ) -> Result<Vec<Device>, AppError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT policy_document::text FROM device_mapping
             WHERE username = $1 AND registry_identifier = $2",
        )
        .bind(username)
        .bind(registry_identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("devices_for_user", e))?;

        rows.iter().map(|doc| Self::decode(doc)).collect()
    }

    #[instrument(skip(self, service), fields(service_id = %service.name))]
    async fn insert_service(
        &self,
        registry_identifier: &str,
        username: &str,
        service: &Service,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_service"])
            .start_timer();

        sqlx::query(
            "INSERT INTO service_mapping (registry_identifier, service_id, username, policy_document)
             VALUES ($1, $2, $3, $4::jsonb)",
        )
        .bind(registry_identifier)
        .bind(&service.name)
        .bind(username)
        .bind(Self::encode(service)?)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert_service", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, service), fields(service_id = %service.name))]
    async fn update_service(&self, service: &Service, username: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE service_mapping SET policy_document = $1::jsonb
             WHERE service_id = $2 AND username = $3",
        )
        .bind(Self::encode(service)?)
        .bind(&service.name)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("update_service", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, service_id: &str, username: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM service_mapping WHERE service_id = $1 AND username = $2")
            .bind(service_id)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("delete_service", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn service_registry_identifier(
        &self,
        service_id: &str,
        username: &str,
    ) -> Result<Option<String>, AppError> {
        let identifier: Option<Option<String>> = sqlx::query_scalar(
            "SELECT registry_identifier FROM service_mapping
             WHERE service_id = $1 AND username = $2",
        )
        .bind(service_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("service_registry_identifier", e))?;

        Ok(identifier.flatten())
    }

    #[instrument(skip(self))]
    async fn services_for_user(&self, username: &str) -> Result<Vec<Service>, AppError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT policy_document::text FROM service_mapping WHERE username = $1",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("services_for_user", e))?;

        rows.iter().map(|doc| Self::decode(doc)).collect()
    }

    #[instrument(skip(self))]
    async fn service_scopes(&self, service_id: &str) -> Result<Option<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["service_scopes"])
            .start_timer();

        let raw: Option<String> = sqlx::query_scalar(
            "SELECT policy_document::text FROM service_mapping WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("service_scopes", e))?;

        timer.observe_duration();
        raw.map(|doc| Self::decode(&doc)).transpose()
    }
}
