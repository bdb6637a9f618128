//! Builds storage backends from `[storage]` configuration.
//!
//! Cloud stores are configured from the config file only; builders are
//! never seeded from process environment variables.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::ObjectStore;
use querent_core::config::{AzureStorageConfig, GcsStorageConfig, S3StorageConfig, StorageConfig};
use querent_core::types::BackendKind;
use tracing::{debug, info};

use crate::backend::{DriveBackend, DriveClient, LocalBackend, ObjectStoreBackend};
use crate::error::ExportError;
use crate::exporter::StorageExporter;

/// Build an exporter with every backend the configuration describes.
///
/// The local backend is always available. Cloud backends are registered
/// when their bucket/container is set; Drive only when a client is given.
pub fn build_exporter(
    config: &StorageConfig,
    drive_client: Option<Arc<dyn DriveClient>>,
) -> Result<StorageExporter, ExportError> {
    let default_backend: BackendKind = config
        .backend
        .parse()
        .map_err(ExportError::Config)?;

    let mut exporter = StorageExporter::new(default_backend, config.path_prefix.clone());
    exporter.register(Arc::new(LocalBackend::new(&config.local.root)));

    if !config.s3.bucket.is_empty() {
        let store = build_s3(&config.s3)?;
        exporter.register(Arc::new(ObjectStoreBackend::s3(&config.s3.bucket, store)));
        debug!(bucket = %config.s3.bucket, "S3 backend configured");
    }
    if !config.azure.container.is_empty() {
        let store = build_azure(&config.azure)?;
        exporter.register(Arc::new(ObjectStoreBackend::azure(&config.azure.container, store)));
        debug!(container = %config.azure.container, "Azure backend configured");
    }
    if !config.gcs.bucket.is_empty() {
        let store = build_gcs(&config.gcs)?;
        exporter.register(Arc::new(ObjectStoreBackend::gcs(&config.gcs.bucket, store)));
        debug!(bucket = %config.gcs.bucket, "GCS backend configured");
    }
    if let Some(client) = drive_client {
        exporter.register(Arc::new(DriveBackend::new(
            client,
            config.gdrive.folder_id.clone(),
        )));
        debug!("Drive backend configured");
    }

    if !exporter.has_backend(default_backend) {
        return Err(ExportError::Config(format!(
            "default storage backend '{}' is not configured",
            default_backend
        )));
    }

    info!(default = %default_backend, "Storage exporter ready");
    Ok(exporter)
}

fn build_s3(cfg: &S3StorageConfig) -> Result<Arc<dyn ObjectStore>, ExportError> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&cfg.bucket)
        .with_region(&cfg.region);

    if let Some(endpoint) = &cfg.endpoint {
        // Path-style requests for S3-compatible services such as MinIO.
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(key) = &cfg.access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = &cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }

    let store = builder
        .build()
        .map_err(|e| ExportError::Config(format!("S3: {}", e)))?;
    Ok(Arc::new(store))
}

fn build_azure(cfg: &AzureStorageConfig) -> Result<Arc<dyn ObjectStore>, ExportError> {
    if cfg.account.is_empty() {
        return Err(ExportError::Config(
            "Azure: storage.azure.account is required".to_string(),
        ));
    }
    let mut builder = MicrosoftAzureBuilder::new()
        .with_account(&cfg.account)
        .with_container_name(&cfg.container);
    if let Some(key) = &cfg.access_key {
        builder = builder.with_access_key(key);
    }

    let store = builder
        .build()
        .map_err(|e| ExportError::Config(format!("Azure: {}", e)))?;
    Ok(Arc::new(store))
}

fn build_gcs(cfg: &GcsStorageConfig) -> Result<Arc<dyn ObjectStore>, ExportError> {
    let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&cfg.bucket);
    if let Some(path) = &cfg.service_account_path {
        builder = builder.with_service_account_path(path);
    }

    let store = builder
        .build()
        .map_err(|e| ExportError::Config(format!("GCS: {}", e)))?;
    Ok(Arc::new(store))
}
