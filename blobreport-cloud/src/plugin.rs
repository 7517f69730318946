//! The Azure Blob Storage publisher.

use crate::auth::StorageAuth;
use crate::blob_client::{BlobServiceClient, ContainerClient, build_http_client};
use crate::config::{CredentialMode, PipelineOptions, PluginCreateOptions, WorkingDirs};
use crate::content_type::{ContentTypeDetector, SniffingDetector};
use crate::credential::{DefaultCredential, TokenCredential};
use crate::error::CloudResult;
use crate::issuer::{SigningAuthority, TokenIssuer};
use crate::publisher::{FileItem, ObjectListResult, Publisher, RemoteFileItem};
use async_trait::async_trait;
use blobreport_sas::{
    AccessToken, BOOTSTRAP_SCRIPT, CACHE_WORKER_CONTENT_TYPE, CACHE_WORKER_FILE,
    CACHE_WORKER_SCRIPT, is_patched, patch_entry_page,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Name the publisher is registered under in the host config.
pub const PLUGIN_NAME: &str = "reg-publish-azure-blob-storage-plugin";

/// Result of a publish run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// Where the report can be viewed, with the access token when one was
    /// issued. `None` when the report has no entry page.
    pub report_url: Option<String>,
}

/// Publishes report directories to a blob container.
pub struct AzureBlobPublisher {
    options: PluginCreateOptions,
    container: ContainerClient,
    issuer: TokenIssuer,
    detector: Arc<dyn ContentTypeDetector>,
}

impl AzureBlobPublisher {
    /// Validates the config and resolves credentials. Delegated mode reads
    /// its identity from the process environment.
    pub fn init(options: PluginCreateOptions) -> CloudResult<Self> {
        options.options.validate()?;
        let http = build_http_client(&options.options.options)?;
        let credential = match options.options.credential_mode() {
            CredentialMode::Delegated => {
                Some(Arc::new(DefaultCredential::from_env(http.clone())) as Arc<dyn TokenCredential>)
            }
            CredentialMode::SharedKey => None,
        };
        Self::build(options, http, credential)
    }

    /// Like [`AzureBlobPublisher::init`], with an explicit delegated identity.
    pub fn init_with_credential(
        options: PluginCreateOptions,
        credential: Arc<dyn TokenCredential>,
    ) -> CloudResult<Self> {
        options.options.validate()?;
        let http = build_http_client(&options.options.options)?;
        Self::build(options, http, Some(credential))
    }

    fn build(
        options: PluginCreateOptions,
        http: reqwest::Client,
        credential: Option<Arc<dyn TokenCredential>>,
    ) -> CloudResult<Self> {
        let config = &options.options;
        let shared_key = config.shared_key()?;

        let (auth, authority) = match (config.credential_mode(), credential) {
            (CredentialMode::Delegated, Some(credential)) => {
                let auth = StorageAuth::Bearer(credential);
                let client = BlobServiceClient::new(http.clone(), config.endpoint(), auth.clone());
                (auth, SigningAuthority::Delegated { client })
            }
            (_, _) => match shared_key {
                Some(key) => (StorageAuth::SharedKey(key.clone()), SigningAuthority::SharedKey(key)),
                None => {
                    warn!("no account key configured, requests are sent anonymously");
                    (StorageAuth::Anonymous, SigningAuthority::Unavailable)
                }
            },
        };

        let service = BlobServiceClient::new(http, config.endpoint(), auth);
        let container = service.container(config.container_name.clone());
        let issuer = TokenIssuer::new(config, authority);
        info!(
            "publisher ready for {} ({:?} credentials)",
            container.url(),
            config.credential_mode()
        );

        Ok(Self {
            options,
            container,
            issuer,
            detector: Arc::new(SniffingDetector),
        })
    }

    /// Uploads the report under `key` and returns where to view it.
    pub async fn publish(&self, key: &str) -> CloudResult<PublishOutcome> {
        let published = self.publish_internal(key).await?;
        let resolved = self.resolve_in_bucket(key);
        let token = self.issuer.issue().await?;

        if let (Some(_), Some(index_file)) = (self.issuer.lifetime_hours(), &published.index_file) {
            self.add_auth_script(index_file, &resolved).await?;
        }

        let report_url = published
            .index_file
            .as_ref()
            .map(|index_file| self.report_url(&resolved, &index_file.path, token.as_ref()));
        if let Some(url) = &report_url {
            info!("report published at {}", url.split('?').next().unwrap_or(url));
        }
        Ok(PublishOutcome { report_url })
    }

    /// Downloads the snapshots published under `key` into the expected
    /// directory.
    pub async fn fetch(&self, key: &str) -> CloudResult<Vec<FileItem>> {
        self.fetch_internal(key).await
    }

    /// Issues a token with the configured lifetime, if signing is set up.
    pub async fn issue_token(&self) -> CloudResult<Option<AccessToken>> {
        self.issuer.issue().await
    }

    /// `{endpoint}/{container}/{resolved_key}/{index_path}`, plus `?token`.
    pub fn report_url(&self, resolved_key: &str, index_path: &str, token: Option<&AccessToken>) -> String {
        let base = format!("{}/{resolved_key}/{index_path}", self.container.url());
        match token {
            Some(token) => format!("{base}?{}", token.to_query_string()),
            None => base,
        }
    }

    /// Injects the bootstrapper into the entry page and uploads it along
    /// with the cache worker.
    async fn add_auth_script(&self, index_file: &FileItem, resolved_key: &str) -> CloudResult<()> {
        if self.no_emit() {
            info!("noEmit set, skipping entry page patch");
            return Ok(());
        }

        let html = tokio::fs::read(&index_file.abs_path).await?;
        let html = if is_patched(&html) {
            warn!("{} already carries the bootstrapper, not patching again", index_file.path);
            html
        } else {
            let patched = patch_entry_page(&html, BOOTSTRAP_SCRIPT)?;
            tokio::fs::write(&index_file.abs_path, &patched).await?;
            patched
        };

        let index_key = format!("{resolved_key}/{}", index_file.path);
        self.container
            .upload_block_blob(&index_key, html, "text/html")
            .await?;

        let worker_key = format!("{resolved_key}/{CACHE_WORKER_FILE}");
        self.container
            .upload_block_blob(
                &worker_key,
                CACHE_WORKER_SCRIPT.as_bytes().to_vec(),
                CACHE_WORKER_CONTENT_TYPE,
            )
            .await?;

        info!("entry page patched and cache worker uploaded under {resolved_key}");
        Ok(())
    }
}

#[async_trait]
impl Publisher for AzureBlobPublisher {
    fn bucket_name(&self) -> &str {
        self.container.name()
    }

    fn bucket_root_dir(&self) -> Option<&str> {
        self.options.options.path_prefix.as_deref()
    }

    fn local_glob_pattern(&self) -> Option<&str> {
        self.options.options.pattern.as_deref()
    }

    fn working_dirs(&self) -> &WorkingDirs {
        &self.options.working_dirs
    }

    fn no_emit(&self) -> bool {
        self.options.no_emit
    }

    fn pipeline_options(&self) -> &PipelineOptions {
        &self.options.options.options
    }

    async fn upload_item(&self, key: &str, item: &FileItem) -> CloudResult<FileItem> {
        let data = tokio::fs::read(&item.abs_path).await?;
        let mime_type = self.detector.detect(Path::new(&item.path), &data);
        self.container
            .upload_block_blob(&format!("{key}/{}", item.path), data, &mime_type)
            .await?;
        Ok(FileItem {
            mime_type,
            ..item.clone()
        })
    }

    async fn download_item(
        &self,
        remote: &RemoteFileItem,
        item: &FileItem,
    ) -> CloudResult<FileItem> {
        let data = self.container.download_blob(&remote.remote_path).await?;
        if let Some(parent) = item.abs_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&item.abs_path, &data).await?;
        Ok(item.clone())
    }

    async fn list_items(
        &self,
        last_key: Option<&str>,
        prefix: &str,
    ) -> CloudResult<ObjectListResult> {
        let page = self.container.list_blobs_page(prefix, last_key).await?;
        let is_last_page = page.is_last_page();
        Ok(ObjectListResult {
            contents: page
                .blobs
                .into_iter()
                .map(|blob| RemoteFileItem {
                    remote_path: blob.name,
                })
                .collect(),
            next_marker: page.next_marker,
            is_last_page,
        })
    }
}
