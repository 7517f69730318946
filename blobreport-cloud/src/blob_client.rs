//! Thin client for the blob service REST API.
//!
//! Covers the four calls the publisher makes: Put Blob, List Blobs,
//! Get Blob and Get User Delegation Key.

use crate::auth::StorageAuth;
use crate::config::PipelineOptions;
use crate::error::{CloudError, CloudResult};
use crate::listing::{self, LIST_PAGE_SIZE, ListBlobsPage};
use blobreport_sas::{UserDelegationKey, format_sas_time};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("blobreport/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client from pipeline options.
pub fn build_http_client(options: &PipelineOptions) -> CloudResult<Client> {
    let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    Ok(Client::builder()
        .timeout(Duration::from_secs(options.timeout_secs))
        .user_agent(user_agent)
        .build()?)
}

/// Account-level client.
#[derive(Clone, Debug)]
pub struct BlobServiceClient {
    http: Client,
    endpoint: String,
    auth: StorageAuth,
}

impl BlobServiceClient {
    pub fn new(http: Client, endpoint: impl Into<String>, auth: StorageAuth) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { http, endpoint, auth }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn container(&self, name: impl Into<String>) -> ContainerClient {
        ContainerClient {
            service: self.clone(),
            name: name.into(),
        }
    }

    /// Exchanges the delegated identity for a key valid over `[start, expiry]`.
    pub async fn get_user_delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> CloudResult<UserDelegationKey> {
        if !matches!(self.auth, StorageAuth::Bearer(_)) {
            return Err(CloudError::Delegation(
                "user delegation keys require a delegated identity".into(),
            ));
        }

        let body = listing::key_info_body(&format_sas_time(&start), &format_sas_time(&expiry));
        let builder = self
            .http
            .post(format!("{}/", self.endpoint))
            .query(&[("restype", "service"), ("comp", "userdelegationkey")])
            .header("Content-Type", "application/xml")
            .body(body);

        let resp = self.send(builder).await.map_err(|e| match e {
            CloudError::Storage { status, code, message } => {
                CloudError::Delegation(format!("{status} ({code}): {message}"))
            }
            other => other,
        })?;
        let xml = resp.text().await?;
        listing::parse_user_delegation_key(&xml)
    }

    async fn send(&self, builder: RequestBuilder) -> CloudResult<Response> {
        let mut request = builder.build()?;
        self.auth.authorize(&mut request).await?;
        debug!("{} {}", request.method(), request.url().path());

        let resp = self.http.execute(request).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let header_code = resp
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        let (body_code, body_message) = listing::parse_error_body(&body);

        Err(CloudError::Storage {
            status: status.as_u16(),
            code: header_code.or(body_code).unwrap_or_else(|| "Unknown".into()),
            message: body_message.unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("request failed").to_string()
            }),
        })
    }
}

/// Container-level client.
#[derive(Clone, Debug)]
pub struct ContainerClient {
    service: BlobServiceClient,
    name: String,
}

impl ContainerClient {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `{endpoint}/{container}`.
    pub fn url(&self) -> String {
        format!("{}/{}", self.service.endpoint, self.name)
    }

    fn blob_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.url(), encoded.join("/"))
    }

    /// Put Blob as a block blob, replacing any existing blob.
    pub async fn upload_block_blob(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> CloudResult<()> {
        let size = data.len();
        let builder = self
            .service
            .http
            .put(self.blob_url(key))
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-blob-content-type", content_type)
            .body(data);
        self.service.send(builder).await?;
        debug!("uploaded {key} ({size} bytes, {content_type})");
        Ok(())
    }

    /// One page of List Blobs under `prefix`.
    pub async fn list_blobs_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> CloudResult<ListBlobsPage> {
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut query = vec![
            ("restype", "container"),
            ("comp", "list"),
            ("prefix", prefix),
            ("maxresults", page_size.as_str()),
        ];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }

        let builder = self.service.http.get(self.url()).query(&query);
        let resp = self.service.send(builder).await?;
        let xml = resp.text().await?;
        listing::parse_list_blobs(&xml)
    }

    /// Get Blob; the whole body in memory.
    pub async fn download_blob(&self, key: &str) -> CloudResult<Vec<u8>> {
        let builder = self.service.http.get(self.blob_url(key));
        let resp = self.service.send(builder).await.map_err(|e| match e {
            CloudError::Storage { status: 404, .. } => CloudError::NotFound(key.to_string()),
            other => other,
        })?;
        Ok(resp.bytes().await?.to_vec())
    }
}
