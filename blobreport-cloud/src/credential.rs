//! Delegated identity: bearer tokens for the storage service.
//!
//! Resolves a credential source from the environment (client secret or
//! managed identity) and caches its bearer token, refreshing it before
//! expiry.

use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// OAuth scope for the blob service.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Resource identifier for managed identity token requests.
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Tokens are refreshed when they expire within this margin.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// An OAuth access token for the storage service.
#[derive(Clone)]
pub struct BearerToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Returns true if the token will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        Utc::now() + Duration::seconds(secs) >= self.expires_at
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for the storage service.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self) -> CloudResult<BearerToken>;
}

// ── Client secret ──

/// Service principal authenticating with a client secret.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretResponse {
    access_token: String,
    expires_in: i64,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self) -> CloudResult<BearerToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", STORAGE_SCOPE),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Credential(format!(
                "client secret token request failed with {status}: {body}"
            )));
        }

        let body: ClientSecretResponse = resp.json().await?;
        Ok(BearerToken {
            token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}

// ── Managed identity ──

/// Managed identity through the instance metadata service.
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
}

#[derive(Deserialize)]
struct ManagedIdentityResponse {
    access_token: String,
    /// Seconds since the epoch; IMDS sends it as a string.
    expires_on: serde_json::Value,
}

impl ManagedIdentityCredential {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            client_id,
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self) -> CloudResult<BearerToken> {
        let mut query = vec![("api-version", "2018-02-01"), ("resource", STORAGE_RESOURCE)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Credential(format!(
                "managed identity token request failed with {status}: {body}"
            )));
        }

        let body: ManagedIdentityResponse = resp.json().await?;
        let expires_on = match &body.expires_on {
            serde_json::Value::String(s) => s.parse::<i64>().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        }
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            CloudError::Credential(format!("managed identity sent invalid expires_on: {}", body.expires_on))
        })?;

        Ok(BearerToken {
            token: body.access_token,
            expires_at: expires_on,
        })
    }
}

// ── Default chain ──

/// Credential resolved from the environment, with token caching.
///
/// Uses a client secret when `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_CLIENT_SECRET` are all set, managed identity otherwise.
#[derive(Clone)]
pub struct DefaultCredential {
    source: Arc<dyn TokenCredential>,
    cached: Arc<RwLock<Option<BearerToken>>>,
    refresh_margin_secs: i64,
}

impl DefaultCredential {
    pub fn new(source: Arc<dyn TokenCredential>) -> Self {
        Self {
            source,
            cached: Arc::new(RwLock::new(None)),
            refresh_margin_secs: REFRESH_MARGIN_SECS,
        }
    }

    /// Resolves the source from process environment variables.
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |name| std::env::var(name).ok())
    }

    /// Resolves the source from an arbitrary variable lookup.
    pub fn from_lookup(http: reqwest::Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let source: Arc<dyn TokenCredential> =
            match (var("AZURE_TENANT_ID"), var("AZURE_CLIENT_ID"), var("AZURE_CLIENT_SECRET")) {
                (Some(tenant), Some(client), Some(secret)) => {
                    debug!("using client secret credential for tenant {tenant}");
                    let authority = var("AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
                    Arc::new(ClientSecretCredential::new(http, authority, tenant, client, secret))
                }
                (_, client_id, _) => {
                    debug!("using managed identity credential");
                    let endpoint =
                        var("IDENTITY_ENDPOINT").unwrap_or_else(|| IMDS_ENDPOINT.to_string());
                    Arc::new(ManagedIdentityCredential::new(http, endpoint, client_id))
                }
            };

        Self::new(source)
    }

    /// Forces a token refresh.
    pub async fn refresh(&self) -> CloudResult<BearerToken> {
        let token = self.source.get_token().await.map_err(|e| {
            warn!("bearer token refresh failed: {e}");
            e
        })?;
        debug!("refreshed bearer token, expires at {}", token.expires_at);

        let mut cached = self.cached.write().await;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Clears the cached token.
    pub async fn clear(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    async fn get_token(&self) -> CloudResult<BearerToken> {
        {
            let cached = self.cached.read().await;
            if let Some(ref token) = *cached {
                if !token.expires_within_secs(self.refresh_margin_secs) {
                    return Ok(token.clone());
                }
                debug!("bearer token expiring within {}s, refreshing", self.refresh_margin_secs);
            }
        }

        self.refresh().await
    }
}
