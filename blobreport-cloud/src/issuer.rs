//! Access token issuance for a published report.

use crate::blob_client::BlobServiceClient;
use crate::config::PluginConfig;
use crate::error::{CloudError, CloudResult};
use blobreport_sas::{
    AccessScope, AccessToken, SharedKey, ValidityWindow, account_sas, user_delegation_sas,
};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, info};

/// What the issuer signs with, decided once at init.
#[derive(Clone)]
pub enum SigningAuthority {
    SharedKey(SharedKey),
    /// Signs with user delegation keys fetched through `client`.
    Delegated { client: BlobServiceClient },
    /// Shared-key mode without an account key.
    Unavailable,
}

impl fmt::Debug for SigningAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedKey(key) => f.debug_tuple("SharedKey").field(key).finish(),
            Self::Delegated { client } => f
                .debug_struct("Delegated")
                .field("endpoint", &client.endpoint())
                .finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Issues read-only, container-scoped tokens.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    authority: SigningAuthority,
    account_name: Option<String>,
    container: String,
    lifetime_hours: Option<u32>,
    scope: AccessScope,
}

impl TokenIssuer {
    pub fn new(config: &PluginConfig, authority: SigningAuthority) -> Self {
        Self {
            authority,
            account_name: config.account_name.clone(),
            container: config.container_name.clone(),
            lifetime_hours: config.sas_expiry_hour,
            scope: AccessScope::read_only_blob(),
        }
    }

    pub fn lifetime_hours(&self) -> Option<u32> {
        self.lifetime_hours
    }

    pub async fn issue(&self) -> CloudResult<Option<AccessToken>> {
        self.issue_at(Utc::now()).await
    }

    /// Signs a token valid from `now` for the configured lifetime.
    ///
    /// Returns `None` when no lifetime, account name or container is set.
    pub async fn issue_at(&self, now: DateTime<Utc>) -> CloudResult<Option<AccessToken>> {
        let (Some(hours), Some(account)) = (self.lifetime_hours, self.account_name.as_deref())
        else {
            debug!("token signing not configured");
            return Ok(None);
        };
        if self.container.is_empty() {
            return Ok(None);
        }

        let window = ValidityWindow::from_lifetime_hours(now, hours)?;
        let token = match &self.authority {
            SigningAuthority::SharedKey(key) => account_sas(key, &self.scope, &window)?,
            SigningAuthority::Delegated { client } => {
                let key = client
                    .get_user_delegation_key(window.start(), window.expiry())
                    .await?;
                user_delegation_sas(account, &self.container, &key, &self.scope, &window)?
            }
            SigningAuthority::Unavailable => {
                return Err(CloudError::Config(
                    "accountKey is required to sign tokens in shared-key mode".into(),
                ));
            }
        };

        info!(
            "issued access token for {account}/{}, valid for {hours}h",
            self.container
        );
        Ok(Some(token))
    }
}
