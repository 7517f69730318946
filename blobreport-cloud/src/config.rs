//! Publisher configuration.

use crate::error::{CloudError, CloudResult};
use blobreport_sas::SharedKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Options for the blob storage publisher, as written in the host config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Blob service endpoint (e.g., "https://acct.blob.core.windows.net").
    pub url: String,

    /// Container the report is published into.
    pub container_name: String,

    /// Use a delegated identity from the environment instead of a shared key.
    #[serde(default)]
    pub use_default_credential: bool,

    /// Storage account name; required for signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    /// Base64 account key; required for shared-key mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,

    /// Lifetime of the signed token in hours. Signing is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sas_expiry_hour: Option<u32>,

    /// HTTP pipeline tuning.
    #[serde(default)]
    pub options: PipelineOptions,

    /// Glob of report files to upload, relative to the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Prefix prepended to every remote key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

/// How the publisher authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialMode {
    /// Bearer tokens from the environment, user delegation keys for signing.
    Delegated,
    /// Account name and key.
    SharedKey,
}

impl PluginConfig {
    /// Creates a shared-key config with everything else defaulted.
    pub fn new(url: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            container_name: container_name.into(),
            use_default_credential: false,
            account_name: None,
            account_key: None,
            sas_expiry_hour: None,
            options: PipelineOptions::default(),
            pattern: None,
            path_prefix: None,
        }
    }

    pub fn credential_mode(&self) -> CredentialMode {
        if self.use_default_credential {
            CredentialMode::Delegated
        } else {
            CredentialMode::SharedKey
        }
    }

    /// Endpoint without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// The shared key, when both halves are configured.
    pub fn shared_key(&self) -> CloudResult<Option<SharedKey>> {
        match (&self.account_name, &self.account_key) {
            (Some(name), Some(key)) => Ok(Some(SharedKey::new(name.clone(), key)?)),
            _ => Ok(None),
        }
    }

    /// Checks the configuration once, at init.
    pub fn validate(&self) -> CloudResult<()> {
        let endpoint = Url::parse(self.endpoint())
            .map_err(|e| CloudError::Config(format!("url {:?} is not a valid URL: {e}", self.url)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(CloudError::Config(format!(
                "url must be http or https, got {}",
                endpoint.scheme()
            )));
        }
        if self.container_name.trim().is_empty() {
            return Err(CloudError::Config("containerName must not be empty".into()));
        }
        if self.container_name.contains('/') {
            return Err(CloudError::Config(format!(
                "containerName {:?} must not contain '/'",
                self.container_name
            )));
        }
        if self.sas_expiry_hour == Some(0) {
            return Err(CloudError::Config("sasExpiryHour must be at least 1".into()));
        }
        self.shared_key()?;
        self.options.validate()
    }
}

/// Upper bound for `options.maxAttempts`.
pub const MAX_ATTEMPTS: u32 = 10;

/// HTTP pipeline and transfer tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Overrides the default `User-Agent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Report files transferred concurrently.
    pub max_concurrency: usize,

    /// Attempts per file before a transfer failure is final.
    pub max_attempts: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
            max_concurrency: 8,
            max_attempts: 3,
        }
    }
}

impl PipelineOptions {
    fn validate(&self) -> CloudResult<()> {
        if self.timeout_secs == 0 {
            return Err(CloudError::Config("options.timeoutSecs must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(CloudError::Config("options.maxConcurrency must be at least 1".into()));
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(CloudError::Config(format!(
                "options.maxAttempts must be between 1 and {MAX_ATTEMPTS}"
            )));
        }
        Ok(())
    }
}

/// Local directories the host prepares for a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingDirs {
    /// Root of the generated report.
    pub base: PathBuf,
    /// Snapshot images of this run.
    pub actual_dir: PathBuf,
    /// Where fetched snapshots of a previous run land.
    pub expected_dir: PathBuf,
    /// Difference images.
    pub diff_dir: PathBuf,
}

impl WorkingDirs {
    /// The standard layout: `actual`, `expected` and `diff` under `base`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            base: base.to_path_buf(),
            actual_dir: base.join("actual"),
            expected_dir: base.join("expected"),
            diff_dir: base.join("diff"),
        }
    }
}

/// Everything the host hands the publisher at init.
#[derive(Clone, Debug)]
pub struct PluginCreateOptions {
    /// Compute results without writing anything remotely.
    pub no_emit: bool,
    pub working_dirs: WorkingDirs,
    pub options: PluginConfig,
}
