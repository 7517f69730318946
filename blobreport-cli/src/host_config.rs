//! Host configuration file (`regconfig.json`).
//!
//! ```json
//! {
//!   "core": { "workingDir": ".reg" },
//!   "plugins": {
//!     "reg-publish-azure-blob-storage-plugin": {
//!       "url": "https://acct.blob.core.windows.net",
//!       "containerName": "reports",
//!       "accountName": "acct",
//!       "accountKey": "$AZURE_STORAGE_KEY",
//!       "sasExpiryHour": 24
//!     }
//!   }
//! }
//! ```
//!
//! String values may reference environment variables as `$NAME` or
//! `${NAME}`; they are substituted after parsing.

use anyhow::{Context, Result, anyhow};
use blobreport_cloud::{PLUGIN_NAME, PluginConfig, PluginCreateOptions, WorkingDirs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "regconfig.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Report root; `actual`, `expected` and `diff` live under it.
    pub working_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from(".reg"),
        }
    }
}

impl HostConfig {
    /// Reads `path`, substituting variables from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::parse(&raw, |name| std::env::var(name).ok())
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        expand_env(&mut value, &lookup);
        Ok(serde_json::from_value(value)?)
    }

    /// The blob publisher's section of `plugins`.
    pub fn plugin_config(&self) -> Result<PluginConfig> {
        let section = self
            .plugins
            .get(PLUGIN_NAME)
            .ok_or_else(|| anyhow!("no \"{PLUGIN_NAME}\" entry under plugins"))?;
        serde_json::from_value(section.clone())
            .with_context(|| format!("invalid \"{PLUGIN_NAME}\" options"))
    }

    /// Working directories, relative paths resolved against `root`.
    pub fn working_dirs(&self, root: &Path) -> WorkingDirs {
        WorkingDirs::under(root.join(&self.core.working_dir))
    }

    pub fn create_options(&self, root: &Path, no_emit: bool) -> Result<PluginCreateOptions> {
        Ok(PluginCreateOptions {
            no_emit,
            working_dirs: self.working_dirs(root),
            options: self.plugin_config()?,
        })
    }
}

/// Substitutes `$NAME` and `${NAME}` in every string of `value`. Unset
/// variables are left as written.
pub fn expand_env(value: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = expand_str(s, lookup);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| expand_env(item, lookup)),
        Value::Object(map) => map.values_mut().for_each(|item| expand_env(item, lookup)),
        _ => {}
    }
}

fn expand_str(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, raw_len) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid {
            out.push('$');
            rest = after;
            continue;
        }

        match lookup(name) {
            Some(val) => out.push_str(&val),
            None => {
                warn!("environment variable {name} is not set");
                out.push_str(&rest[pos..pos + 1 + raw_len]);
            }
        }
        rest = &after[raw_len..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "KEY" => Some("secret".into()),
            "ACCOUNT_NAME" => Some("acct".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_both_forms() {
        assert_eq!(expand_str("$KEY", &env), "secret");
        assert_eq!(expand_str("pre-${ACCOUNT_NAME}-post", &env), "pre-acct-post");
        assert_eq!(expand_str("$ACCOUNT_NAME.blob", &env), "acct.blob");
    }

    #[test]
    fn leaves_unset_and_invalid_references() {
        assert_eq!(expand_str("$MISSING", &env), "$MISSING");
        assert_eq!(expand_str("${MISSING}", &env), "${MISSING}");
        assert_eq!(expand_str("cost: $5", &env), "cost: $5");
        assert_eq!(expand_str("${KEY", &env), "${KEY");
        assert_eq!(expand_str("trailing $", &env), "trailing $");
    }
}
