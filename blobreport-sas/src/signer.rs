//! HMAC-SHA256 signing of account and user delegation tokens.
//!
//! Both token flavours share the capability set from [`AccessScope`] and the
//! window from [`ValidityWindow`]; they differ only in the string-to-sign and
//! in the key used to sign it.

use crate::error::{SasError, SasResult};
use crate::scope::{AccessScope, SAS_VERSION, ValidityWindow, format_sas_time};
use crate::token::AccessToken;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Storage account name paired with its decoded account key.
#[derive(Clone)]
pub struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl SharedKey {
    /// Creates a shared key from the base64 account key shown in the portal.
    pub fn new(account: impl Into<String>, account_key: &str) -> SasResult<Self> {
        let key = BASE64
            .decode(account_key.trim())
            .map_err(|e| SasError::InvalidKey(format!("account key is not base64: {e}")))?;
        if key.is_empty() {
            return Err(SasError::InvalidKey("account key is empty".into()));
        }
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Base64 HMAC-SHA256 of `string_to_sign`.
    pub fn sign(&self, string_to_sign: &str) -> String {
        hmac_base64(&self.key, string_to_sign)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Short-lived key handed out by the storage service in exchange for a
/// bearer token. Field names follow the service's XML response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,
    pub value: String,
}

impl UserDelegationKey {
    /// Base64 HMAC-SHA256 of `string_to_sign` under the delegation key.
    pub fn sign(&self, string_to_sign: &str) -> SasResult<String> {
        let key = BASE64
            .decode(self.value.trim())
            .map_err(|e| SasError::InvalidKey(format!("delegation key is not base64: {e}")))?;
        Ok(hmac_base64(&key, string_to_sign))
    }
}

/// Signs an account token with a shared key.
///
/// The result carries exactly the eight token parameters.
pub fn account_sas(
    key: &SharedKey,
    scope: &AccessScope,
    window: &ValidityWindow,
) -> SasResult<AccessToken> {
    let fields = ScopeFields::new(scope, window);
    let string_to_sign = format!(
        "{account}\n{sp}\n{ss}\n{srt}\n{st}\n{se}\n{sip}\n{spr}\n{sv}\n{ses}\n",
        account = key.account(),
        sp = fields.permissions,
        ss = fields.services,
        srt = fields.resource_types,
        st = fields.start,
        se = fields.expiry,
        sip = "",
        spr = fields.protocol,
        sv = SAS_VERSION,
        ses = "",
    );
    let signature = key.sign(&string_to_sign);
    debug!(account = key.account(), expiry = %fields.expiry, "signed account token");

    AccessToken::from_params(fields.into_params(Vec::new(), signature))
}

/// Signs a container token with a user delegation key.
///
/// The result carries the eight token parameters plus the delegation key
/// fields and `sr=c`.
pub fn user_delegation_sas(
    account: &str,
    container: &str,
    key: &UserDelegationKey,
    scope: &AccessScope,
    window: &ValidityWindow,
) -> SasResult<AccessToken> {
    let fields = ScopeFields::new(scope, window);
    let resource = "c";
    let canonical_resource = format!("/blob/{account}/{container}");
    let parts: [&str; 24] = [
        fields.permissions.as_str(),
        fields.start.as_str(),
        fields.expiry.as_str(),
        &canonical_resource,
        &key.signed_oid,
        &key.signed_tid,
        &key.signed_start,
        &key.signed_expiry,
        &key.signed_service,
        &key.signed_version,
        "", // saoid
        "", // suoid
        "", // scid
        "", // sip
        fields.protocol,
        SAS_VERSION,
        resource,
        "", // snapshot time
        "", // ses
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ];
    let signature = key.sign(&parts.join("\n"))?;
    debug!(account, container, expiry = %fields.expiry, "signed user delegation token");

    let delegation = vec![
        ("skoid", key.signed_oid.clone()),
        ("sktid", key.signed_tid.clone()),
        ("skt", key.signed_start.clone()),
        ("ske", key.signed_expiry.clone()),
        ("sks", key.signed_service.clone()),
        ("skv", key.signed_version.clone()),
        ("sr", resource.to_string()),
    ];
    AccessToken::from_params(fields.into_params(delegation, signature))
}

/// Rendered scope values shared by both string-to-sign layouts.
struct ScopeFields {
    services: String,
    resource_types: String,
    permissions: String,
    protocol: &'static str,
    start: String,
    expiry: String,
}

impl ScopeFields {
    fn new(scope: &AccessScope, window: &ValidityWindow) -> Self {
        Self {
            services: scope.services.to_string(),
            resource_types: scope.resource_types.to_string(),
            permissions: scope.permissions.to_string(),
            protocol: scope.protocol.as_str(),
            start: format_sas_time(&window.start()),
            expiry: format_sas_time(&window.expiry()),
        }
    }

    fn into_params(
        self,
        extra: Vec<(&'static str, String)>,
        signature: String,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("sv", SAS_VERSION.to_string()),
            ("ss", self.services),
            ("srt", self.resource_types),
            ("spr", self.protocol.to_string()),
            ("st", self.start),
            ("se", self.expiry),
            ("sp", self.permissions),
            ("sig", signature),
        ];
        params.extend(extra);
        params
    }
}

fn hmac_base64(key: &[u8], message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
