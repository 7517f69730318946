//! Request authentication for the blob REST API.

use crate::credential::TokenCredential;
use crate::error::{CloudError, CloudResult};
use blobreport_sas::SharedKey;
use chrono::Utc;
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// REST API version sent with every request.
pub const API_VERSION: &str = "2022-11-02";

/// How requests to the storage service are authorized.
#[derive(Clone)]
pub enum StorageAuth {
    /// `Authorization: SharedKey account:signature`.
    SharedKey(SharedKey),
    /// `Authorization: Bearer token` from a delegated identity.
    Bearer(Arc<dyn TokenCredential>),
    /// No authorization; only works against public containers.
    Anonymous,
}

impl fmt::Debug for StorageAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedKey(key) => f.debug_tuple("SharedKey").field(key).finish(),
            Self::Bearer(_) => f.write_str("Bearer"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl StorageAuth {
    /// Stamps version, date and request id headers, then authorizes.
    pub async fn authorize(&self, request: &mut Request) -> CloudResult<()> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let headers = request.headers_mut();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert("x-ms-date", header_value(&date)?);
        headers.insert(
            "x-ms-client-request-id",
            header_value(&Uuid::new_v4().to_string())?,
        );

        let authorization = match self {
            Self::SharedKey(key) => {
                let signature = key.sign(&string_to_sign(request, key.account()));
                Some(format!("SharedKey {}:{signature}", key.account()))
            }
            Self::Bearer(credential) => {
                let token = credential.get_token().await?;
                Some(format!("Bearer {}", token.token))
            }
            Self::Anonymous => None,
        };

        if let Some(authorization) = authorization {
            let mut value = header_value(&authorization)?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

fn header_value(value: &str) -> CloudResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| CloudError::Config(format!("invalid header value {value:?}: {e}")))
}

/// Shared-key string-to-sign for a blob service request.
pub fn string_to_sign(request: &Request, account: &str) -> String {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let content_length = request
        .body()
        .and_then(|body| body.as_bytes())
        .map(|bytes| bytes.len())
        .filter(|len| *len > 0)
        .map(|len| len.to_string())
        .unwrap_or_default();

    format!(
        "{verb}\n{encoding}\n{language}\n{length}\n{md5}\n{content_type}\n{date}\n\
         {if_modified_since}\n{if_match}\n{if_none_match}\n{if_unmodified_since}\n{range}\n\
         {headers}{resource}",
        verb = request.method().as_str(),
        encoding = header("content-encoding"),
        language = header("content-language"),
        length = content_length,
        md5 = header("content-md5"),
        content_type = header("content-type"),
        date = "",
        if_modified_since = header("if-modified-since"),
        if_match = header("if-match"),
        if_none_match = header("if-none-match"),
        if_unmodified_since = header("if-unmodified-since"),
        range = header("range"),
        headers = canonicalized_headers(request),
        resource = canonicalized_resource(request, account),
    )
}

fn canonicalized_headers(request: &Request) -> String {
    let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in request.headers() {
        let name = name.as_str().to_ascii_lowercase();
        if name.starts_with("x-ms-") {
            let value = value.to_str().unwrap_or_default().trim().to_string();
            ms_headers.insert(name, value);
        }
    }
    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

fn canonicalized_resource(request: &Request, account: &str) -> String {
    let url = request.url();
    let mut resource = format!("/{account}{}", url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{name}:{}", values.join(",")));
    }
    resource
}
