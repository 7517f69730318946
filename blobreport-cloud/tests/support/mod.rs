//! Shared helpers for publisher tests against a mock blob service.

#![allow(dead_code)]

use async_trait::async_trait;
use blobreport_cloud::{
    BearerToken, CloudResult, PluginConfig, PluginCreateOptions, TokenCredential, WorkingDirs,
};
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// base64 of `keykeykeykeykeykey`.
pub const ACCOUNT_KEY: &str = "a2V5a2V5a2V5a2V5a2V5a2V5";

pub const ENTRY_PAGE: &str =
    "<!doctype html><html><head><title>report</title></head><body><div id=\"app\"></div></body></html>";

/// Minimal PNG signature followed by padding, enough for sniffing.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// Shared-key config pointing at the mock server.
pub fn shared_key_config(endpoint: &str) -> PluginConfig {
    let mut config = PluginConfig::new(endpoint, "reports");
    config.account_name = Some("acct".into());
    config.account_key = Some(ACCOUNT_KEY.into());
    config
}

/// A generated report: entry page, a data file and two snapshots.
pub fn report_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "index.html", ENTRY_PAGE.as_bytes());
    write(dir.path(), "out.json", b"{\"failedItems\":[]}");
    write(dir.path(), "actual/login.png", PNG_BYTES);
    write(dir.path(), "actual/nested/menu.png", PNG_BYTES);
    write(dir.path(), "notes.txt", b"not part of the report");
    dir
}

pub fn write(base: &Path, relative: &str, data: &[u8]) {
    let path = base.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

pub fn create_options(config: PluginConfig, base: &Path, no_emit: bool) -> PluginCreateOptions {
    PluginCreateOptions {
        no_emit,
        working_dirs: WorkingDirs::under(base),
        options: config,
    }
}

/// List Blobs response body for the given names.
pub fn list_xml(names: &[&str], next_marker: Option<&str>) -> String {
    let blobs: String = names
        .iter()
        .map(|name| {
            format!(
                "<Blob><Name>{name}</Name><Properties><Content-Type>image/png</Content-Type></Properties></Blob>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ContainerName=\"reports\">\
         <Blobs>{blobs}</Blobs><NextMarker>{}</NextMarker></EnumerationResults>",
        next_marker.unwrap_or_default()
    )
}

pub fn delegation_key_xml() -> String {
    "<?xml version=\"1.0\" encoding=\"utf-8\"?><UserDelegationKey>\
     <SignedOid>11111111-1111-1111-1111-111111111111</SignedOid>\
     <SignedTid>22222222-2222-2222-2222-222222222222</SignedTid>\
     <SignedStart>2025-06-02T10:00:00Z</SignedStart>\
     <SignedExpiry>2025-06-03T10:00:00Z</SignedExpiry>\
     <SignedService>b</SignedService><SignedVersion>2022-11-02</SignedVersion>\
     <Value>ZGVsZWdhdGlvbmtleQ==</Value></UserDelegationKey>"
        .to_string()
}

/// Hands out a fixed bearer token and counts how often it was asked.
#[derive(Default)]
pub struct StaticCredential {
    pub calls: AtomicUsize,
}

impl StaticCredential {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self) -> CloudResult<BearerToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BearerToken {
            token: "bearer-token".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}
