//! XML models for container listings and user delegation keys.

use crate::error::CloudResult;
use blobreport_sas::UserDelegationKey;
use serde::Deserialize;

/// Page size requested from List Blobs.
pub const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobsSection,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobsSection {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobEntry>,
}

/// One blob in a listing page.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlobEntry {
    pub name: String,
    #[serde(default)]
    pub properties: BlobProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BlobProperties {
    #[serde(rename = "Content-Length", default)]
    pub content_length: Option<u64>,
    #[serde(rename = "Content-Type", default)]
    pub content_type: Option<String>,
    /// Set by hierarchical-namespace accounts: `file` or `directory`.
    #[serde(rename = "ResourceType", default)]
    pub resource_type: Option<String>,
}

impl BlobEntry {
    /// Directory placeholders are listed alongside files on
    /// hierarchical-namespace accounts.
    pub fn is_file(&self) -> bool {
        match self.properties.resource_type.as_deref() {
            Some(kind) => kind == "file",
            None => true,
        }
    }
}

/// A decoded List Blobs response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListBlobsPage {
    pub blobs: Vec<BlobEntry>,
    /// Continuation marker; `None` on the last page.
    pub next_marker: Option<String>,
}

impl ListBlobsPage {
    pub fn is_last_page(&self) -> bool {
        self.next_marker.is_none()
    }
}

/// Parses a List Blobs response body, dropping directory entries.
pub fn parse_list_blobs(xml: &str) -> CloudResult<ListBlobsPage> {
    let results: EnumerationResults = quick_xml::de::from_str(xml)?;
    Ok(ListBlobsPage {
        blobs: results.blobs.blob.into_iter().filter(BlobEntry::is_file).collect(),
        next_marker: results.next_marker.filter(|marker| !marker.is_empty()),
    })
}

/// Parses a Get User Delegation Key response body.
pub fn parse_user_delegation_key(xml: &str) -> CloudResult<UserDelegationKey> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Request body for Get User Delegation Key.
pub fn key_info_body(start: &str, expiry: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <KeyInfo><Start>{start}</Start><Expiry>{expiry}</Expiry></KeyInfo>"
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StorageErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Code and message from a storage error body, when it is the usual XML.
pub fn parse_error_body(xml: &str) -> (Option<String>, Option<String>) {
    match quick_xml::de::from_str::<StorageErrorBody>(xml) {
        Ok(body) => (body.code, body.message.map(|m| m.trim().to_string())),
        Err(_) => (None, None),
    }
}
