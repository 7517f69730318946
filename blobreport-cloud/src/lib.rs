//! Azure Blob Storage publisher for blobreport.
//!
//! Uploads a generated report directory to a blob container, optionally
//! makes it browsable from a private container by signing a read-only
//! access token and patching the entry page with the token bootstrapper,
//! and fetches the snapshots of a previous run back for comparison.
//!
//! # Credential modes
//!
//! - **Shared key**: `accountName` + `accountKey` authorize requests and
//!   sign account tokens.
//! - **Delegated**: a bearer token from the environment (client secret or
//!   managed identity) authorizes requests; tokens are signed with a user
//!   delegation key exchanged for it.

pub mod auth;
pub mod blob_client;
pub mod config;
pub mod content_type;
pub mod credential;
pub mod error;
pub mod issuer;
pub mod listing;
pub mod plugin;
pub mod publisher;

pub use auth::{API_VERSION, StorageAuth};
pub use blob_client::{BlobServiceClient, ContainerClient, build_http_client};
pub use config::{CredentialMode, PipelineOptions, PluginConfig, PluginCreateOptions, WorkingDirs};
pub use content_type::{ContentTypeDetector, SniffingDetector};
pub use credential::{
    BearerToken, ClientSecretCredential, DefaultCredential, ManagedIdentityCredential,
    TokenCredential,
};
pub use error::{CloudError, CloudResult};
pub use issuer::{SigningAuthority, TokenIssuer};
pub use listing::{BlobEntry, ListBlobsPage};
pub use plugin::{AzureBlobPublisher, PLUGIN_NAME, PublishOutcome};
pub use publisher::{
    DEFAULT_GLOB_PATTERN, ENTRY_FILE, FileItem, ObjectListResult, PublishedItems, Publisher,
    RemoteFileItem, list_local_files,
};
