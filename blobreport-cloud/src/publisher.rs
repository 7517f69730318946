//! Storage-agnostic publish and fetch lifecycle.
//!
//! A backend implements the three transfer primitives (upload one file,
//! download one file, list one page) and gets the rest: enumerating the
//! local report, key resolution, bounded-concurrency transfers with
//! retries, and paging through remote listings.

use crate::config::{PipelineOptions, WorkingDirs};
use crate::content_type::guess_from_path;
use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use globset::GlobBuilder;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files picked up from the working directory when no pattern is set.
pub const DEFAULT_GLOB_PATTERN: &str = "**/*.{html,js,wasm,png,json,jpeg,jpg,tiff,gif}";

/// The report's entry page, relative to the working directory.
pub const ENTRY_FILE: &str = "index.html";

const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_MAX_MS: u64 = 30_000;

/// A local report file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileItem {
    /// Path relative to its root, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub mime_type: String,
}

/// A remote object, by its full key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFileItem {
    pub remote_path: String,
}

/// One page of a remote listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectListResult {
    pub contents: Vec<RemoteFileItem>,
    pub next_marker: Option<String>,
    pub is_last_page: bool,
}

/// What a publish run put (or would have put) in storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedItems {
    /// The entry page, when the report has one.
    pub index_file: Option<FileItem>,
    pub items: Vec<FileItem>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn bucket_name(&self) -> &str;

    /// Prefix every key is resolved under.
    fn bucket_root_dir(&self) -> Option<&str>;

    fn local_glob_pattern(&self) -> Option<&str>;

    fn working_dirs(&self) -> &WorkingDirs;

    fn no_emit(&self) -> bool;

    fn pipeline_options(&self) -> &PipelineOptions;

    /// Stores `item` under `{key}/{item.path}`.
    async fn upload_item(&self, key: &str, item: &FileItem) -> CloudResult<FileItem>;

    /// Writes `remote` to `item.abs_path`.
    async fn download_item(&self, remote: &RemoteFileItem, item: &FileItem)
    -> CloudResult<FileItem>;

    async fn list_items(&self, last_key: Option<&str>, prefix: &str)
    -> CloudResult<ObjectListResult>;

    /// `{root}/{key}`, or `key` when no root is configured.
    fn resolve_in_bucket(&self, key: &str) -> String {
        match self.bucket_root_dir().map(|root| root.trim_end_matches('/')) {
            Some(root) if !root.is_empty() => format!("{root}/{key}"),
            _ => key.to_string(),
        }
    }

    /// Uploads every matching file of the working directory under `key`.
    async fn publish_internal(&self, key: &str) -> CloudResult<PublishedItems> {
        let pattern = self.local_glob_pattern().unwrap_or(DEFAULT_GLOB_PATTERN);
        let files = list_local_files(&self.working_dirs().base, pattern)?;
        let index_file = files.iter().find(|item| item.path == ENTRY_FILE).cloned();
        let resolved = self.resolve_in_bucket(key);

        if self.no_emit() {
            info!(
                "noEmit set, skipping upload of {} files to {}/{resolved}",
                files.len(),
                self.bucket_name()
            );
            return Ok(PublishedItems { index_file, items: files });
        }

        info!(
            "uploading {} files to {}/{resolved}",
            files.len(),
            self.bucket_name()
        );
        let options = self.pipeline_options();
        let resolved = resolved.as_str();
        let items = stream::iter(files)
            .map(|item| async move {
                with_retry(options.max_attempts, &item.path, || self.upload_item(resolved, &item))
                    .await
            })
            .buffer_unordered(options.max_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(PublishedItems { index_file, items })
    }

    /// Downloads the snapshots published under `key` into the expected
    /// directory.
    async fn fetch_internal(&self, key: &str) -> CloudResult<Vec<FileItem>> {
        let dirs = self.working_dirs();
        let actual_name = dirs
            .actual_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CloudError::Config(format!("actual dir {:?} has no name", dirs.actual_dir))
            })?;
        let prefix = format!("{}/{actual_name}/", self.resolve_in_bucket(key));

        let mut remotes = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.list_items(marker.as_deref(), &prefix).await?;
            remotes.extend(page.contents);
            if page.is_last_page {
                break;
            }
            marker = page.next_marker;
            if marker.is_none() {
                break;
            }
        }
        info!("fetching {} files from {}/{prefix}", remotes.len(), self.bucket_name());

        let options = self.pipeline_options();
        let expected_dir = dirs.expected_dir.as_path();
        let prefix = prefix.as_str();
        stream::iter(remotes)
            .map(|remote| async move {
                let relative = remote
                    .remote_path
                    .strip_prefix(prefix)
                    .unwrap_or(&remote.remote_path)
                    .to_string();
                if !is_contained(&relative) {
                    return Err(CloudError::UnsafePath(remote.remote_path.clone()));
                }
                let abs_path = expected_dir.join(&relative);
                let item = FileItem {
                    mime_type: guess_from_path(&abs_path),
                    path: relative,
                    abs_path,
                };
                with_retry(options.max_attempts, &remote.remote_path, || {
                    self.download_item(&remote, &item)
                })
                .await
            })
            .buffer_unordered(options.max_concurrency)
            .try_collect()
            .await
    }
}

/// Files under `base` whose relative path matches `pattern`, sorted by path.
pub fn list_local_files(base: &Path, pattern: &str) -> CloudResult<Vec<FileItem>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut files = Vec::new();
    if !base.exists() {
        warn!("working directory {} does not exist", base.display());
        return Ok(files);
    }

    for entry in WalkDir::new(base) {
        let entry = entry.map_err(|e| CloudError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&path) {
            files.push(FileItem {
                mime_type: guess_from_path(entry.path()),
                abs_path: entry.path().to_path_buf(),
                path,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("{} files match {pattern} under {}", files.len(), base.display());
    Ok(files)
}

/// True when `relative` only names entries below its root: no `..`, no
/// root or drive prefix.
fn is_contained(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Runs `op` up to `attempts` times, backing off exponentially between
/// transient failures.
pub async fn with_retry<T, F, Fut>(attempts: u32, what: &str, mut op: F) -> CloudResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CloudResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff_delay(attempt);
                warn!("{what}: attempt {attempt}/{attempts} failed ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay after the given failed attempt (1-based): doubling from the base,
/// capped.
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_MAX_MS))
}
