//! Content types for uploaded report files.

use std::path::Path;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Decides the content type a file is stored with.
pub trait ContentTypeDetector: Send + Sync {
    fn detect(&self, path: &Path, bytes: &[u8]) -> String;
}

/// Magic-byte sniffing first, then the file extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct SniffingDetector;

impl ContentTypeDetector for SniffingDetector {
    fn detect(&self, path: &Path, bytes: &[u8]) -> String {
        if let Some(kind) = infer::get(bytes) {
            return kind.mime_type().to_string();
        }
        guess_from_path(path)
    }
}

/// Extension-only guess.
pub fn guess_from_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}
