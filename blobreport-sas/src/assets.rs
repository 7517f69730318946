//! Browser scripts shipped into the published report.

/// Inline bootstrap injected after the entry page's `<body>` tag.
pub const BOOTSTRAP_SCRIPT: &str = include_str!("../assets/bootstrap.js");

/// Cache worker uploaded next to the entry page.
pub const CACHE_WORKER_SCRIPT: &str = include_str!("../assets/appendSas.js");

/// File name of the cache worker inside the report.
pub const CACHE_WORKER_FILE: &str = "appendSas.js";

/// Content type the cache worker is uploaded with.
pub const CACHE_WORKER_CONTENT_TYPE: &str = "text/javascript";
