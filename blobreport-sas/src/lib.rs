//! Shared access signatures for published reports.
//!
//! Provides the two halves of keeping a private report browsable:
//! - Signing container-scoped, read-only, time-boxed tokens, either with an
//!   account key or with a user delegation key
//! - The browser bootstrapper that re-attaches the token to every same-origin
//!   navigation and to the cache worker's fetches
//!
//! # Token shape
//!
//! Every token carries `sv, ss, srt, spr, st, se, sp, sig` in that order.
//! Delegated tokens additionally carry the delegation key fields and `sr`.
//! The bootstrapper only checks for the eight common names, so both shapes
//! survive navigation the same way.

pub mod assets;
pub mod entry_page;
mod error;
pub mod scope;
pub mod session;
pub mod signer;
pub mod token;

pub use assets::{BOOTSTRAP_SCRIPT, CACHE_WORKER_CONTENT_TYPE, CACHE_WORKER_FILE, CACHE_WORKER_SCRIPT};
pub use entry_page::{BOOTSTRAP_MARKER, is_patched, patch_entry_page, script_block};
pub use error::{SasError, SasResult};
pub use scope::{AccessScope, SAS_VERSION, ValidityWindow, format_sas_time, parse_sas_time};
pub use session::{BrowserLocation, TokenSession, capture_token};
pub use signer::{SharedKey, UserDelegationKey, account_sas, user_delegation_sas};
pub use token::{AccessToken, SIGNED_PARAMS, TOKEN_PARAMS, has_token};
