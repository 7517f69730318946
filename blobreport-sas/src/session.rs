//! Per-visitor token session, as run by `assets/bootstrap.js`.
//!
//! The browser script keeps exactly this state: the token captured at load,
//! the last `href` it saw, and a one-shot reload flag. This module is the
//! same state machine in Rust, so the URL rewriting rules can be exercised
//! without a browser.

use crate::token::{SIGNED_PARAMS, has_token};
use url::Url;

/// Path (relative to the entry page) the cache worker is registered at.
pub const CACHE_WORKER_PATH: &str = "./appendSas.js";

/// The parts of `window.location` the bootstrapper reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserLocation {
    pub href: String,
    pub pathname: String,
    /// `?`-prefixed, or empty.
    pub search: String,
    /// `#`-prefixed, or empty.
    pub hash: String,
}

impl BrowserLocation {
    /// Mirrors how a browser splits a URL into `location` fields.
    pub fn from_url(url: &Url) -> Self {
        let search = match url.query() {
            Some(query) if !query.is_empty() => format!("?{query}"),
            _ => String::new(),
        };
        let hash = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
            _ => String::new(),
        };
        Self {
            href: url.as_str().to_string(),
            pathname: url.path().to_string(),
            search,
            hash,
        }
    }
}

/// Token state for one page session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSession {
    token: String,
    last_href: String,
    refreshing: bool,
}

impl TokenSession {
    /// Captures the token from the location the page was loaded at.
    pub fn bootstrap(location: &BrowserLocation) -> Self {
        Self {
            token: capture_token(&location.search),
            last_href: location.href.clone(),
            refreshing: false,
        }
    }

    /// The captured token with its leading `?`, or empty when the page was
    /// loaded without one.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// URL to hand to `history.replaceState` so that `location` carries the
    /// token again, or `None` when nothing needs to change.
    pub fn reconcile(&self, location: &BrowserLocation) -> Option<String> {
        if self.token.is_empty() || has_token(&location.search) {
            return None;
        }
        let joined = &self.token[1..];
        let BrowserLocation {
            href,
            pathname,
            search,
            hash,
        } = location;

        Some(match (search.is_empty(), hash.is_empty()) {
            (true, true) => format!("{href}{}", self.token),
            (true, false) => format!("{pathname}{}{hash}", self.token),
            (false, true) => format!("{href}&{joined}"),
            (false, false) => format!("{pathname}{search}&{joined}{hash}"),
        })
    }

    /// Called on every observed DOM mutation or history event. Reconciles
    /// only when `href` changed since the last call.
    pub fn observe(&mut self, location: &BrowserLocation) -> Option<String> {
        if location.href == self.last_href {
            return None;
        }
        self.last_href = location.href.clone();
        self.reconcile(location)
    }

    /// Handles `controllerchange`; returns true when the page should reload.
    /// Only the first call in a session does.
    pub fn on_controller_change(&mut self) -> bool {
        if self.refreshing {
            return false;
        }
        self.refreshing = true;
        true
    }

    /// Registration URL for the cache worker, carrying the token so the
    /// worker can read it from its own scope.
    pub fn worker_registration_url(&self) -> String {
        format!("{CACHE_WORKER_PATH}{}", self.token)
    }
}

/// Picks the signed parameters out of `search`, keeping their raw encoded
/// form and putting them in canonical order. Returns `?`-prefixed, or empty.
pub fn capture_token(search: &str) -> String {
    let search = search.strip_prefix('?').unwrap_or(search);
    let pairs: Vec<&str> = search.split('&').filter(|pair| !pair.is_empty()).collect();

    let ordered: Vec<&str> = SIGNED_PARAMS
        .iter()
        .filter_map(|name| {
            pairs
                .iter()
                .find(|pair| pair.split('=').next() == Some(*name))
                .copied()
        })
        .collect();

    if ordered.is_empty() {
        String::new()
    } else {
        format!("?{}", ordered.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "sv=2022-11-02&ss=b&srt=co&spr=https&st=2025-01-01T00%3A00%3A00Z\
        &se=2025-01-02T00%3A00%3A00Z&sp=r&sig=abc%2Bdef%3D";

    fn location(url: &str) -> BrowserLocation {
        BrowserLocation::from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn location_fields() {
        let loc = location("https://host/r/index.html?a=1#top");
        assert_eq!(loc.pathname, "/r/index.html");
        assert_eq!(loc.search, "?a=1");
        assert_eq!(loc.hash, "#top");

        let bare = location("https://host/r/index.html?#");
        assert_eq!(bare.search, "");
        assert_eq!(bare.hash, "");
    }

    #[test]
    fn capture_keeps_raw_encoding_and_canonical_order() {
        let captured = capture_token("?sig=abc%2Bdef%3D&page=1&sv=2022-11-02&sp=r");
        assert_eq!(captured, "?sv=2022-11-02&sp=r&sig=abc%2Bdef%3D");
    }

    #[test]
    fn capture_without_token_is_empty() {
        assert_eq!(capture_token(""), "");
        assert_eq!(capture_token("?page=1"), "");
    }

    #[test]
    fn reconcile_neither_search_nor_hash() {
        let session = TokenSession::bootstrap(&location(&format!("https://h/r/index.html?{TOKEN}")));
        let next = session.reconcile(&location("https://h/r/other.html")).unwrap();
        assert_eq!(next, format!("https://h/r/other.html?{TOKEN}"));
    }

    #[test]
    fn reconcile_hash_only() {
        let session = TokenSession::bootstrap(&location(&format!("https://h/r/index.html?{TOKEN}")));
        let next = session.reconcile(&location("https://h/r/index.html#/detail")).unwrap();
        assert_eq!(next, format!("/r/index.html?{TOKEN}#/detail"));
    }

    #[test]
    fn reconcile_search_only() {
        let session = TokenSession::bootstrap(&location(&format!("https://h/r/index.html?{TOKEN}")));
        let next = session.reconcile(&location("https://h/r/index.html?q=1")).unwrap();
        assert_eq!(next, format!("https://h/r/index.html?q=1&{TOKEN}"));
    }

    #[test]
    fn reconcile_search_and_hash() {
        let session = TokenSession::bootstrap(&location(&format!("https://h/r/index.html?{TOKEN}")));
        let next = session.reconcile(&location("https://h/r/index.html?q=1#x")).unwrap();
        assert_eq!(next, format!("/r/index.html?q=1&{TOKEN}#x"));
    }

    #[test]
    fn reconcile_is_noop_when_token_present_or_unknown() {
        let with_token = location(&format!("https://h/r/index.html?{TOKEN}"));
        let session = TokenSession::bootstrap(&with_token);
        assert_eq!(session.reconcile(&with_token), None);

        let untokened = TokenSession::bootstrap(&location("https://h/r/index.html"));
        assert_eq!(untokened.reconcile(&location("https://h/r/other.html")), None);
    }

    #[test]
    fn observe_only_fires_on_href_change() {
        let start = location(&format!("https://h/r/index.html?{TOKEN}"));
        let mut session = TokenSession::bootstrap(&start);
        assert_eq!(session.observe(&start), None);

        let moved = location("https://h/r/other.html");
        assert!(session.observe(&moved).is_some());
        assert_eq!(session.observe(&moved), None);
    }

    #[test]
    fn controller_change_reloads_once() {
        let mut session = TokenSession::bootstrap(&location("https://h/r/index.html"));
        assert!(session.on_controller_change());
        assert!(!session.on_controller_change());
    }

    #[test]
    fn worker_url_carries_token() {
        let session = TokenSession::bootstrap(&location(&format!("https://h/r/index.html?{TOKEN}")));
        assert_eq!(session.worker_registration_url(), format!("./appendSas.js?{TOKEN}"));

        let bare = TokenSession::bootstrap(&location("https://h/r/index.html"));
        assert_eq!(bare.worker_registration_url(), "./appendSas.js");
    }
}
