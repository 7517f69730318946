//! Signed access tokens and their query-string form.

use crate::error::{SasError, SasResult};
use crate::scope::parse_sas_time;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use url::form_urlencoded;

/// Parameter names every token carries, in the order they are emitted.
pub const TOKEN_PARAMS: [&str; 8] = ["sv", "ss", "srt", "spr", "st", "se", "sp", "sig"];

/// Every signed parameter a token may carry, in canonical order.
///
/// Delegated tokens add the user delegation key fields and `sr` between
/// `se` and `sp`.
pub const SIGNED_PARAMS: [&str; 15] = [
    "sv", "ss", "srt", "spr", "st", "se", "skoid", "sktid", "skt", "ske", "sks", "skv", "sr", "sp",
    "sig",
];

/// A signed, time-boxed query string granting read access to a container.
///
/// Values are held decoded; [`AccessToken::to_query_string`] percent-encodes
/// them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    params: Vec<(&'static str, String)>,
}

impl AccessToken {
    /// Builds a token from `(name, value)` pairs, ordering them canonically
    /// and dropping names that are not signed parameters.
    pub fn from_params<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> SasResult<Self> {
        let mut params: Vec<(&'static str, String)> = Vec::new();
        for (name, value) in pairs {
            let Some(canonical) = canonical_name(name) else {
                continue;
            };
            if !params.iter().any(|(existing, _)| *existing == canonical) {
                params.push((canonical, value));
            }
        }

        for required in TOKEN_PARAMS {
            if !params.iter().any(|(name, _)| *name == required) {
                return Err(SasError::MissingParameter(required));
            }
        }

        params.sort_by_key(|(name, _)| position(name));
        Ok(Self { params })
    }

    /// Parses a token out of a query string (with or without leading `?`).
    /// Unrelated parameters are ignored.
    pub fn parse(query: &str) -> SasResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self::from_params(pairs.iter().map(|(name, value)| (name.as_str(), value.clone())))
    }

    /// Value of a signed parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Parameter names in emission order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().map(|(name, _)| *name)
    }

    pub fn signature(&self) -> &str {
        self.get("sig").unwrap_or_default()
    }

    pub fn signed_start(&self) -> SasResult<DateTime<Utc>> {
        parse_sas_time(self.get("st").ok_or(SasError::MissingParameter("st"))?)
    }

    pub fn signed_expiry(&self) -> SasResult<DateTime<Utc>> {
        parse_sas_time(self.get("se").ok_or(SasError::MissingParameter("se"))?)
    }

    /// `se - st`.
    pub fn lifetime(&self) -> SasResult<Duration> {
        Ok(self.signed_expiry()? - self.signed_start()?)
    }

    /// Returns true once the expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.signed_expiry().map(|expiry| now >= expiry).unwrap_or(true)
    }

    /// The percent-encoded query string, without a leading `?`.
    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Returns true iff `search` carries all eight token parameters, in any
/// order and alongside any other parameters.
pub fn has_token(search: &str) -> bool {
    let search = search.strip_prefix('?').unwrap_or(search);
    let present: Vec<_> = form_urlencoded::parse(search.as_bytes())
        .map(|(name, _)| name)
        .collect();
    TOKEN_PARAMS
        .iter()
        .all(|required| present.iter().any(|name| name == required))
}

fn canonical_name(name: &str) -> Option<&'static str> {
    SIGNED_PARAMS.iter().copied().find(|known| *known == name)
}

fn position(name: &str) -> usize {
    SIGNED_PARAMS
        .iter()
        .position(|known| *known == name)
        .unwrap_or(SIGNED_PARAMS.len())
}
