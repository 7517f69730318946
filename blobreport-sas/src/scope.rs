//! Capability set and validity window carried by a signed token.

use crate::error::{SasError, SasResult};
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use std::fmt;

/// Storage service version used for signing and for `sv`.
pub const SAS_VERSION: &str = "2022-11-02";

/// Timestamp format used by `st`, `se` and the delegation key exchange.
const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Storage services a token is valid for (`ss`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignedServices {
    pub blob: bool,
    pub file: bool,
    pub queue: bool,
    pub table: bool,
}

impl fmt::Display for SignedServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (enabled, flag) in [
            (self.blob, 'b'),
            (self.file, 'f'),
            (self.queue, 'q'),
            (self.table, 't'),
        ] {
            if enabled {
                write!(f, "{flag}")?;
            }
        }
        Ok(())
    }
}

/// Resource types a token is valid for (`srt`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignedResourceTypes {
    pub service: bool,
    pub container: bool,
    pub object: bool,
}

impl fmt::Display for SignedResourceTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (enabled, flag) in [(self.service, 's'), (self.container, 'c'), (self.object, 'o')] {
            if enabled {
                write!(f, "{flag}")?;
            }
        }
        Ok(())
    }
}

/// Operations a token permits (`sp`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignedPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl fmt::Display for SignedPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (enabled, flag) in [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ] {
            if enabled {
                write!(f, "{flag}")?;
            }
        }
        Ok(())
    }
}

/// Protocols a token may be presented over (`spr`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignedProtocol {
    #[default]
    Https,
}

impl SignedProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
        }
    }
}

/// The full capability set of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessScope {
    pub services: SignedServices,
    pub resource_types: SignedResourceTypes,
    pub permissions: SignedPermissions,
    pub protocol: SignedProtocol,
}

impl AccessScope {
    /// Read-only access to blobs and their containers, over HTTPS only.
    pub fn read_only_blob() -> Self {
        Self {
            services: SignedServices {
                blob: true,
                ..Default::default()
            },
            resource_types: SignedResourceTypes {
                container: true,
                object: true,
                ..Default::default()
            },
            permissions: SignedPermissions {
                read: true,
                ..Default::default()
            },
            protocol: SignedProtocol::Https,
        }
    }
}

impl Default for AccessScope {
    fn default() -> Self {
        Self::read_only_blob()
    }
}

/// Start and expiry of a token, both truncated to whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    start: DateTime<Utc>,
    expiry: DateTime<Utc>,
}

impl ValidityWindow {
    pub fn new(start: DateTime<Utc>, expiry: DateTime<Utc>) -> SasResult<Self> {
        let start = truncate_to_seconds(start);
        let expiry = truncate_to_seconds(expiry);
        if expiry <= start {
            return Err(SasError::InvalidWindow {
                start: format_sas_time(&start),
                expiry: format_sas_time(&expiry),
            });
        }
        Ok(Self { start, expiry })
    }

    /// Window opening at `issued_at` and lasting `hours`.
    pub fn from_lifetime_hours(issued_at: DateTime<Utc>, hours: u32) -> SasResult<Self> {
        let expiry = Duration::try_hours(i64::from(hours))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| SasError::InvalidWindow {
                start: format_sas_time(&issued_at),
                expiry: format!("start + {hours}h"),
            })?;
        Self::new(issued_at, expiry)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn lifetime(&self) -> Duration {
        self.expiry - self.start
    }
}

fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::seconds(1)).unwrap_or(time)
}

/// Formats a timestamp the way `st`/`se` expect it.
pub fn format_sas_time(time: &DateTime<Utc>) -> String {
    time.format(SAS_TIME_FORMAT).to_string()
}

/// Parses a `st`/`se` value.
pub fn parse_sas_time(value: &str) -> SasResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, SAS_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| SasError::InvalidParameter {
            name: "time",
            value: value.to_string(),
        })
}
