use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::digest::Digest;

/// Partition of a register's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    /// Schema and metadata entries.
    System,
    /// Data entries.
    User,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::System, Region::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::System => "system",
            Region::User => "user",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region: {0:?}")]
pub struct ParseRegionError(String);

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Region::System),
            "user" => Ok(Region::User),
            _ => Err(ParseRegionError(s.to_string())),
        }
    }
}

/// One append-log record.
///
/// A plain entry carries one digest; a merged multi-item entry carries one
/// digest per item, in item order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub region: Region,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub digests: Vec<Digest>,
}

impl Entry {
    /// Creates an entry stamped with the current time, truncated to seconds.
    pub fn now(region: Region, key: impl Into<String>, digests: Vec<Digest>) -> Self {
        Entry {
            region,
            key: key.into(),
            timestamp: truncate_to_seconds(Utc::now()),
            digests,
        }
    }

    /// ISO-8601 UTC timestamp with second precision, e.g. `2024-01-31T12:00:00Z`.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// The digests joined with `;`, as written in exchange files.
    pub fn digest_list(&self) -> String {
        self.digests
            .iter()
            .map(Digest::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp)
}
