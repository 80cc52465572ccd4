use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A contract or collection the bot announces activity for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Contract address (polling) or collection slug (streaming).
    pub id: String,
    /// Short name, also used as the watermark key.
    pub name: String,
    /// Channel the cast is routed to, if any.
    pub channel: Option<String>,
}

/// Marketplace activity kinds the pipelines announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BidAccepted,
    ItemSold,
    ItemListed,
}

impl EventKind {
    /// Verb phrase used in the announcement text.
    pub fn verb(self) -> &'static str {
        match self {
            EventKind::BidAccepted | EventKind::ItemSold => "sold for",
            EventKind::ItemListed => "listed for",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::BidAccepted => "bid accepted",
            EventKind::ItemSold => "item sold",
            EventKind::ItemListed => "item listed",
        }
    }
}

/// Timestamp of the last announced event for one entity.
///
/// Ordered by instant; persisted as an RFC 3339 UTC string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Watermark {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = DateTime::parse_from_rfc3339(s.trim())?;
        Ok(Self(parsed.with_timezone(&Utc)))
    }
}

/// An on-chain address paired with its social handle, when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub address: String,
    pub handle: Option<String>,
}

impl ResolvedIdentity {
    pub fn unresolved(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            handle: None,
        }
    }
}

/// A composed cast, built once per event and handed to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub text: String,
    pub embed_url: String,
    pub channel: Option<String>,
}

/// One JSON line written to stdout for every published cast.
#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementRecord {
    pub timestamp: String,
    pub pipeline: &'static str,
    pub entity: String,
    pub kind: EventKind,
    pub token_id: String,
    pub text: String,
    pub embed_url: String,
    pub channel: Option<String>,
}
