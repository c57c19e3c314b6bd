//! Aggregate identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Error produced when parsing an [`AggregateId`] from its string form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAggregateIdError {
    /// The string did not contain a `kind/uuid` separator.
    #[error("missing '/' separator in aggregate id: {0}")]
    MissingSeparator(String),

    /// The kind segment was empty.
    #[error("empty kind segment in aggregate id: {0}")]
    EmptyKind(String),

    /// The uuid segment did not parse.
    #[error("invalid uuid segment in aggregate id: {0}")]
    InvalidUuid(String),
}

/// Identifies one aggregate instance: a kind tag plus a UUID.
///
/// The string form is `kind/uuid`, e.g. `board/0195b2f0-...`. The nil UUID
/// is reserved as "no identifier" and is rejected by
/// [`AggregateRoot::initialize`](crate::aggregate::AggregateRoot::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateId {
    kind: String,
    raw: Uuid,
}

impl AggregateId {
    /// Creates an identifier from a kind tag and a raw UUID.
    #[must_use]
    pub fn new(kind: impl Into<String>, raw: Uuid) -> Self {
        Self {
            kind: kind.into(),
            raw,
        }
    }

    /// Creates an identifier with a freshly generated v4 UUID.
    #[must_use]
    pub fn generate(kind: impl Into<String>) -> Self {
        Self::new(kind, Uuid::new_v4())
    }

    /// Returns the kind tag (e.g. `"board"`).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the raw UUID.
    #[must_use]
    pub fn raw(&self) -> Uuid {
        self.raw
    }

    /// Returns `true` if the raw UUID is nil (the defaulted value).
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.raw.is_nil()
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.raw)
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, raw) = s
            .split_once('/')
            .ok_or_else(|| ParseAggregateIdError::MissingSeparator(s.to_owned()))?;
        if kind.is_empty() {
            return Err(ParseAggregateIdError::EmptyKind(s.to_owned()));
        }
        let raw = Uuid::parse_str(raw)
            .map_err(|_| ParseAggregateIdError::InvalidUuid(s.to_owned()))?;
        Ok(Self::new(kind, raw))
    }
}

impl Serialize for AggregateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AggregateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
