//! Opaque version tokens (OVNs) used for optimistic concurrency.
//!
//! A token is minted per write from the record id, the write time and a random
//! salt. It starts with the write time as fixed-width hexadecimal, so tokens of
//! the same record sort by write time, followed by a digest that makes it
//! unique across records and unguessable. The write time itself is stored
//! separately; callers must treat tokens as opaque and compare them for
//! equality only.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Id, Timestamp};

const REDACTED_PHRASE: &str = "Available from USS";
const DIGEST_BYTES: usize = 16;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Fresh token for `record` written at `written_at`.
    pub fn mint(record: Id, written_at: Timestamp) -> Self {
        let micros = written_at.0.max(0);
        let mut hasher = Sha256::new();
        hasher.update(record.as_bytes());
        hasher.update(micros.to_be_bytes());
        hasher.update(Uuid::new_v4().as_bytes());
        let digest = hasher.finalize();
        Self(format!(
            "{micros:016x}{}",
            hex::encode(&digest[..DIGEST_BYTES])
        ))
    }

    /// Wraps a caller-supplied token without interpreting it.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Placeholder shown in place of a token the caller is not entitled to see.
    pub fn redacted() -> Self {
        Self(REDACTED_PHRASE.to_string())
    }

    pub fn is_redacted(&self) -> bool {
        self.0 == REDACTED_PHRASE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp for the next write of a record: never earlier than `now`, and
    /// always strictly after the previous write.
    pub fn next_write_time(previous: Option<Timestamp>, now: Timestamp) -> Timestamp {
        match previous {
            Some(previous) if previous >= now => Timestamp(previous.0.saturating_add(1)),
            _ => now,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of tokens a caller claims to have observed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OvnKey(BTreeSet<Version>);

impl OvnKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.0.contains(version)
    }

    pub fn insert(&mut self, version: Version) {
        self.0.insert(version);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Version> for OvnKey {
    fn from_iter<I: IntoIterator<Item = Version>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
