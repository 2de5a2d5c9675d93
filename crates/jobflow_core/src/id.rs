//! Job identifiers.
//!
//! A job id is the BLAKE3 digest of the canonical form of the job's
//! parameter set, so structurally equal parameter sets always map to the
//! same id, across calls and across processes.

use crate::error::{CoreError, CoreResult};
use crate::hash::Hash;
use crate::params::ParameterSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job identifier - content address of a job's parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(Hash);

impl JobId {
    /// Number of hex characters in the full rendering
    pub const HEX_LEN: usize = Hash::LEN * 2;

    /// Derive the identifier of a parameter set
    #[must_use]
    pub fn identify(params: &ParameterSet) -> Self {
        Self(Hash::compute(params.canonical_json().as_bytes()))
    }

    /// Create from raw hash
    #[must_use]
    pub const fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    /// Get the underlying hash
    #[must_use]
    pub const fn as_hash(&self) -> &Hash {
        &self.0
    }

    /// Full lowercase hex rendering
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Abbreviated rendering for human-facing output
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }

    /// Check whether this id starts with the given hex prefix
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Hash::from_hex(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidId {
                reason: format!("{s:?}: {e}"),
            })
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_hex()
    }
}
