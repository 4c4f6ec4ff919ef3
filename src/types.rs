use seahash::SeaHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

/// Cumulative G-minus-C counts; element 0 is always 0.
pub type SkewArray = Vec<i64>;

/// Content-addressable key for a source identifier.
///
/// SeaHash is seeded with fixed constants, so the same identifier maps to the
/// same key in every process and across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn of(identifier: &str) -> Self {
        let mut hasher = SeaHasher::new();
        hasher.write(identifier.as_bytes());
        CacheKey(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn artifact_name(&self, extension: &str) -> String {
        format!("skew_{}.{}", self.0, extension)
    }

    pub fn download_prefix(&self) -> String {
        format!("genome_{}.", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named unit of batch work.
///
/// Either `source` names where to fetch the sequence from, or `sequence` is
/// already populated (e.g. from a multi-FASTA file) and the fetch is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeRecord {
    pub name: String,
    pub source: Option<String>,
    pub sequence: Option<String>,
    pub skew: Option<SkewArray>,
}

impl GenomeRecord {
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn from_sequence(name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: Some(sequence.into()),
            ..Default::default()
        }
    }
}
