//! Cumulative GC skew.

use crate::types::SkewArray;
use serde::Serialize;

/// Running G-minus-C count. `skew[0] == 0` and `skew.len() == sequence.len() + 1`.
pub fn compute(sequence: impl AsRef<[u8]>) -> SkewArray {
    let sequence = sequence.as_ref();
    let mut skew = Vec::with_capacity(sequence.len() + 1);
    let mut current = 0i64;
    skew.push(current);

    for &base in sequence {
        current += match base {
            b'G' | b'g' => 1,
            b'C' | b'c' => -1,
            _ => 0,
        };
        skew.push(current);
    }
    skew
}

/// Extremes of a skew curve. The minimum marks candidate replication origins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkewSummary {
    pub min: i64,
    pub min_positions: Vec<usize>,
    pub max: i64,
    pub max_positions: Vec<usize>,
}

pub fn summarize(skew: &[i64]) -> Option<SkewSummary> {
    let min = *skew.iter().min()?;
    let max = *skew.iter().max()?;
    let positions = |target: i64| -> Vec<usize> {
        skew.iter()
            .enumerate()
            .filter(|&(_, &value)| value == target)
            .map(|(idx, _)| idx)
            .collect()
    };

    Some(SkewSummary {
        min,
        min_positions: positions(min),
        max,
        max_positions: positions(max),
    })
}
