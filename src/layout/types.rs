// src/layout/types.rs

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One field of a fixed-width record, as declared in the codebook.
///
/// `start` and `end` are 1-based and inclusive. Two specs may cover the same
/// bytes; the layout is not a partition of the line.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct FieldSpec {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// 0-based half-open byte range of this field within a line.
    pub fn byte_range(&self) -> Range<usize> {
        self.start.saturating_sub(1)..self.end
    }

    /// True when this field and `other` share at least one byte.
    pub fn overlaps(&self, other: &FieldSpec) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Largest declared `end`, i.e. the line width the layout expects.
pub fn max_end(specs: &[FieldSpec]) -> usize {
    specs.iter().map(|s| s.end).max().unwrap_or(0)
}
