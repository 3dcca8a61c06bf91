//! Aggregate coverage masks shared by both strategies.

use crate::bits::BitVector;
use std::sync::OnceLock;

/// Union-style views over every test of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Masks {
    /// Slots hit by any test
    pub all: BitVector,
    /// Slots hit by any passing test
    pub pass_only: BitVector,
    /// Slots hit by exactly one test
    pub unique: BitVector,
}

/// Accumulates [`Masks`] one test vector at a time
#[derive(Debug)]
pub struct MaskBuilder {
    all: BitVector,
    pass_only: BitVector,
    hit_twice: BitVector,
}

impl MaskBuilder {
    /// Builder for a slot space of `nbits`
    #[must_use]
    pub fn new(nbits: usize) -> Self {
        Self {
            all: BitVector::new(nbits),
            pass_only: BitVector::new(nbits),
            hit_twice: BitVector::new(nbits),
        }
    }

    /// Fold in one test's hits
    pub fn add(&mut self, hits: &BitVector, passed: bool) {
        let mut again = hits.clone();
        again.and_in_place(&self.all);
        again.apply_to(&mut self.hit_twice);
        hits.apply_to(&mut self.all);
        if passed {
            hits.apply_to(&mut self.pass_only);
        }
    }

    /// Final masks
    #[must_use]
    pub fn build(self) -> Masks {
        let mut unique = self.all.clone();
        unique.subtract_in_place(&self.hit_twice);
        Masks {
            all: self.all,
            pass_only: self.pass_only,
            unique,
        }
    }
}

/// Lazily computed masks, cached until the snapshot changes
#[derive(Debug, Default)]
pub struct AggregateMasks {
    cell: OnceLock<Masks>,
}

impl AggregateMasks {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached masks, computing them on first use
    pub fn get_or_compute(&self, compute: impl FnOnce() -> Masks) -> &Masks {
        self.cell.get_or_init(|| {
            let masks = compute();
            tracing::debug!(
                covered = masks.all.count_ones(),
                unique = masks.unique.count_ones(),
                "aggregate masks computed"
            );
            masks
        })
    }

    /// True once the masks have been computed
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Forget the cached masks
    pub fn reset(&mut self) {
        self.cell.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(slots: &[usize]) -> BitVector {
        slots.iter().copied().collect()
    }

    #[test]
    fn test_builder_masks() {
        let mut builder = MaskBuilder::new(16);
        builder.add(&bits(&[1, 2, 3]), true);
        builder.add(&bits(&[3, 4]), false);
        builder.add(&bits(&[4, 5]), true);
        let masks = builder.build();
        assert_eq!(masks.all, bits(&[1, 2, 3, 4, 5]));
        assert_eq!(masks.pass_only, bits(&[1, 2, 3, 4, 5]));
        assert_eq!(masks.unique, bits(&[1, 2, 5]));
    }

    #[test]
    fn test_failed_tests_excluded_from_pass_only() {
        let mut builder = MaskBuilder::new(8);
        builder.add(&bits(&[0]), true);
        builder.add(&bits(&[7]), false);
        let masks = builder.build();
        assert_eq!(masks.pass_only, bits(&[0]));
        assert_eq!(masks.unique, bits(&[0, 7]));
    }

    #[test]
    fn test_computed_once_until_reset() {
        let mut cache = AggregateMasks::new();
        let mut calls = 0;
        cache.get_or_compute(|| {
            calls += 1;
            Masks::default()
        });
        cache.get_or_compute(|| {
            calls += 1;
            Masks::default()
        });
        assert_eq!(calls, 1);
        assert!(cache.is_computed());
        cache.reset();
        assert!(!cache.is_computed());
    }
}
