//! Per-test coverage engine.
//!
//! Maps each ingested test to the slots it executed and answers the queries
//! reports are built from. Two strategies implement [`PerTestCoverage`]:
//!
//! - [`InMemoryCoverage`]: every test's bit-vector stays resident
//! - [`SampledCoverage`]: a per-file sample index shortlists tests, and their
//!   bit-vectors are reloaded from disk behind a byte-budgeted cache
//!
//! The strategy is picked by [`CoverageConfig::strategy`]; see
//! [`new_per_test_coverage`].

mod cache;
mod config;
mod ids;
mod in_memory;
mod ingest;
mod masks;
mod sampled;


pub use cache::{ByteSized, SizedLruCache};
pub use config::{
    ConfigValidationError, CoverageConfig, CoverageDataSpec, CoverageStrategy,
    DEFAULT_CACHE_BUDGET_BYTES,
};
pub use ids::{SlotRange, TestCaseInfo, TestId, TestOutcome};
pub use in_memory::InMemoryCoverage;
pub use ingest::{ingest_recordings, IngestSummary};
pub use masks::{AggregateMasks, MaskBuilder, Masks};
pub use sampled::{FileSample, SampledCoverage};

use crate::bits::BitVector;
use crate::codec::PerTestRecording;
use crate::registry::{FileInfo, Registry};
use crate::result::SlotcovResult;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Query contract shared by every per-test coverage strategy.
///
/// Ingestion (`add_coverage`) takes `&mut self` and is single-writer;
/// queries take `&self` and may run concurrently.
pub trait PerTestCoverage: Send + Sync + std::fmt::Debug {
    /// Number of slots every bit-vector spans
    fn coverage_size(&self) -> usize;

    /// Record one test's coverage
    fn add_coverage(
        &mut self,
        test: &TestCaseInfo,
        recording: &PerTestRecording,
    ) -> SlotcovResult<()>;

    /// Known tests, in ingestion order
    fn tests(&self) -> Vec<&TestCaseInfo>;

    /// Test by id
    fn test_by_id(&self, id: TestId) -> Option<&TestCaseInfo>;

    /// Slots hit by one test; empty if the test is unknown or unreadable
    fn hits_for_test(&self, id: TestId) -> BitVector;

    /// Union of the hits of `ids`, optionally clipped to `range`
    fn hits_for_tests(&self, ids: &HashSet<TestId>, range: Option<SlotRange>) -> BitVector;

    /// Tests with at least one hit inside `range`
    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestId>;

    /// Tests covering `file`, each with its hits clipped to the file's slots
    fn tests_and_coverage_for_file(&self, file: &FileInfo) -> BTreeMap<TestId, BitVector>;

    /// Slots hit by any test
    fn all_hits(&self) -> &BitVector;

    /// Slots hit by any passing test
    fn pass_only_hits(&self) -> &BitVector;

    /// Slots hit by exactly one test
    fn unique_hits(&self) -> &BitVector;

    /// True if any test has been ingested
    fn has_per_test_data(&self) -> bool {
        !self.tests().is_empty()
    }

    /// True if exactly one test hits `slot`
    fn is_uniquely_covered(&self, slot: usize) -> bool {
        self.unique_hits().get(slot)
    }
}

/// Build the strategy selected by `config`, sized to the registry's slot space
#[must_use]
pub fn new_per_test_coverage(config: &CoverageConfig, registry: &Registry) -> Box<dyn PerTestCoverage> {
    let size = registry.data_length();
    tracing::debug!(strategy = %config.strategy, slots = size, "creating per-test coverage");
    match config.strategy {
        CoverageStrategy::InMemory => Box::new(InMemoryCoverage::with_capacity(
            size,
            config.estimated_recordings,
        )),
        CoverageStrategy::Sampling => Box::new(SampledCoverage::from_project(
            &registry.project(),
            size,
            config.data_spec(),
        )),
    }
}

/// OR `hits` into `target`, restricted to `range` if given
pub(crate) fn union_into(target: &mut BitVector, hits: &BitVector, range: Option<SlotRange>) {
    match range {
        None => {
            hits.apply_to(target);
        }
        Some(range) => {
            let mut slot = hits.next_set_bit(range.data_index);
            while let Some(s) = slot.filter(|&s| s < range.end()) {
                target.set(s);
                slot = hits.next_set_bit(s + 1);
            }
        }
    }
}

/// Copy of `hits` with only the slots in `range` kept
pub(crate) fn clip(hits: &BitVector, range: SlotRange, size: usize) -> BitVector {
    let mut clipped = BitVector::new(size);
    union_into(&mut clipped, hits, Some(range));
    clipped
}
