//! Fully resident per-test coverage.

use super::masks::{AggregateMasks, MaskBuilder, Masks};
use super::{clip, union_into, PerTestCoverage, SlotRange, TestCaseInfo, TestId};
use crate::bits::BitVector;
use crate::codec::PerTestRecording;
use crate::registry::FileInfo;
use crate::result::SlotcovResult;
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Every test's bit-vector held in memory, in ingestion order.
///
/// Repeat recordings of one test are OR-ed into its vector; the first
/// recording's outcome is kept.
#[derive(Debug)]
pub struct InMemoryCoverage {
    size: usize,
    tests: IndexMap<TestId, (TestCaseInfo, BitVector)>,
    masks: AggregateMasks,
}

impl InMemoryCoverage {
    /// Empty snapshot over `size` slots
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_capacity(size, 0)
    }

    /// Empty snapshot pre-sized for `tests` tests
    #[must_use]
    pub fn with_capacity(size: usize, tests: usize) -> Self {
        Self {
            size,
            tests: IndexMap::with_capacity(tests),
            masks: AggregateMasks::new(),
        }
    }

    /// Copy of this snapshot with every vector resized to `new_size` slots.
    ///
    /// Growing zero-extends; shrinking drops the slots at and above `new_size`.
    #[must_use]
    pub fn resized(&self, new_size: usize) -> Self {
        let tests = self
            .tests
            .iter()
            .map(|(id, (info, hits))| (*id, (info.clone(), hits.resized(new_size))))
            .collect();
        Self {
            size: new_size,
            tests,
            masks: AggregateMasks::new(),
        }
    }

    fn masks(&self) -> &Masks {
        self.masks.get_or_compute(|| {
            let mut builder = MaskBuilder::new(self.size);
            for (info, hits) in self.tests.values() {
                builder.add(hits, info.is_passed());
            }
            builder.build()
        })
    }
}

impl PerTestCoverage for InMemoryCoverage {
    fn coverage_size(&self) -> usize {
        self.size
    }

    fn add_coverage(
        &mut self,
        test: &TestCaseInfo,
        recording: &PerTestRecording,
    ) -> SlotcovResult<()> {
        let hits = recording.coverage.resized(self.size);
        match self.tests.entry(test.id) {
            Entry::Occupied(mut entry) => {
                hits.apply_to(&mut entry.get_mut().1);
            }
            Entry::Vacant(entry) => {
                entry.insert((test.clone(), hits));
            }
        }
        self.masks.reset();
        Ok(())
    }

    fn tests(&self) -> Vec<&TestCaseInfo> {
        self.tests.values().map(|(info, _)| info).collect()
    }

    fn test_by_id(&self, id: TestId) -> Option<&TestCaseInfo> {
        self.tests.get(&id).map(|(info, _)| info)
    }

    fn hits_for_test(&self, id: TestId) -> BitVector {
        self.tests
            .get(&id)
            .map_or_else(|| BitVector::new(self.size), |(_, hits)| hits.clone())
    }

    fn hits_for_tests(&self, ids: &HashSet<TestId>, range: Option<SlotRange>) -> BitVector {
        let mut union = BitVector::new(self.size);
        for id in ids {
            if let Some((_, hits)) = self.tests.get(id) {
                union_into(&mut union, hits, range);
            }
        }
        union
    }

    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestId> {
        self.tests
            .iter()
            .filter(|(_, (_, hits))| hits.any_in_range(range.data_index, range.end()))
            .map(|(id, _)| *id)
            .collect()
    }

    fn tests_and_coverage_for_file(&self, file: &FileInfo) -> BTreeMap<TestId, BitVector> {
        let range = file.slot_range();
        self.tests
            .iter()
            .filter(|(_, (_, hits))| hits.any_in_range(range.data_index, range.end()))
            .map(|(id, (_, hits))| (*id, clip(hits, range, self.size)))
            .collect()
    }

    fn all_hits(&self) -> &BitVector {
        &self.masks().all
    }

    fn pass_only_hits(&self) -> &BitVector {
        &self.masks().pass_only
    }

    fn unique_hits(&self) -> &BitVector {
        &self.masks().unique
    }
}
