//! Disk-backed per-test coverage with a per-file sample index.
//!
//! For each file the index records a handful of "sample" slots: the entry
//! slot of every method (nested methods and lambdas included) plus any
//! statement living outside a method. A test becomes a candidate for a file
//! when its recording hits one of those slots, or failing that any slot of
//! the file. The full bit-vector is not kept; queries shortlist candidates
//! from the index and then confirm each one against its real vector,
//! reloaded from the recording files through a byte-budgeted LRU cache.

use super::cache::SizedLruCache;
use super::masks::{AggregateMasks, MaskBuilder, Masks};
use super::{clip, union_into, CoverageDataSpec, PerTestCoverage, SlotRange, TestCaseInfo, TestId};
use crate::bits::BitVector;
use crate::codec::{read_recording, PerTestRecording};
use crate::registry::{FileInfo, ProjectInfo};
use crate::result::{SlotcovError, SlotcovResult};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sample index entry for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSample {
    /// File slot range
    pub range: SlotRange,
    /// Absolute slots checked at ingestion
    pub sample_slots: Vec<usize>,
    /// Tests that hit at least one slot of the file
    pub candidates: HashSet<TestId>,
}

impl FileSample {
    /// Sample slots of `file`
    #[must_use]
    pub fn for_file(file: &FileInfo) -> Self {
        let mut sample_slots: Vec<usize> = file
            .all_methods()
            .iter()
            .map(|m| m.entry_slot(file))
            .collect();
        let loose = file
            .statements
            .iter()
            .chain(file.classes.iter().flat_map(|c| &c.statements));
        sample_slots.extend(loose.map(|s| file.data_index + s.relative_index));
        sample_slots.sort_unstable();
        sample_slots.dedup();
        Self {
            range: file.slot_range(),
            sample_slots,
            candidates: HashSet::new(),
        }
    }

    /// Sample slots are checked first; the range scan catches tests that
    /// only ran the body of a method.
    fn is_hit_by(&self, hits: &BitVector) -> bool {
        self.sample_slots.iter().any(|&slot| hits.get(slot))
            || hits.any_in_range(self.range.data_index, self.range.end())
    }
}

#[derive(Debug, Clone)]
struct SampledTest {
    info: TestCaseInfo,
    /// Every recording ingested for the test
    paths: Vec<PathBuf>,
}

/// Per-test coverage that keeps only a sample index resident
#[derive(Debug)]
pub struct SampledCoverage {
    size: usize,
    /// Keyed by first slot so range queries can walk neighbouring files
    samples: BTreeMap<usize, FileSample>,
    tests: IndexMap<TestId, SampledTest>,
    spec: CoverageDataSpec,
    cache: Mutex<SizedLruCache<PathBuf, Arc<BitVector>>>,
    masks: AggregateMasks,
}

impl SampledCoverage {
    /// Build the sample index for every non-empty file of `project`.
    ///
    /// Recordings declaring more than `size` slots are treated as corrupt.
    #[must_use]
    pub fn from_project(project: &ProjectInfo, size: usize, spec: CoverageDataSpec) -> Self {
        let spec = spec.bounded_to(size);
        let mut samples = BTreeMap::new();
        project.visit_files(|_, file| {
            if file.data_length > 0 {
                samples.insert(file.data_index, FileSample::for_file(file));
            }
        });
        let budget = usize::try_from(spec.cache_budget_bytes).unwrap_or(usize::MAX);
        tracing::debug!(files = samples.len(), budget, "sample index built");
        Self {
            size,
            samples,
            tests: IndexMap::new(),
            cache: Mutex::new(SizedLruCache::new(budget)),
            spec,
            masks: AggregateMasks::new(),
        }
    }

    /// Sample entries in slot order
    pub fn samples(&self) -> impl Iterator<Item = &FileSample> {
        self.samples.values()
    }

    /// Cache lookups answered without disk I/O
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache.lock().hits()
    }

    /// Cache lookups that went to disk
    #[must_use]
    pub fn cache_misses(&self) -> u64 {
        self.cache.lock().misses()
    }

    fn read_bits(path: &Path, spec: &CoverageDataSpec, size: usize) -> SlotcovResult<Arc<BitVector>> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SlotcovError::invalid_recording(format!("bad path {}", path.display())))?;
        let recording = read_recording(dir, name, spec)?;
        Ok(Arc::new(recording.coverage.resized(size)))
    }

    /// Real hits of a test, from cache or disk.
    ///
    /// The union of all the test's recordings. The cache lock is held across
    /// the loads so concurrent queries never read the same file twice. A
    /// recording that fails to load is logged and contributes nothing.
    fn load(&self, id: TestId) -> Option<Arc<BitVector>> {
        let test = self.tests.get(&id)?;
        let mut cache = self.cache.lock();
        let mut loaded = test.paths.iter().filter_map(|path| {
            match cache.get_or_load(path.clone(), |p| Self::read_bits(p, &self.spec, self.size)) {
                Ok(hits) => Some(hits),
                Err(err) => {
                    tracing::warn!(
                        test = %test.info.qualified_name(),
                        path = %path.display(),
                        error = %err,
                        "failed to load recording; treating it as uncovered"
                    );
                    None
                }
            }
        });
        let first = loaded.next()?;
        let mut rest = loaded.peekable();
        if rest.peek().is_none() {
            return Some(first);
        }
        let mut union = (*first).clone();
        for hits in rest {
            hits.apply_to(&mut union);
        }
        Some(Arc::new(union))
    }

    /// Candidate tests for `range`: those sampled in any file overlapping it
    fn candidates(&self, range: SlotRange) -> HashSet<TestId> {
        let preceding = self
            .samples
            .range(..range.data_index)
            .next_back()
            .map(|(_, s)| s)
            .filter(|s| s.range.overlaps(range));
        let inside = self
            .samples
            .range(range.data_index..range.end())
            .map(|(_, s)| s);
        preceding
            .into_iter()
            .chain(inside)
            .flat_map(|s| s.candidates.iter().copied())
            .collect()
    }

    fn masks(&self) -> &Masks {
        self.masks.get_or_compute(|| {
            let mut builder = MaskBuilder::new(self.size);
            for (id, test) in &self.tests {
                if let Some(hits) = self.load(*id) {
                    builder.add(&hits, test.info.is_passed());
                }
            }
            builder.build()
        })
    }
}

impl PerTestCoverage for SampledCoverage {
    fn coverage_size(&self) -> usize {
        self.size
    }

    fn add_coverage(
        &mut self,
        test: &TestCaseInfo,
        recording: &PerTestRecording,
    ) -> SlotcovResult<()> {
        let path = recording.source.clone().ok_or_else(|| {
            SlotcovError::invalid_recording(format!(
                "recording for {} has no backing file",
                test.qualified_name()
            ))
        })?;
        for sample in self.samples.values_mut() {
            if sample.is_hit_by(&recording.coverage) {
                sample.candidates.insert(test.id);
            }
        }
        let entry = self.tests.entry(test.id).or_insert_with(|| SampledTest {
            info: test.clone(),
            paths: Vec::new(),
        });
        if !entry.paths.contains(&path) {
            entry.paths.push(path);
        }
        self.masks.reset();
        Ok(())
    }

    fn tests(&self) -> Vec<&TestCaseInfo> {
        self.tests.values().map(|t| &t.info).collect()
    }

    fn test_by_id(&self, id: TestId) -> Option<&TestCaseInfo> {
        self.tests.get(&id).map(|t| &t.info)
    }

    fn hits_for_test(&self, id: TestId) -> BitVector {
        self.load(id)
            .map_or_else(|| BitVector::new(self.size), |hits| (*hits).clone())
    }

    fn hits_for_tests(&self, ids: &HashSet<TestId>, range: Option<SlotRange>) -> BitVector {
        let mut union = BitVector::new(self.size);
        for id in ids {
            if let Some(hits) = self.load(*id) {
                union_into(&mut union, &hits, range);
            }
        }
        union
    }

    fn tests_covering(&self, range: SlotRange) -> BTreeSet<TestId> {
        if range.is_empty() {
            return BTreeSet::new();
        }
        self.candidates(range)
            .into_iter()
            .filter(|id| {
                self.load(*id)
                    .is_some_and(|hits| hits.any_in_range(range.data_index, range.end()))
            })
            .collect()
    }

    fn tests_and_coverage_for_file(&self, file: &FileInfo) -> BTreeMap<TestId, BitVector> {
        let range = file.slot_range();
        let mut out = BTreeMap::new();
        for id in self.candidates(range) {
            if let Some(hits) = self.load(id) {
                if hits.any_in_range(range.data_index, range.end()) {
                    out.insert(id, clip(&hits, range, self.size));
                }
            }
        }
        out
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::tests::{record, two_file_registry};
    use tempfile::TempDir;

    fn sampled(budget: u64) -> (Arc<crate::registry::Registry>, SampledCoverage) {
        let registry = two_file_registry();
        let spec = CoverageDataSpec {
            cache_budget_bytes: budget,
            ..CoverageDataSpec::default()
        };
        let coverage = SampledCoverage::from_project(&registry.project(), 8, spec);
        (registry, coverage)
    }

    fn ingest(coverage: &mut SampledCoverage, id: u32, recording: &PerTestRecording) {
        let info = TestCaseInfo::from_recording(TestId::new(id), recording);
        coverage.add_coverage(&info, recording).unwrap();
    }

    #[test]
    fn test_sample_slots_are_method_entries() {
        let (_, coverage) = sampled(1024);
        let slots: Vec<_> = coverage.samples().map(|s| s.sample_slots.clone()).collect();
        assert_eq!(slots, vec![vec![0, 3], vec![5]]);
    }

    #[test]
    fn test_query_starting_mid_file_uses_preceding_sample() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        // hits total()'s entry and its statement
        ingest(&mut coverage, 0, &record(dir.path(), "totals", &[3, 4], 8, true));
        // hits only add()'s entry
        ingest(&mut coverage, 1, &record(dir.path(), "enters", &[0], 8, true));

        let covering = coverage.tests_covering(SlotRange::new(4, 1));
        assert_eq!(covering.into_iter().collect::<Vec<_>>(), vec![TestId::new(0)]);
    }

    #[test]
    fn test_candidates_confirmed_against_real_hits() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        ingest(&mut coverage, 0, &record(dir.path(), "enters", &[0], 8, true));
        assert!(coverage.tests_covering(SlotRange::new(1, 2)).is_empty());
        assert_eq!(coverage.tests_covering(SlotRange::new(0, 1)).len(), 1);
        assert!(coverage.tests_covering(SlotRange::new(0, 0)).is_empty());
    }

    #[test]
    fn test_method_body_hit_without_entry_is_found() {
        let dir = TempDir::new().unwrap();
        let (registry, mut coverage) = sampled(1024);
        // total()'s statement ran but its entry slot 3 did not
        ingest(&mut coverage, 0, &record(dir.path(), "bodyOnly", &[4], 8, true));

        let cart = registry.project().find_file("Cart.java").unwrap().slot_range();
        let expected = BTreeSet::from([TestId::new(0)]);
        assert_eq!(coverage.tests_covering(cart), expected);
        assert_eq!(coverage.tests_covering(SlotRange::new(4, 1)), expected);
        assert!(coverage.tests_covering(SlotRange::new(5, 3)).is_empty());
        let first = coverage.samples().next().unwrap();
        assert!(first.candidates.contains(&TestId::new(0)));
    }

    #[test]
    fn test_repeat_recordings_of_one_test_are_unioned() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        ingest(&mut coverage, 0, &record(dir.path(), "runOne", &[0], 8, true));
        ingest(&mut coverage, 0, &record(dir.path(), "runTwo", &[5], 8, true));

        assert_eq!(coverage.tests().len(), 1);
        let hits = coverage.hits_for_test(TestId::new(0));
        assert_eq!(hits.iter_ones().collect::<Vec<_>>(), vec![0, 5]);
        assert_eq!(coverage.all_hits().iter_ones().collect::<Vec<_>>(), vec![0, 5]);
        assert_eq!(coverage.tests_covering(SlotRange::new(5, 1)).len(), 1);
    }

    #[test]
    fn test_unreadable_repeat_recording_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        ingest(&mut coverage, 0, &record(dir.path(), "kept", &[0], 8, true));
        let lost = record(dir.path(), "lost", &[5], 8, true);
        ingest(&mut coverage, 0, &lost);
        std::fs::remove_file(lost.source.as_ref().unwrap()).unwrap();

        let hits = coverage.hits_for_test(TestId::new(0));
        assert_eq!(hits.iter_ones().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_recording_without_backing_file_rejected() {
        let (_, mut coverage) = sampled(1024);
        let recording = PerTestRecording::new("T", "t", vec![1; 8]);
        let info = TestCaseInfo::from_recording(TestId::new(0), &recording);
        let err = coverage.add_coverage(&info, &recording).unwrap_err();
        assert!(matches!(err, SlotcovError::InvalidRecording { .. }));
        assert!(!coverage.has_per_test_data());
    }

    #[test]
    fn test_missing_file_reads_as_no_coverage() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        let recording = record(dir.path(), "vanishes", &[0, 1], 8, true);
        ingest(&mut coverage, 0, &recording);
        std::fs::remove_file(recording.source.as_ref().unwrap()).unwrap();

        assert!(coverage.hits_for_test(TestId::new(0)).is_empty());
        assert!(coverage.tests_covering(SlotRange::new(0, 8)).is_empty());
        assert!(coverage.all_hits().is_empty());
        assert_eq!(coverage.tests().len(), 1);
    }

    #[test]
    fn test_cache_serves_repeat_queries() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(1024);
        ingest(&mut coverage, 0, &record(dir.path(), "a", &[0, 1], 8, true));
        coverage.hits_for_test(TestId::new(0));
        coverage.hits_for_test(TestId::new(0));
        assert_eq!(coverage.cache_misses(), 1);
        assert_eq!(coverage.cache_hits(), 1);
    }

    #[test]
    fn test_zero_budget_reloads_every_time() {
        let dir = TempDir::new().unwrap();
        let (_, mut coverage) = sampled(0);
        ingest(&mut coverage, 0, &record(dir.path(), "a", &[0, 1], 8, true));
        for _ in 0..3 {
            assert_eq!(coverage.hits_for_test(TestId::new(0)).count_ones(), 2);
        }
        assert_eq!(coverage.cache_misses(), 3);
        assert_eq!(coverage.cache_hits(), 0);
    }
}
