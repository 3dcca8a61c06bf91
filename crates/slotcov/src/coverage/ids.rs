//! Test identifiers and slot ranges.
//!
//! `TestId` and slot indices are both small integers; the newtype keeps them
//! from being mixed up in query signatures.

use crate::codec::PerTestRecording;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of one ingested test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestId(u32);

impl TestId {
    /// Create a new test ID
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl PartialOrd for TestId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TestId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    /// Ran and passed
    Passed,
    /// Ran and failed
    Failed,
    /// No result recorded
    NoResult,
}

impl From<&PerTestRecording> for TestOutcome {
    fn from(recording: &PerTestRecording) -> Self {
        if !recording.has_result() {
            Self::NoResult
        } else if recording.is_passed() {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// A test known to a per-test coverage snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCaseInfo {
    /// Snapshot-local identifier
    pub id: TestId,
    /// Test name as reported by the runner
    pub name: String,
    /// Declaring class of the test
    pub class_name: String,
    /// How it ended
    pub outcome: TestOutcome,
}

impl TestCaseInfo {
    /// Create test info
    #[must_use]
    pub fn new(
        id: TestId,
        name: impl Into<String>,
        class_name: impl Into<String>,
        outcome: TestOutcome,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            class_name: class_name.into(),
            outcome,
        }
    }

    /// Describe the test a recording was made for
    #[must_use]
    pub fn from_recording(id: TestId, recording: &PerTestRecording) -> Self {
        Self::new(
            id,
            recording.test_name(),
            recording.test_type_name.clone(),
            TestOutcome::from(recording),
        )
    }

    /// True if the test passed
    #[inline]
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    /// `Class.name`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }
}

/// Half-open slot range `[data_index, data_index + data_length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SlotRange {
    /// First slot
    pub data_index: usize,
    /// Number of slots
    pub data_length: usize,
}

impl SlotRange {
    /// Create a range
    #[inline]
    #[must_use]
    pub const fn new(data_index: usize, data_length: usize) -> Self {
        Self {
            data_index,
            data_length,
        }
    }

    /// One past the last slot
    #[inline]
    #[must_use]
    pub const fn end(self) -> usize {
        self.data_index + self.data_length
    }

    /// True if `slot` lies inside the range
    #[inline]
    #[must_use]
    pub const fn contains(self, slot: usize) -> bool {
        slot >= self.data_index && slot < self.end()
    }

    /// True if the range holds no slot
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.data_length == 0
    }

    /// True if the two ranges share a slot
    #[inline]
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        self.data_index < other.end() && other.data_index < self.end()
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.data_index, self.end())
    }
}
