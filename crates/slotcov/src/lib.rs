//! Slotcov: slot-based source coverage engine
//!
//! Every coverable element of a project (method entry, statement, branch)
//! is assigned one integer slot in a dense, project-wide index space. An
//! instrumented test run produces a counter per slot; slotcov turns those
//! counters into per-test bit-vectors and answers coverage queries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SLOTCOV                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   apply    ┌──────────────┐                    │
//! │  │ Instrument.  │──────────► │  Registry    │  versioned model   │
//! │  │ Session      │  (CAS)     │  (slots)     │  of the project    │
//! │  └──────────────┘            └──────┬───────┘                    │
//! │                                     │ size, samples              │
//! │  ┌──────────────┐   parse    ┌──────▼───────┐                    │
//! │  │ Recordings   │──────────► │ PerTest      │  in-memory or      │
//! │  │ (RLE files)  │            │ Coverage     │  sampled + LRU     │
//! │  └──────────────┘            └──────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use slotcov::coverage::{InMemoryCoverage, PerTestCoverage, SlotRange, TestCaseInfo, TestId};
//! use slotcov::codec::PerTestRecording;
//!
//! let recording = PerTestRecording::new("ShopTest", "addsItem", vec![1, 0, 4]);
//! let info = TestCaseInfo::from_recording(TestId::new(0), &recording);
//!
//! let mut coverage = InMemoryCoverage::new(3);
//! coverage.add_coverage(&info, &recording).unwrap();
//! assert_eq!(coverage.all_hits().count_ones(), 2);
//! assert_eq!(coverage.tests_covering(SlotRange::new(2, 1)).len(), 1);
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Growable bit-vector used for per-test hit sets and aggregate masks
pub mod bits;

/// Recording file format and run-length counter codec
pub mod codec;

/// Per-test coverage strategies and queries
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod coverage;

/// Project registry, slot allocation and instrumentation sessions
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod registry;

/// Error types
pub mod result;

pub use bits::BitVector;
pub use codec::{read_recording, ExitStatus, PerTestRecording};
pub use coverage::{
    ingest_recordings, new_per_test_coverage, CoverageConfig, CoverageStrategy, PerTestCoverage,
    SlotRange, TestCaseInfo, TestId,
};
pub use registry::{InstrumentationSession, ProjectInfo, Registry};
pub use result::{SlotcovError, SlotcovResult};
