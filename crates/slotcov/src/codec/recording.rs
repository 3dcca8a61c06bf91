//! Per-test recording files.
//!
//! One file per test execution:
//!
//! ```text
//! magic u32 "SLOT" | format u32 | registry_version i64 | write_timestamp i64
//! test_type_name str | test_method_name str | runtime_test_name str (empty = none)
//! exit_status i32 (0 normal, 1 abnormal, -1 no result)
//!   [exit_message str | stack_trace str]   only when abnormal
//! start i64 | duration f64
//! compressed u8 | counter stream (see `rle`)
//! ```
//!
//! Strings are `u32`-length-prefixed UTF-8.

use super::rle::{self, DecodedCounters};
use super::ByteReader;
use crate::bits::BitVector;
use crate::coverage::CoverageDataSpec;
use crate::result::{SlotcovError, SlotcovResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File magic, ASCII "SLOT"
pub const RECORDING_MAGIC: u32 = 0x534C_4F54;

/// Current recording format
pub const RECORDING_FORMAT: u32 = 1;

/// Extension used when none is configured
pub const DEFAULT_RECORDING_EXTENSION: &str = "slice";

/// File-level header of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordingHeader {
    /// Format number
    pub format: u32,
    /// Registry version the instrumented code was built against
    pub registry_version: i64,
    /// When the file was written (ms since epoch)
    pub write_timestamp: i64,
}

/// How a test execution ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExitStatus {
    /// Test completed and passed
    #[default]
    Normal,
    /// Test failed or threw
    Abnormal {
        /// Failure message, if any
        message: Option<String>,
        /// Stack trace, if any
        stack_trace: Option<String>,
    },
    /// No result was recorded
    NoResult,
}

impl ExitStatus {
    const fn code(&self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Abnormal { .. } => 1,
            Self::NoResult => -1,
        }
    }
}

/// Coverage and metadata of one test execution
#[derive(Debug, Clone, PartialEq)]
pub struct PerTestRecording {
    /// File header
    pub header: RecordingHeader,
    /// Declaring type of the test
    pub test_type_name: String,
    /// Test method name
    pub test_method_name: String,
    /// Name reported by the test runner, when it differs from the method name
    pub runtime_test_name: Option<String>,
    /// Outcome
    pub exit_status: ExitStatus,
    /// Start time (ms since epoch)
    pub start: i64,
    /// Duration in seconds
    pub duration: f64,
    /// Raw per-slot hit counters
    pub counters: Vec<i32>,
    /// Sum of all counters
    pub hit_sum: i64,
    /// Slots with a non-zero counter
    pub coverage: BitVector,
    /// File the recording was read from
    pub source: Option<PathBuf>,
}

impl PerTestRecording {
    /// Create a recording of a passing test from raw counters
    #[must_use]
    pub fn new(
        test_type_name: impl Into<String>,
        test_method_name: impl Into<String>,
        counters: Vec<i32>,
    ) -> Self {
        let hit_sum = counters.iter().map(|&c| i64::from(c)).sum();
        let coverage = BitVector::for_hits(&counters);
        Self {
            header: RecordingHeader {
                format: RECORDING_FORMAT,
                ..RecordingHeader::default()
            },
            test_type_name: test_type_name.into(),
            test_method_name: test_method_name.into(),
            runtime_test_name: None,
            exit_status: ExitStatus::Normal,
            start: 0,
            duration: 0.0,
            counters,
            hit_sum,
            coverage,
            source: None,
        }
    }

    /// Set the exit status
    #[must_use]
    pub fn with_exit_status(mut self, status: ExitStatus) -> Self {
        self.exit_status = status;
        self
    }

    /// Set the runner-reported name
    #[must_use]
    pub fn with_runtime_name(mut self, name: impl Into<String>) -> Self {
        self.runtime_test_name = Some(name.into());
        self
    }

    /// Set start time (ms) and duration (s)
    #[must_use]
    pub fn with_timing(mut self, start: i64, duration: f64) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    /// Set the registry version the run was built against
    #[must_use]
    pub fn with_registry_version(mut self, version: i64) -> Self {
        self.header.registry_version = version;
        self
    }

    /// True if the test ran and passed
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.exit_status == ExitStatus::Normal
    }

    /// True if any outcome was recorded
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.exit_status != ExitStatus::NoResult
    }

    /// Name the test runner knows the test by
    #[must_use]
    pub fn test_name(&self) -> &str {
        self.runtime_test_name
            .as_deref()
            .unwrap_or(&self.test_method_name)
    }

    /// `Type.name`, unique per distinct test
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.test_type_name, self.test_name())
    }

    /// Number of slots covered by the counter array
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.counters.len()
    }

    /// File name this recording is written under
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        let sanitised: String = self
            .qualified_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{sanitised}-{}.{extension}", self.start)
    }

    /// Serialise the recording, stamping the current time into the header
    pub fn write_to<W: Write>(&self, out: &mut W, compressed: bool) -> SlotcovResult<()> {
        out.write_all(&RECORDING_MAGIC.to_be_bytes())?;
        out.write_all(&RECORDING_FORMAT.to_be_bytes())?;
        out.write_all(&self.header.registry_version.to_be_bytes())?;
        out.write_all(&chrono::Utc::now().timestamp_millis().to_be_bytes())?;

        write_string(out, &self.test_type_name)?;
        write_string(out, &self.test_method_name)?;
        write_string(out, self.runtime_test_name.as_deref().unwrap_or(""))?;
        out.write_all(&self.exit_status.code().to_be_bytes())?;
        if let ExitStatus::Abnormal {
            message,
            stack_trace,
        } = &self.exit_status
        {
            write_string(out, message.as_deref().unwrap_or(""))?;
            write_string(out, stack_trace.as_deref().unwrap_or(""))?;
        }
        out.write_all(&self.start.to_be_bytes())?;
        out.write_all(&self.duration.to_be_bytes())?;

        out.write_all(&[u8::from(compressed)])?;
        if compressed {
            rle::write_rle(out, &self.counters)?;
        } else {
            rle::write_uncompressed(out, &self.counters)?;
        }
        Ok(())
    }

    /// Write into `dir` with the default extension, returning the file path
    pub fn write_to_dir(&self, dir: &Path) -> SlotcovResult<PathBuf> {
        self.write_to_dir_with(dir, DEFAULT_RECORDING_EXTENSION, true)
    }

    /// Write into `dir` with an explicit extension and encoding
    pub fn write_to_dir_with(
        &self,
        dir: &Path,
        extension: &str,
        compressed: bool,
    ) -> SlotcovResult<PathBuf> {
        let path = dir.join(self.file_name(extension));
        let mut bytes = Vec::new();
        self.write_to(&mut bytes, compressed)?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Parse a recording from bytes
    pub fn parse(bytes: &[u8], spec: &CoverageDataSpec) -> SlotcovResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_u32("magic")?;
        if magic != RECORDING_MAGIC {
            return Err(SlotcovError::invalid_recording(format!(
                "bad magic {magic:#010x}"
            )));
        }
        let format = reader.read_u32("format")?;
        if format != RECORDING_FORMAT {
            return Err(SlotcovError::invalid_recording(format!(
                "unsupported format {format}"
            )));
        }
        let header = RecordingHeader {
            format,
            registry_version: reader.read_i64("registry version")?,
            write_timestamp: reader.read_i64("write timestamp")?,
        };

        let test_type_name = reader.read_string("test type name")?;
        let test_method_name = reader.read_string("test method name")?;
        let runtime_test_name = Some(reader.read_string("runtime test name")?)
            .filter(|name| !name.is_empty());
        let exit_status = match reader.read_i32("exit status")? {
            0 => ExitStatus::Normal,
            1 => {
                let message = reader.read_string("exit message")?;
                let trace = reader.read_string("stack trace")?;
                let trace = if spec.filter_traces {
                    filter_trace(&trace, &spec.trace_filter_prefixes)
                } else {
                    trace
                };
                ExitStatus::Abnormal {
                    message: Some(message).filter(|m| !m.is_empty()),
                    stack_trace: Some(trace).filter(|t| !t.is_empty()),
                }
            }
            -1 => ExitStatus::NoResult,
            other => {
                return Err(SlotcovError::corrupt(format!("unknown exit status {other}")));
            }
        };
        let start = reader.read_i64("start")?;
        let duration = reader.read_f64("duration")?;

        // Both encodings share one decoder; the flag is informational.
        let _compressed = reader.read_u8("compressed flag")?;
        let DecodedCounters { values, sum } = rle::decode(&mut reader, spec.max_slots)?;
        let coverage = BitVector::for_hits(&values);

        Ok(Self {
            header,
            test_type_name,
            test_method_name,
            runtime_test_name,
            exit_status,
            start,
            duration,
            counters: values,
            hit_sum: sum,
            coverage,
            source: None,
        })
    }
}

fn write_string<W: Write>(out: &mut W, value: &str) -> SlotcovResult<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| SlotcovError::invalid_recording("string too long"))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

fn filter_trace(trace: &str, prefixes: &[String]) -> String {
    trace
        .lines()
        .filter(|line| {
            let frame = line.trim_start();
            let frame = frame.strip_prefix("at ").unwrap_or(frame);
            !prefixes.iter().any(|p| frame.starts_with(p.as_str()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Load the recording `file_name` from `dir`
pub fn read_recording(
    dir: &Path,
    file_name: &str,
    spec: &CoverageDataSpec,
) -> SlotcovResult<PerTestRecording> {
    let path = dir.join(file_name);
    let bytes = fs::read(&path)?;
    let mut recording = PerTestRecording::parse(&bytes, spec)?;
    recording.source = Some(path);
    Ok(recording)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PerTestRecording {
        PerTestRecording::new("com.acme.CartTest", "addsItem", vec![0, 3, 3, 3, 3, 0, 1])
            .with_timing(1_700_000_000_000, 0.25)
            .with_registry_version(42)
    }

    #[test]
    fn test_new_derives_coverage_and_sum() {
        let rec = sample();
        assert_eq!(rec.hit_sum, 13);
        assert_eq!(rec.coverage.iter_ones().collect::<Vec<_>>(), vec![1, 2, 3, 4, 6]);
        assert_eq!(rec.slot_count(), 7);
        assert!(rec.is_passed());
        assert!(rec.has_result());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let rec = sample();
        let path = rec.write_to_dir(dir.path()).unwrap();
        assert!(path.to_string_lossy().ends_with(".slice"));

        let name = path.file_name().unwrap().to_str().unwrap();
        let read = read_recording(dir.path(), name, &CoverageDataSpec::default()).unwrap();
        assert_eq!(read.header.registry_version, 42);
        assert!(read.header.write_timestamp > 0);
        assert_eq!(read.test_type_name, "com.acme.CartTest");
        assert_eq!(read.counters, rec.counters);
        assert_eq!(read.hit_sum, 13);
        assert_eq!(read.coverage, rec.coverage);
        assert_eq!(read.start, rec.start);
        assert_eq!(read.source.as_deref(), Some(path.as_path()));
        assert!((read.duration - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uncompressed_file_reads_the_same() {
        let dir = TempDir::new().unwrap();
        let rec = sample();
        let path = rec.write_to_dir_with(dir.path(), "raw", false).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        let read = read_recording(dir.path(), name, &CoverageDataSpec::default()).unwrap();
        assert_eq!(read.counters, rec.counters);
    }

    #[test]
    fn test_abnormal_exit_round_trips() {
        let rec = sample().with_exit_status(ExitStatus::Abnormal {
            message: Some("expected 2".into()),
            stack_trace: None,
        });
        let mut bytes = Vec::new();
        rec.write_to(&mut bytes, true).unwrap();
        let read = PerTestRecording::parse(&bytes, &CoverageDataSpec::default()).unwrap();
        assert!(!read.is_passed());
        assert!(read.has_result());
        assert_eq!(
            read.exit_status,
            ExitStatus::Abnormal {
                message: Some("expected 2".into()),
                stack_trace: None
            }
        );
    }

    #[test]
    fn test_no_result_and_runtime_name() {
        let rec = sample()
            .with_exit_status(ExitStatus::NoResult)
            .with_runtime_name("addsItem[1]");
        let mut bytes = Vec::new();
        rec.write_to(&mut bytes, true).unwrap();
        let read = PerTestRecording::parse(&bytes, &CoverageDataSpec::default()).unwrap();
        assert!(!read.has_result());
        assert_eq!(read.test_name(), "addsItem[1]");
        assert_eq!(read.qualified_name(), "com.acme.CartTest.addsItem[1]");
    }

    #[test]
    fn test_trace_filtering() {
        let trace = "java.lang.AssertionError\n\tat com.acme.Cart.add(Cart.java:10)\n\tat org.junit.Assert.fail(Assert.java:88)";
        let rec = sample().with_exit_status(ExitStatus::Abnormal {
            message: None,
            stack_trace: Some(trace.into()),
        });
        let mut bytes = Vec::new();
        rec.write_to(&mut bytes, false).unwrap();

        let kept = PerTestRecording::parse(&bytes, &CoverageDataSpec::default()).unwrap();
        let spec = CoverageDataSpec {
            filter_traces: true,
            ..CoverageDataSpec::default()
        };
        let filtered = PerTestRecording::parse(&bytes, &spec).unwrap();

        let ExitStatus::Abnormal { stack_trace: Some(full), .. } = kept.exit_status else {
            panic!("expected abnormal exit");
        };
        let ExitStatus::Abnormal { stack_trace: Some(short), .. } = filtered.exit_status else {
            panic!("expected abnormal exit");
        };
        assert!(full.contains("org.junit"));
        assert!(!short.contains("org.junit"));
        assert!(short.contains("com.acme.Cart.add"));
    }

    #[test]
    fn test_file_name_is_sanitised() {
        let rec = PerTestRecording::new("a.B$Inner", "x y/z", vec![]).with_timing(7, 0.0);
        assert_eq!(rec.file_name("slice"), "a.B_Inner.x_y_z-7.slice");
    }

    #[test]
    fn test_bad_magic_is_invalid() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes, true).unwrap();
        bytes[0] = b'X';
        let err = PerTestRecording::parse(&bytes, &CoverageDataSpec::default()).unwrap_err();
        assert!(matches!(err, SlotcovError::InvalidRecording { .. }));
    }

    #[test]
    fn test_truncated_counters_are_corrupt() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes, true).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = PerTestRecording::parse(&bytes, &CoverageDataSpec::default()).unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
    }

    #[test]
    fn test_more_counters_than_slots_is_corrupt() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes, true).unwrap();
        let fits = CoverageDataSpec::default().bounded_to(7);
        assert_eq!(PerTestRecording::parse(&bytes, &fits).unwrap().slot_count(), 7);

        let err = PerTestRecording::parse(&bytes, &CoverageDataSpec::default().bounded_to(6))
            .unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_recording(dir.path(), "absent.slice", &CoverageDataSpec::default())
            .unwrap_err();
        assert!(matches!(err, SlotcovError::Io(_)));
        assert!(err.is_recoverable());
    }
}
