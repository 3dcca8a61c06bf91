//! Run-length encoding of per-slot hit counters.
//!
//! Stream layout: element count (`i32`), then the body. In the RLE body a
//! run of at least [`RLE_RUN_THRESHOLD`] equal values is written as the
//! tuple `(RLE_RUN_MARKER, run_length, value)` and every other value as a
//! plain `i32`. The uncompressed body is just the values.
//!
//! A counter equal to [`RLE_RUN_MARKER`] is written as `RLE_RUN_MARKER - 1`
//! by both writers, so the marker never appears as data and one decoder
//! reads either body.

use super::ByteReader;
use crate::result::{SlotcovError, SlotcovResult};
use std::io::{self, Write};

/// Marks the start of a `(marker, length, value)` run tuple
pub const RLE_RUN_MARKER: i32 = -1;

/// Minimum number of equal consecutive values written as a run
pub const RLE_RUN_THRESHOLD: usize = 3;

/// Largest counter count a stream may declare when no tighter bound is known
pub const DEFAULT_MAX_COUNTERS: usize = 1 << 26;

const INT_BYTES: usize = 4;

/// Counters decoded from a stream, with their total
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCounters {
    /// One counter per slot
    pub values: Vec<i32>,
    /// Sum of all counters, accumulated while decoding
    pub sum: i64,
}

#[inline]
const fn unmark(value: i32) -> i32 {
    if value == RLE_RUN_MARKER {
        RLE_RUN_MARKER - 1
    } else {
        value
    }
}

fn write_count<W: Write>(out: &mut W, len: usize) -> io::Result<()> {
    let count = i32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many counters"))?;
    out.write_all(&count.to_be_bytes())
}

/// Write counters as an RLE stream, returning the number of bytes written
pub fn write_rle<W: Write>(out: &mut W, values: &[i32]) -> io::Result<usize> {
    write_count(out, values.len())?;
    let mut written = INT_BYTES;
    let mut i = 0;
    while i < values.len() {
        let value = values[i];
        let run = values[i..].iter().take_while(|&&v| v == value).count();
        if run >= RLE_RUN_THRESHOLD {
            let run_len = i32::try_from(run)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "run too long"))?;
            out.write_all(&RLE_RUN_MARKER.to_be_bytes())?;
            out.write_all(&run_len.to_be_bytes())?;
            out.write_all(&unmark(value).to_be_bytes())?;
            written += 3 * INT_BYTES;
            i += run;
        } else {
            // Shorter runs stay literal; a tuple would cost more than it saves.
            for _ in 0..run {
                out.write_all(&unmark(value).to_be_bytes())?;
            }
            written += run * INT_BYTES;
            i += run;
        }
    }
    tracing::debug!(counters = values.len(), bytes = written, "RLE stream written");
    Ok(written)
}

/// Write counters as plain integers, returning the number of bytes written
pub fn write_uncompressed<W: Write>(out: &mut W, values: &[i32]) -> io::Result<usize> {
    write_count(out, values.len())?;
    for &value in values {
        out.write_all(&unmark(value).to_be_bytes())?;
    }
    Ok(INT_BYTES * (values.len() + 1))
}

/// Decode a counter stream written by either [`write_rle`] or [`write_uncompressed`].
///
/// The stream may declare at most [`DEFAULT_MAX_COUNTERS`] counters.
pub fn read_counters(bytes: &[u8]) -> SlotcovResult<DecodedCounters> {
    let mut reader = ByteReader::new(bytes);
    let decoded = decode(&mut reader, DEFAULT_MAX_COUNTERS)?;
    tracing::debug!(
        counters = decoded.values.len(),
        bytes = reader.position(),
        "counter stream decoded"
    );
    Ok(decoded)
}

/// Decode one stream declaring no more than `max_counters` counters
pub(crate) fn decode(
    reader: &mut ByteReader<'_>,
    max_counters: usize,
) -> SlotcovResult<DecodedCounters> {
    let count = reader.read_i32("counter count")?;
    let count = usize::try_from(count)
        .map_err(|_| SlotcovError::corrupt(format!("negative counter count {count}")))?;
    // Runs are bounded by the count, so this also bounds what a run can allocate.
    if count > max_counters {
        return Err(SlotcovError::corrupt(format!(
            "declares {count} counters, more than the {max_counters} expected"
        )));
    }
    // The count is untrusted; cap the reservation by what the body could hold.
    let mut values = Vec::with_capacity(count.min(reader.remaining().len() / INT_BYTES * 3));
    let mut sum = 0i64;

    while values.len() < count {
        let value = reader.read_i32("counter")?;
        if value == RLE_RUN_MARKER {
            let run = reader.read_i32("run length")?;
            let repeated = reader.read_i32("run value")?;
            let run = usize::try_from(run)
                .map_err(|_| SlotcovError::corrupt(format!("negative run length {run}")))?;
            if values.len() + run > count {
                return Err(SlotcovError::corrupt(format!(
                    "run of {run} at index {} overruns {count} counters",
                    values.len()
                )));
            }
            values.resize(values.len() + run, repeated);
            sum += i64::from(repeated) * run as i64;
        } else {
            values.push(value);
            sum += i64::from(value);
        }
    }

    Ok(DecodedCounters { values, sum })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(values: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        let written = write_rle(&mut out, values).unwrap();
        assert_eq!(written, out.len());
        out
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_run_is_compacted() {
        let bytes = encode(&[5, 5, 5, 5, 5]);
        assert!(bytes.len() - INT_BYTES < 5 * INT_BYTES);
        assert!(bytes.len() < 5 * INT_BYTES);
        let decoded = read_counters(&bytes).unwrap();
        assert_eq!(decoded.values, vec![5, 5, 5, 5, 5]);
        assert_eq!(decoded.sum, 25);
    }

    #[test]
    fn test_short_runs_stay_literal() {
        let bytes = encode(&[0, 0, 1, 2, 2]);
        assert_eq!(bytes, ints(&[5, 0, 0, 1, 2, 2]));
    }

    #[test]
    fn test_run_starts_at_threshold() {
        let bytes = encode(&[7, 7, 7, 1]);
        assert_eq!(bytes, ints(&[4, RLE_RUN_MARKER, 3, 7, 1]));
    }

    #[test]
    fn test_marker_value_is_rebiased() {
        let decoded = read_counters(&encode(&[-1, 4, -1, -1, -1])).unwrap();
        assert_eq!(decoded.values, vec![-2, 4, -2, -2, -2]);
        assert_eq!(decoded.sum, -4);
    }

    #[test]
    fn test_uncompressed_stream_decodes() {
        let mut out = Vec::new();
        let written = write_uncompressed(&mut out, &[3, 3, 3, 0, 9]).unwrap();
        assert_eq!(written, out.len());
        assert_eq!(out, ints(&[5, 3, 3, 3, 0, 9]));
        let decoded = read_counters(&out).unwrap();
        assert_eq!(decoded.values, vec![3, 3, 3, 0, 9]);
        assert_eq!(decoded.sum, 18);
    }

    #[test]
    fn test_empty_stream() {
        let decoded = read_counters(&encode(&[])).unwrap();
        assert!(decoded.values.is_empty());
        assert_eq!(decoded.sum, 0);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let mut bytes = encode(&[1, 2, 3, 4]);
        bytes.truncate(bytes.len() - 2);
        let err = read_counters(&bytes).unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
    }

    #[test]
    fn test_run_overrunning_count_is_corrupt() {
        let bytes = ints(&[2, RLE_RUN_MARKER, 5, 1]);
        let err = read_counters(&bytes).unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn test_negative_lengths_are_corrupt() {
        assert!(read_counters(&ints(&[-3])).unwrap_err().is_recoverable());
        let err = read_counters(&ints(&[4, RLE_RUN_MARKER, -2, 1])).unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
    }

    #[test]
    fn test_huge_declared_count_does_not_preallocate() {
        let err = read_counters(&ints(&[i32::MAX, 1])).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_huge_run_is_rejected_before_expanding() {
        let err = read_counters(&ints(&[i32::MAX, RLE_RUN_MARKER, i32::MAX, 0])).unwrap_err();
        assert!(matches!(err, SlotcovError::RecordingCorrupt { .. }));
        assert!(err.to_string().contains("more than"));
    }

    #[test]
    fn test_count_bounded_by_caller() {
        let bytes = encode(&[0; 64]);
        let decoded = decode(&mut ByteReader::new(&bytes), 64).unwrap();
        assert_eq!(decoded.values.len(), 64);
        let err = decode(&mut ByteReader::new(&bytes), 63).unwrap_err();
        assert!(err.is_recoverable());
    }

    proptest! {
        #[test]
        fn prop_round_trip_and_sum(values in proptest::collection::vec(
            prop_oneof![Just(0i32), Just(1), Just(2), 0i32..1000, -1000i32..-1],
            0..300
        )) {
            let decoded = read_counters(&encode(&values)).unwrap();
            let expected: i64 = values.iter().map(|&v| i64::from(v)).sum();
            prop_assert_eq!(decoded.sum, expected);
            prop_assert_eq!(decoded.values, values);
        }

        #[test]
        fn prop_rle_never_larger_than_raw(values in proptest::collection::vec(0i32..4, 0..300)) {
            let mut raw = Vec::new();
            write_uncompressed(&mut raw, &values).unwrap();
            prop_assert!(encode(&values).len() <= raw.len());
        }
    }
}
