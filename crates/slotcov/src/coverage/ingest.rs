//! Bulk ingestion of a directory of recordings.

use super::{CoverageDataSpec, PerTestCoverage, TestCaseInfo, TestId};
use crate::codec::read_recording;
use crate::result::SlotcovResult;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// What [`ingest_recordings`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Recordings added
    pub ingested: usize,
    /// Recordings that could not be read
    pub skipped: usize,
    /// Distinct tests seen
    pub tests: usize,
}

/// Add every recording in `dir` to `coverage`.
///
/// Files are taken in name order. Each distinct qualified test name gets the
/// next [`TestId`]; a later recording of the same test is merged into the
/// hits of the earlier ones. Recordings that fail to parse are logged and
/// skipped, as are recordings declaring more slots than `coverage` holds.
///
/// # Errors
///
/// Fails if `dir` cannot be listed.
pub fn ingest_recordings(
    dir: &Path,
    coverage: &mut dyn PerTestCoverage,
    spec: &CoverageDataSpec,
) -> SlotcovResult<IngestSummary> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| ext == spec.recording_extension.as_str())
        })
        .collect();
    names.sort();
    let spec = spec.clone().bounded_to(coverage.coverage_size());

    let mut ids: HashMap<String, TestId> = HashMap::new();
    let mut summary = IngestSummary::default();
    for name in &names {
        let recording = match read_recording(dir, name, &spec) {
            Ok(recording) => recording,
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "skipping unreadable recording");
                summary.skipped += 1;
                continue;
            }
        };
        let next = TestId::new(u32::try_from(ids.len()).unwrap_or(u32::MAX));
        let id = *ids.entry(recording.qualified_name()).or_insert(next);
        let info = TestCaseInfo::from_recording(id, &recording);
        if let Err(err) = coverage.add_coverage(&info, &recording) {
            tracing::warn!(file = %name, error = %err, "skipping rejected recording");
            summary.skipped += 1;
            continue;
        }
        summary.ingested += 1;
    }
    summary.tests = ids.len();
    tracing::info!(
        dir = %dir.display(),
        ingested = summary.ingested,
        skipped = summary.skipped,
        tests = summary.tests,
        "recordings ingested"
    );
    Ok(summary)
}
