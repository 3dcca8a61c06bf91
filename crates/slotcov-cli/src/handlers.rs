//! Subcommand implementations

use crate::commands::{InspectArgs, QueryArgs, RegistryArgs};
use crate::config::{load_coverage_config, CliConfig};
use crate::error::{CliError, CliResult};
use crate::output::{percent, OutputFormat, Reporter};
use serde::Serialize;
use slotcov::coverage::{CoverageDataSpec, TestId, TestOutcome};
use slotcov::registry::{AccessMode, InstrumentationInfo};
use slotcov::{
    ingest_recordings, new_per_test_coverage, read_recording, PerTestCoverage, PerTestRecording,
    Registry, SlotRange,
};
use std::path::Path;

fn reporter(config: &CliConfig) -> Reporter {
    Reporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

/// `slotcov inspect` result
#[derive(Debug, Serialize)]
pub struct RecordingSummary {
    /// Qualified test name
    pub test: String,
    /// How the test ended
    pub outcome: String,
    /// Registry version the recording was taken against
    pub registry_version: i64,
    /// Test start (ms since epoch)
    pub start: i64,
    /// Test duration in seconds
    pub duration: f64,
    /// Slots in the recording
    pub slots: usize,
    /// Sum of all counters
    pub hit_sum: i64,
    /// Slots with a non-zero counter
    pub covered: usize,
}

impl From<&PerTestRecording> for RecordingSummary {
    fn from(recording: &PerTestRecording) -> Self {
        Self {
            test: recording.qualified_name(),
            outcome: format!("{:?}", TestOutcome::from(recording)),
            registry_version: recording.header.registry_version,
            start: recording.start,
            duration: recording.duration,
            slots: recording.slot_count(),
            hit_sum: recording.hit_sum,
            covered: recording.coverage.count_ones(),
        }
    }
}

fn split_path(path: &Path) -> CliResult<(&Path, &str)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::invalid_argument(format!("not a file: {}", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, name))
}

/// Print one recording's header and hit summary
pub fn run_inspect(config: &CliConfig, args: &InspectArgs) -> CliResult<()> {
    let (dir, name) = split_path(&args.recording)?;
    let recording = read_recording(dir, name, &CoverageDataSpec::default())?;
    let summary = RecordingSummary::from(&recording);
    let out = reporter(config);

    match OutputFormat::from(args.format) {
        OutputFormat::Json => out.json(&summary)?,
        OutputFormat::Text => {
            out.header(&summary.test);
            out.field("Outcome", &summary.outcome);
            out.field("Registry", summary.registry_version);
            out.field("Duration", format!("{:.3}s", summary.duration));
            out.field("Slots", summary.slots);
            out.field("Hit sum", summary.hit_sum);
            out.field(
                "Covered",
                format!(
                    "{} ({:.1}%)",
                    summary.covered,
                    percent(summary.covered, summary.slots)
                ),
            );
        }
    }
    Ok(())
}

/// One file of a registry listing
#[derive(Debug, Serialize)]
pub struct FileSummary {
    /// File name
    pub name: String,
    /// File path
    pub path: String,
    /// Slot range
    pub range: SlotRange,
}

/// One package of a registry listing
#[derive(Debug, Serialize)]
pub struct PackageSummary {
    /// Package name
    pub name: String,
    /// Slot range spanning the package's files
    pub range: SlotRange,
    /// Files in insertion order
    pub files: Vec<FileSummary>,
}

/// `slotcov registry` result
#[derive(Debug, Serialize)]
pub struct RegistrySummary {
    /// Project name
    pub project: String,
    /// Registry version
    pub version: i64,
    /// Slot high-watermark
    pub slots: usize,
    /// Committed sessions, newest first
    pub history: Vec<InstrumentationInfo>,
    /// Packages in insertion order
    pub packages: Vec<PackageSummary>,
}

impl From<&Registry> for RegistrySummary {
    fn from(registry: &Registry) -> Self {
        let project = registry.project();
        let packages = project
            .packages
            .values()
            .map(|package| PackageSummary {
                name: package.name.clone(),
                range: package.slot_range(),
                files: package
                    .files
                    .values()
                    .map(|file| FileSummary {
                        name: file.name.clone(),
                        path: file.path.clone(),
                        range: file.slot_range(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            project: project.name.clone(),
            version: registry.version(),
            slots: registry.data_length(),
            history: registry.instrumentation_history(),
            packages,
        }
    }
}

/// Print a saved registry's layout
pub fn run_registry(config: &CliConfig, args: &RegistryArgs) -> CliResult<()> {
    let registry = Registry::load_json(&args.registry, AccessMode::ReadOnly)?;
    let summary = RegistrySummary::from(&registry);
    let out = reporter(config);

    match OutputFormat::from(args.format) {
        OutputFormat::Json => out.json(&summary)?,
        OutputFormat::Text => {
            out.header(&summary.project);
            out.field("Version", summary.version);
            out.field("Slots", summary.slots);
            out.field("Sessions", summary.history.len());
            for package in &summary.packages {
                out.field("Package", format!("{} {}", package.name, package.range));
                for file in &package.files {
                    out.item(&format!("{} {}", file.name, file.range));
                }
            }
        }
    }
    Ok(())
}

/// One test covering the queried file
#[derive(Debug, Serialize)]
pub struct CoveringTest {
    /// Snapshot-local id
    pub id: u32,
    /// Qualified test name
    pub name: String,
    /// How the test ended
    pub outcome: String,
    /// Slots of the file the test hit
    pub covered: usize,
}

/// Per-file part of a query result
#[derive(Debug, Serialize)]
pub struct FileCoverage {
    /// File name
    pub name: String,
    /// Slot range
    pub range: SlotRange,
    /// Covering tests in id order
    pub tests: Vec<CoveringTest>,
}

/// `slotcov query` result
#[derive(Debug, Serialize)]
pub struct QuerySummary {
    /// Strategy used
    pub strategy: String,
    /// Slot count of the snapshot
    pub slots: usize,
    /// Distinct tests ingested
    pub tests: usize,
    /// Recordings ingested
    pub ingested: usize,
    /// Recordings skipped
    pub skipped: usize,
    /// Slots hit by any test
    pub covered: usize,
    /// Slots hit by a passing test
    pub pass_only: usize,
    /// Slots hit by exactly one test
    pub unique: usize,
    /// Tests covering the requested file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileCoverage>,
}

/// Ingest recordings against a registry and report aggregate coverage
pub fn run_query(config: &CliConfig, args: &QueryArgs) -> CliResult<()> {
    let registry = Registry::load_json(&args.registry, AccessMode::ReadOnly)?;
    let mut coverage_config = args
        .config
        .as_deref()
        .map(load_coverage_config)
        .transpose()?
        .unwrap_or_default();
    if let Some(strategy) = args.strategy {
        coverage_config.strategy = strategy.into();
    }
    if let Some(budget) = args.cache_budget {
        coverage_config.cache_budget_bytes = budget;
    }
    coverage_config.ensure_valid()?;

    let mut coverage = new_per_test_coverage(&coverage_config, &registry);
    let ingest = ingest_recordings(
        &args.recordings,
        coverage.as_mut(),
        &coverage_config.data_spec(),
    )?;
    let out = reporter(config);
    if ingest.skipped > 0 {
        out.warning(&format!("{} recording(s) could not be read", ingest.skipped));
    }

    let file = match &args.file {
        None => None,
        Some(name) => {
            let project = registry.project();
            let file = project
                .find_file(name)
                .ok_or_else(|| CliError::invalid_argument(format!("unknown file '{name}'")))?;
            let tests = coverage
                .tests_and_coverage_for_file(file)
                .into_iter()
                .filter_map(|(id, hits)| {
                    coverage.test_by_id(id).map(|test| CoveringTest {
                        id: id.as_u32(),
                        name: test.qualified_name(),
                        outcome: format!("{:?}", test.outcome),
                        covered: hits.count_ones(),
                    })
                })
                .collect();
            Some(FileCoverage {
                name: file.name.clone(),
                range: file.slot_range(),
                tests,
            })
        }
    };

    let summary = QuerySummary {
        strategy: coverage_config.strategy.to_string(),
        slots: coverage.coverage_size(),
        tests: ingest.tests,
        ingested: ingest.ingested,
        skipped: ingest.skipped,
        covered: coverage.all_hits().count_ones(),
        pass_only: coverage.pass_only_hits().count_ones(),
        unique: coverage.unique_hits().count_ones(),
        file,
    };

    match OutputFormat::from(args.format) {
        OutputFormat::Json => out.json(&summary)?,
        OutputFormat::Text => {
            out.header("Per-test coverage");
            out.field("Strategy", &summary.strategy);
            out.field("Tests", summary.tests);
            out.field(
                "Covered",
                format!(
                    "{}/{} ({:.1}%)",
                    summary.covered,
                    summary.slots,
                    percent(summary.covered, summary.slots)
                ),
            );
            out.field("Pass-only", summary.pass_only);
            out.field("Unique", summary.unique);
            if let Some(file) = &summary.file {
                out.field("File", format!("{} {}", file.name, file.range));
                for test in &file.tests {
                    out.item(&format!(
                        "{} {} [{}] {} slot(s)",
                        TestId::new(test.id),
                        test.name,
                        test.outcome,
                        test.covered
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use slotcov::codec::ExitStatus;

    #[test]
    fn test_recording_summary() {
        let recording = PerTestRecording::new("ShopTest", "adds", vec![2, 0, 3])
            .with_exit_status(ExitStatus::Abnormal {
                message: None,
                stack_trace: None,
            });
        let summary = RecordingSummary::from(&recording);
        assert_eq!(summary.test, "ShopTest.adds");
        assert_eq!(summary.outcome, "Failed");
        assert_eq!(summary.slots, 3);
        assert_eq!(summary.hit_sum, 5);
        assert_eq!(summary.covered, 2);
    }

    #[test]
    fn test_recording_summary_without_result() {
        let recording =
            PerTestRecording::new("ShopTest", "skipped", vec![]).with_exit_status(ExitStatus::NoResult);
        let summary = RecordingSummary::from(&recording);
        assert_eq!(summary.outcome, "NoResult");
        assert_eq!(summary.covered, 0);
    }

    #[test]
    fn test_split_bare_file_name() {
        let (dir, name) = split_path(Path::new("a.slice")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "a.slice");
    }

    #[test]
    fn test_empty_registry_summary() {
        let summary = RegistrySummary::from(&Registry::new("empty"));
        assert_eq!(summary.project, "empty");
        assert_eq!(summary.slots, 0);
        assert!(summary.packages.is_empty());
    }
}
