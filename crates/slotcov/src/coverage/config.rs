//! Coverage engine configuration.
//!
//! Supports JSON/YAML deserialization via serde. Every field has a default,
//! so a partial file (or an empty object) is a valid configuration.

use crate::codec::recording::DEFAULT_RECORDING_EXTENSION;
use crate::codec::DEFAULT_MAX_COUNTERS;
use crate::result::{SlotcovError, SlotcovResult};
use serde::{Deserialize, Serialize};

/// Default byte budget of the sampling strategy's recording cache (64 MiB)
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

/// Per-test coverage strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageStrategy {
    /// Every test's bit-vector stays resident
    #[default]
    InMemory,
    /// Per-file sample index plus disk-backed bit-vectors behind an LRU cache
    Sampling,
}

impl std::str::FromStr for CoverageStrategy {
    type Err = SlotcovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-memory" | "memory" => Ok(Self::InMemory),
            "sampling" | "sampled" => Ok(Self::Sampling),
            other => Err(SlotcovError::invalid_config(format!(
                "unknown strategy '{other}' (expected in-memory or sampling)"
            ))),
        }
    }
}

impl std::fmt::Display for CoverageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::Sampling => f.write_str("sampling"),
        }
    }
}

/// Root configuration of the coverage engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Which per-test strategy to build
    pub strategy: CoverageStrategy,
    /// Byte budget of the sampling strategy's recording cache
    pub cache_budget_bytes: u64,
    /// Drop test-harness frames from failure stack traces
    pub filter_traces: bool,
    /// Frame prefixes treated as harness frames
    pub trace_filter_prefixes: Vec<String>,
    /// Extension of per-test recording files
    pub recording_extension: String,
    /// Expected number of recordings, used to pre-size maps
    pub estimated_recordings: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            strategy: CoverageStrategy::default(),
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            filter_traces: false,
            trace_filter_prefixes: default_trace_filter_prefixes(),
            recording_extension: DEFAULT_RECORDING_EXTENSION.to_string(),
            estimated_recordings: 0,
        }
    }
}

fn default_trace_filter_prefixes() -> Vec<String> {
    [
        "org.junit.",
        "junit.framework.",
        "org.testng.",
        "sun.reflect.",
        "java.lang.reflect.",
        "jdk.internal.reflect.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl CoverageConfig {
    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(yaml)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }

    /// Validate configuration values
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.strategy == CoverageStrategy::Sampling && self.cache_budget_bytes == 0 {
            errors.push(ConfigValidationError {
                field: "cache_budget_bytes".to_string(),
                message: "Must be at least 1 when strategy is sampling".to_string(),
            });
        }

        let ext = self.recording_extension.as_str();
        if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\']) {
            errors.push(ConfigValidationError {
                field: "recording_extension".to_string(),
                message: "Must be a bare extension such as \"slice\"".to_string(),
            });
        }

        if self.filter_traces && self.trace_filter_prefixes.iter().any(String::is_empty) {
            errors.push(ConfigValidationError {
                field: "trace_filter_prefixes".to_string(),
                message: "Empty prefix would drop every frame".to_string(),
            });
        }

        errors
    }

    /// Check if configuration is valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Validate, folding all problems into one error
    pub fn ensure_valid(&self) -> SlotcovResult<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(SlotcovError::invalid_config(joined))
    }

    /// Settings the recording reader and sampling strategy need
    #[must_use]
    pub fn data_spec(&self) -> CoverageDataSpec {
        CoverageDataSpec {
            cache_budget_bytes: self.cache_budget_bytes,
            filter_traces: self.filter_traces,
            trace_filter_prefixes: self.trace_filter_prefixes.clone(),
            recording_extension: self.recording_extension.clone(),
            max_slots: DEFAULT_MAX_COUNTERS,
        }
    }
}

/// Read-side settings handed to recording lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageDataSpec {
    /// Byte budget of the recording cache
    pub cache_budget_bytes: u64,
    /// Drop test-harness frames from failure stack traces
    pub filter_traces: bool,
    /// Frame prefixes treated as harness frames
    pub trace_filter_prefixes: Vec<String>,
    /// Extension of per-test recording files
    pub recording_extension: String,
    /// Most slots a recording may declare; larger ones are corrupt
    pub max_slots: usize,
}

impl Default for CoverageDataSpec {
    fn default() -> Self {
        CoverageConfig::default().data_spec()
    }
}

impl CoverageDataSpec {
    /// Same settings, rejecting recordings longer than `slots`
    #[must_use]
    pub fn bounded_to(mut self, slots: usize) -> Self {
        self.max_slots = self.max_slots.min(slots);
        self
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    /// Field that failed validation
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
