//! Versioned project registry.
//!
//! The registry holds an immutable [`ProjectInfo`] snapshot behind a lock.
//! Sessions read the snapshot at start, build their changes privately, and
//! commit through [`Registry::apply_update`], which succeeds only if no other
//! commit happened in between. A successful commit swaps in a new snapshot;
//! readers holding the old `Arc` keep a consistent view.

use super::context::ContextStore;
use super::entities::{PackageInfo, ProjectInfo};
use super::session::InstrumentationSession;
use crate::result::{SlotcovError, SlotcovResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Whether a registry accepts instrumentation sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Sessions may be started and committed
    #[default]
    ReadWrite,
    /// Snapshot for reporting only
    ReadOnly,
}

/// One committed instrumentation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationInfo {
    /// Version the commit produced
    pub version: i64,
    /// Session start (ms since epoch)
    pub start_ts: i64,
    /// Session end (ms since epoch)
    pub end_ts: i64,
}

/// Immutable result of a finished session
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub(crate) version: i64,
    pub(crate) start_ts: i64,
    pub(crate) end_ts: i64,
    pub(crate) slot_count: usize,
    pub(crate) changed_packages: Vec<PackageInfo>,
    pub(crate) context_store: Arc<ContextStore>,
}

impl SessionUpdate {
    /// Version the registry moves to when this update is applied
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Session start (ms since epoch)
    #[must_use]
    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    /// Session end (ms since epoch)
    #[must_use]
    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    /// Slot high-watermark after the session
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Packages the session touched
    #[must_use]
    pub fn changed_packages(&self) -> &[PackageInfo] {
        &self.changed_packages
    }

    /// Context store the session instrumented against
    #[must_use]
    pub fn context_store(&self) -> &Arc<ContextStore> {
        &self.context_store
    }

    /// Number of files the session instrumented
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.changed_packages.iter().map(|p| p.files.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryState {
    version: i64,
    project: Arc<ProjectInfo>,
    context_store: Arc<ContextStore>,
    /// Newest first
    history: Vec<InstrumentationInfo>,
}

/// Shared, versioned project model
#[derive(Debug)]
pub struct Registry {
    access: AccessMode,
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Empty read-write registry
    #[must_use]
    pub fn new(project_name: impl Into<String>) -> Self {
        Self::with_access(project_name, AccessMode::ReadWrite)
    }

    /// Empty registry with the given access mode
    #[must_use]
    pub fn with_access(project_name: impl Into<String>, access: AccessMode) -> Self {
        Self {
            access,
            state: RwLock::new(RegistryState {
                version: 0,
                project: Arc::new(ProjectInfo::new(project_name)),
                context_store: Arc::new(ContextStore::new()),
                history: Vec::new(),
            }),
        }
    }

    /// True if sessions cannot be started
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.access == AccessMode::ReadOnly
    }

    /// Access mode
    #[must_use]
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Current version
    #[must_use]
    pub fn version(&self) -> i64 {
        self.state.read().version
    }

    /// Current project snapshot
    #[must_use]
    pub fn project(&self) -> Arc<ProjectInfo> {
        Arc::clone(&self.state.read().project)
    }

    /// Slot high-watermark
    #[must_use]
    pub fn data_length(&self) -> usize {
        self.state.read().project.data_length
    }

    /// Context store
    #[must_use]
    pub fn context_store(&self) -> Arc<ContextStore> {
        Arc::clone(&self.state.read().context_store)
    }

    /// Committed passes, newest first
    #[must_use]
    pub fn instrumentation_history(&self) -> Vec<InstrumentationInfo> {
        self.state.read().history.clone()
    }

    /// Version, project and contexts read under one lock
    pub(crate) fn snapshot(&self) -> (i64, Arc<ProjectInfo>, Arc<ContextStore>) {
        let state = self.state.read();
        (
            state.version,
            Arc::clone(&state.project),
            Arc::clone(&state.context_store),
        )
    }

    /// Register a user context, returning its index
    pub fn register_context(&self, name: &str) -> SlotcovResult<usize> {
        let mut state = self.state.write();
        if let Some(index) = state.context_store.index_of(name) {
            return Ok(index);
        }
        let mut store = (*state.context_store).clone();
        let index = store.register(name).ok_or_else(|| {
            SlotcovError::invalid_config(format!("cannot register context '{name}': store is full"))
        })?;
        state.context_store = Arc::new(store);
        Ok(index)
    }

    /// Start an instrumentation session against the current version
    pub fn start_session(self: &Arc<Self>) -> SlotcovResult<InstrumentationSession> {
        InstrumentationSession::new(Arc::clone(self))
    }

    /// Merge a finished session if the registry is still at `expected_version`.
    ///
    /// Fails with [`SlotcovError::ConcurrentInstrumentation`] if another
    /// commit landed first, or if the update would not move the version
    /// forward; the caller must instrument its unit again.
    pub fn apply_update(
        &self,
        expected_version: i64,
        update: SessionUpdate,
    ) -> SlotcovResult<Arc<SessionUpdate>> {
        if self.is_read_only() {
            return Err(SlotcovError::ReadOnlyRegistry);
        }
        let mut state = self.state.write();
        if state.version != expected_version {
            return Err(SlotcovError::ConcurrentInstrumentation {
                expected: expected_version,
                actual: state.version,
            });
        }
        if update.version <= state.version {
            return Err(SlotcovError::ConcurrentInstrumentation {
                expected: update.version,
                actual: state.version,
            });
        }

        let mut project = (*state.project).clone();
        for changed in &update.changed_packages {
            merge_package(&mut project, changed);
        }
        project.data_length = project.data_length.max(update.slot_count);

        state.project = Arc::new(project);
        state.version = update.version;
        state.history.insert(
            0,
            InstrumentationInfo {
                version: update.version,
                start_ts: update.start_ts,
                end_ts: update.end_ts,
            },
        );
        tracing::info!(
            version = update.version,
            slots = state.project.data_length,
            files = update.file_count(),
            "registry update applied"
        );
        Ok(Arc::new(update))
    }

    /// Write the registry as JSON
    pub fn save_json(&self, path: &Path) -> SlotcovResult<()> {
        let json = serde_json::to_string_pretty(&*self.state.read())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a registry written by [`Registry::save_json`]
    pub fn load_json(path: &Path, access: AccessMode) -> SlotcovResult<Self> {
        let text = fs::read_to_string(path)?;
        let state: RegistryState = serde_json::from_str(&text)?;
        tracing::debug!(
            version = state.version,
            slots = state.project.data_length,
            path = %path.display(),
            "registry loaded"
        );
        Ok(Self {
            access,
            state: RwLock::new(state),
        })
    }
}

fn merge_package(project: &mut ProjectInfo, changed: &PackageInfo) {
    let Some(existing) = project.packages.get_mut(&changed.name) else {
        project
            .packages
            .insert(changed.name.clone(), changed.clone());
        return;
    };
    let end = (existing.data_index + existing.data_length)
        .max(changed.data_index + changed.data_length);
    existing.data_index = existing.data_index.min(changed.data_index);
    existing.data_length = end - existing.data_index;
    for (name, file) in &changed.files {
        existing.files.insert(name.clone(), file.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::entities::FileInfo;
    use tempfile::TempDir;

    fn update(version: i64, slot_count: usize, packages: Vec<PackageInfo>) -> SessionUpdate {
        SessionUpdate {
            version,
            start_ts: 10,
            end_ts: 20,
            slot_count,
            changed_packages: packages,
            context_store: Arc::new(ContextStore::new()),
        }
    }

    fn file(name: &str, index: usize, length: usize) -> FileInfo {
        FileInfo {
            name: name.into(),
            path: name.into(),
            package: "p".into(),
            data_index: index,
            data_length: length,
            line_count: 1,
            ncline_count: 1,
            timestamp: 0,
            size: 1,
            checksum: 1,
            min_version: 1,
            max_version: 1,
            classes: Vec::new(),
            statements: Vec::new(),
        }
    }

    fn package(name: &str, index: usize, files: &[FileInfo]) -> PackageInfo {
        let mut pkg = PackageInfo::new(name, index);
        for f in files {
            pkg.data_length = pkg.data_length.max(f.data_index + f.data_length - index);
            pkg.files.insert(f.name.clone(), f.clone());
        }
        pkg
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = Registry::new("demo");
        assert_eq!(registry.version(), 0);
        assert_eq!(registry.data_length(), 0);
        assert_eq!(registry.project().name, "demo");
        assert!(!registry.is_read_only());
        assert!(registry.instrumentation_history().is_empty());
    }

    #[test]
    fn test_apply_update_advances_version() {
        let registry = Registry::new("demo");
        let pkg = package("p", 0, &[file("A.java", 0, 5)]);
        let applied = registry.apply_update(0, update(100, 5, vec![pkg])).unwrap();
        assert_eq!(applied.version(), 100);
        assert_eq!(registry.version(), 100);
        assert_eq!(registry.data_length(), 5);
        assert_eq!(registry.instrumentation_history()[0].version, 100);
    }

    #[test]
    fn test_stale_update_is_rejected() {
        let registry = Registry::new("demo");
        registry.apply_update(0, update(100, 0, vec![])).unwrap();
        let err = registry.apply_update(0, update(101, 0, vec![])).unwrap_err();
        assert!(matches!(
            err,
            SlotcovError::ConcurrentInstrumentation {
                expected: 0,
                actual: 100
            }
        ));
        assert_eq!(registry.version(), 100);
    }

    #[test]
    fn test_update_not_newer_than_registry_is_rejected() {
        let registry = Registry::new("demo");
        registry.apply_update(0, update(100, 4, vec![])).unwrap();
        let current = registry.version();
        let err = registry
            .apply_update(current, update(90, 9, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            SlotcovError::ConcurrentInstrumentation {
                expected: 90,
                actual: 100
            }
        ));
        assert!(registry.apply_update(current, update(100, 9, vec![])).is_err());
        assert_eq!(registry.version(), 100);
        assert_eq!(registry.data_length(), 4);
        assert_eq!(registry.instrumentation_history().len(), 1);
    }

    #[test]
    fn test_merge_replaces_files_and_extends_package() {
        let registry = Registry::new("demo");
        let first = package("p", 0, &[file("A.java", 0, 5), file("B.java", 5, 5)]);
        registry.apply_update(0, update(100, 10, vec![first])).unwrap();

        let second = package("p", 0, &[file("B.java", 10, 7)]);
        registry.apply_update(100, update(200, 17, vec![second])).unwrap();

        let project = registry.project();
        let pkg = project.named_package("p").unwrap();
        assert_eq!(pkg.files.len(), 2);
        assert_eq!(pkg.file("A.java").unwrap().data_index, 0);
        assert_eq!(pkg.file("B.java").unwrap().data_index, 10);
        assert_eq!(pkg.data_length, 17);
        assert_eq!(project.data_length, 17);
    }

    #[test]
    fn test_old_snapshot_is_untouched() {
        let registry = Registry::new("demo");
        let before = registry.project();
        registry
            .apply_update(0, update(100, 3, vec![package("p", 0, &[file("A.java", 0, 3)])]))
            .unwrap();
        assert!(before.packages.is_empty());
        assert_eq!(registry.project().file_count(), 1);
    }

    #[test]
    fn test_read_only_rejects_updates() {
        let registry = Registry::with_access("demo", AccessMode::ReadOnly);
        assert!(registry.is_read_only());
        let err = registry.apply_update(0, update(1, 0, vec![])).unwrap_err();
        assert!(matches!(err, SlotcovError::ReadOnlyRegistry));
    }

    #[test]
    fn test_register_context() {
        let registry = Registry::new("demo");
        let idx = registry.register_context("logging").unwrap();
        assert_eq!(registry.register_context("logging").unwrap(), idx);
        assert_eq!(registry.context_store().name_of(idx), Some("logging"));
    }

    #[test]
    fn test_json_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        let registry = Registry::new("demo");
        registry
            .apply_update(0, update(100, 3, vec![package("p", 0, &[file("A.java", 0, 3)])]))
            .unwrap();
        registry.save_json(&path).unwrap();

        let loaded = Registry::load_json(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(loaded.version(), 100);
        assert_eq!(loaded.data_length(), 3);
        assert!(loaded.is_read_only());
        assert_eq!(*loaded.project(), *registry.project());
        assert_eq!(loaded.instrumentation_history().len(), 1);
    }

    #[test]
    fn test_load_garbage_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "not json").unwrap();
        let err = Registry::load_json(&path, AccessMode::ReadWrite).unwrap_err();
        assert!(matches!(err, SlotcovError::Json(_)));
    }
}
