//! Instrumentation session.
//!
//! One session per compilation unit. An instrumenter walks the source and
//! calls `enter_*` / `exit_*` / `add_*` in strictly nested order; the session
//! hands out slots and builds the entity tree privately. Nothing is shared
//! until [`InstrumentationSession::finish_and_apply`] commits the result.
//!
//! Slot allocation is a single cursor relative to the current file:
//!
//! ```text
//! file.data_index ─┐
//!                  [m][s][s][b][m][s]...     m = method entry, s = statement, b = branch
//!                   ^ offset 0
//! ```
//!
//! A file whose checksum and size match an existing record keeps its old
//! `data_index`, so recordings taken against unchanged code stay valid.

use super::context::{ContextSet, ContextStore};
use super::entities::{
    BranchInfo, ClassInfo, ClassKind, FileInfo, MethodInfo, PackageInfo, ProjectInfo,
    SourceRegion, StatementInfo, DEFAULT_PACKAGE_NAME,
};
use super::store::{Registry, SessionUpdate};
use crate::coverage::SlotRange;
use crate::result::{ContainerKind, SlotcovError, SlotcovResult};
use indexmap::IndexMap;
use std::sync::Arc;

/// Slots taken by a method-entry counter
pub const METHOD_ENTRY_SLOTS: usize = 1;
/// Slots taken by a statement counter
pub const STATEMENT_SLOTS: usize = 1;
/// Slots taken by a branch counter
pub const BRANCH_SLOTS: usize = 1;

/// Source file about to be instrumented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Package name; empty for the default package
    pub package: String,
    /// File name, unique inside its package
    pub name: String,
    /// Path as seen by the instrumenter
    pub path: String,
    /// Total lines
    pub line_count: u32,
    /// Non-comment lines
    pub ncline_count: u32,
    /// Modification time (ms since epoch)
    pub timestamp: i64,
    /// Size in bytes
    pub size: u64,
    /// Content checksum
    pub checksum: u64,
}

impl SourceFile {
    /// Describe a file; counts and timestamp default to zero
    #[must_use]
    pub fn new(
        package: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        checksum: u64,
    ) -> Self {
        let name = name.into();
        Self {
            package: package.into(),
            path: name.clone(),
            name,
            line_count: 0,
            ncline_count: 0,
            timestamp: 0,
            size,
            checksum,
        }
    }

    /// Set the path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set line counts
    #[must_use]
    pub fn with_lines(mut self, line_count: u32, ncline_count: u32) -> Self {
        self.line_count = line_count;
        self.ncline_count = ncline_count;
        self
    }

    /// Set modification time
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Class declaration handed to [`InstrumentationSession::enter_class`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    /// Name
    pub name: String,
    /// Start of the declaration; the end is set on exit
    pub region: SourceRegion,
    /// Flavour
    pub kind: ClassKind,
    /// True for test classes
    pub is_test: bool,
}

impl ClassDecl {
    /// Plain class starting at `region`
    #[must_use]
    pub fn new(name: impl Into<String>, region: SourceRegion) -> Self {
        Self {
            name: name.into(),
            region,
            kind: ClassKind::Class,
            is_test: false,
        }
    }

    /// Set the kind
    #[must_use]
    pub fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark as a test class
    #[must_use]
    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }
}

/// Method declaration handed to [`InstrumentationSession::enter_method`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Signature
    pub signature: String,
    /// Start of the declaration; the end is set on exit
    pub region: SourceRegion,
    /// Own cyclomatic complexity
    pub complexity: u32,
    /// True for test methods
    pub is_test: bool,
    /// Test name fixed at compile time
    pub static_test_name: Option<String>,
    /// True for lambda bodies
    pub is_lambda: bool,
    /// Contexts
    pub context: ContextSet,
}

impl MethodDecl {
    /// Method with complexity 1
    #[must_use]
    pub fn new(signature: impl Into<String>, region: SourceRegion) -> Self {
        Self {
            signature: signature.into(),
            region,
            complexity: 1,
            is_test: false,
            static_test_name: None,
            is_lambda: false,
            context: ContextSet::single(ContextStore::METHOD),
        }
    }

    /// Set complexity
    #[must_use]
    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = complexity;
        self
    }

    /// Mark as a test, optionally with a compile-time name
    #[must_use]
    pub fn test(mut self, static_name: Option<String>) -> Self {
        self.is_test = true;
        self.static_test_name = static_name;
        self
    }

    /// Mark as a lambda body
    #[must_use]
    pub fn lambda(mut self) -> Self {
        self.is_lambda = true;
        self
    }

    /// Set contexts
    #[must_use]
    pub fn with_context(mut self, context: ContextSet) -> Self {
        self.context = context;
        self
    }
}

/// A class or method that has been entered but not exited
#[derive(Debug, Clone)]
enum OpenContainer {
    Class {
        class: ClassInfo,
        /// Index in the file's class list that keeps declaration order
        position: usize,
    },
    Method(MethodInfo),
}

impl OpenContainer {
    const fn kind(&self) -> ContainerKind {
        match self {
            Self::Class { .. } => ContainerKind::Class,
            Self::Method(_) => ContainerKind::Method,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Builder for one compilation unit's slice of the project model
#[derive(Debug)]
pub struct InstrumentationSession {
    registry: Arc<Registry>,
    model: Arc<ProjectInfo>,
    context_store: Arc<ContextStore>,
    start_version: i64,
    version: i64,
    start_ts: i64,
    end_ts: i64,
    changed_packages: IndexMap<String, PackageInfo>,
    current_package: Option<String>,
    current_file: Option<FileInfo>,
    stack: Vec<OpenContainer>,
    current_file_index: usize,
    current_offset: usize,
    next_index_for_new_file: usize,
}

impl InstrumentationSession {
    /// Start a session; use [`Registry::start_session`]
    pub(crate) fn new(registry: Arc<Registry>) -> SlotcovResult<Self> {
        if registry.is_read_only() {
            return Err(SlotcovError::ReadOnlyRegistry);
        }
        let (start_version, model, context_store) = registry.snapshot();
        let start_ts = now_ms();
        // Versions must grow even if the clock is behind the last commit.
        let version = start_ts.max(start_version + 1);
        let next_index = model.data_length;
        Ok(Self {
            registry,
            model,
            context_store,
            start_version,
            version,
            start_ts,
            end_ts: start_ts,
            changed_packages: IndexMap::new(),
            current_package: None,
            current_file: None,
            stack: Vec::new(),
            current_file_index: next_index,
            current_offset: 0,
            next_index_for_new_file: next_index,
        })
    }

    /// Registry version observed at start
    #[must_use]
    pub fn start_version(&self) -> i64 {
        self.start_version
    }

    /// Version this session's commit will produce
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Start time (ms since epoch)
    #[must_use]
    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    /// End time; equals the start time until the session finishes
    #[must_use]
    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    /// Absolute first slot of the current file
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_file_index
    }

    /// Slots consumed in the current file so far
    #[must_use]
    pub fn current_offset_from_file(&self) -> usize {
        self.current_offset
    }

    /// One past the last slot allocated in the current file
    #[must_use]
    pub fn current_file_max_index(&self) -> usize {
        self.current_file_index + self.current_offset
    }

    /// Contexts the session instruments against
    #[must_use]
    pub fn context_store(&self) -> &Arc<ContextStore> {
        &self.context_store
    }

    fn enter_package(&mut self, name: &str) {
        let name = if name.is_empty() {
            DEFAULT_PACKAGE_NAME
        } else {
            name
        };
        if self.current_package.as_deref() == Some(name) {
            return;
        }
        self.exit_package();
        if !self.changed_packages.contains_key(name) {
            let data_index = self
                .model
                .named_package(name)
                .map_or(self.next_index_for_new_file, |p| p.data_index);
            self.changed_packages
                .insert(name.to_string(), PackageInfo::new(name, data_index));
        }
        self.current_package = Some(name.to_string());
    }

    fn exit_package(&mut self) {
        self.current_package = None;
    }

    fn package_mut(&mut self, operation: &'static str) -> SlotcovResult<&mut PackageInfo> {
        self.current_package
            .as_ref()
            .and_then(|name| self.changed_packages.get_mut(name))
            .ok_or(SlotcovError::NoEnclosingContainer { operation })
    }

    /// Existing record of a file in this session or in the registry model
    fn previous_file(&self, package: &str, name: &str) -> Option<&FileInfo> {
        self.changed_packages
            .get(package)
            .and_then(|p| p.file(name))
            .or_else(|| self.model.named_package(package).and_then(|p| p.file(name)))
    }

    /// Begin a file, returning its first slot.
    ///
    /// An unchanged file (same checksum and size) keeps the slot range it
    /// had; anything else is placed at the end of the slot space.
    pub fn enter_file(&mut self, source: SourceFile) -> SlotcovResult<usize> {
        if self.current_file.is_some() {
            return Err(SlotcovError::ContainerStillOpen {
                kind: ContainerKind::File,
            });
        }
        self.enter_package(&source.package);
        let package = self
            .current_package
            .clone()
            .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string());

        let reused = self
            .previous_file(&package, &source.name)
            .filter(|f| f.is_unchanged(source.checksum, source.size))
            .map(|f| (f.data_index, f.min_version));
        let (data_index, min_version) = reused.unwrap_or((self.next_index_for_new_file, self.version));

        self.current_file_index = data_index;
        self.current_offset = 0;
        self.current_file = Some(FileInfo {
            name: source.name,
            path: source.path,
            package,
            data_index,
            data_length: 0,
            line_count: source.line_count,
            ncline_count: source.ncline_count,
            timestamp: source.timestamp,
            size: source.size,
            checksum: source.checksum,
            min_version,
            max_version: self.version,
            classes: Vec::new(),
            statements: Vec::new(),
        });
        Ok(data_index)
    }

    /// Close the current file, fixing its length
    pub fn exit_file(&mut self) -> SlotcovResult<SlotRange> {
        if let Some(open) = self.stack.last() {
            return Err(SlotcovError::ContainerStillOpen { kind: open.kind() });
        }
        let mut file = self.current_file.take().ok_or(SlotcovError::ContainerStackEmpty {
            expected: ContainerKind::File,
        })?;
        file.data_length = self.current_offset;
        let file_end = self.current_file_index + self.current_offset;
        let range = file.slot_range();

        // An unchanged file leaves the tail where it was.
        self.next_index_for_new_file = self.next_index_for_new_file.max(file_end);
        let package = self.package_mut("exit_file")?;
        package.data_length = package
            .data_length
            .max(file_end.saturating_sub(package.data_index));
        package.files.insert(file.name.clone(), file);
        Ok(range)
    }

    fn file_mut(&mut self, operation: &'static str) -> SlotcovResult<&mut FileInfo> {
        self.current_file
            .as_mut()
            .ok_or(SlotcovError::NoEnclosingContainer { operation })
    }

    fn innermost_class_mut(&mut self) -> Option<&mut ClassInfo> {
        self.stack.iter_mut().rev().find_map(|open| match open {
            OpenContainer::Class { class, .. } => Some(class),
            OpenContainer::Method(_) => None,
        })
    }

    fn innermost_method_mut(&mut self) -> Option<&mut MethodInfo> {
        self.stack.iter_mut().rev().find_map(|open| match open {
            OpenContainer::Method(method) => Some(method),
            OpenContainer::Class { .. } => None,
        })
    }

    /// Begin a class inside the current file
    pub fn enter_class(&mut self, decl: ClassDecl) -> SlotcovResult<()> {
        let position = self.file_mut("enter_class")?.classes.len();
        let is_nested = self
            .stack
            .iter()
            .any(|open| matches!(open, OpenContainer::Class { .. }));
        let class = ClassInfo {
            name: decl.name,
            region: decl.region,
            kind: decl.kind,
            is_test: decl.is_test,
            is_nested,
            relative_index: self.current_offset,
            data_length: 0,
            methods: Vec::new(),
            statements: Vec::new(),
            aggregated_statements: 0,
            aggregated_complexity: 0,
        };
        self.stack.push(OpenContainer::Class { class, position });
        Ok(())
    }

    /// Close the innermost class; it must be on top of the stack
    pub fn exit_class(&mut self, end_line: u32, end_column: u32) -> SlotcovResult<()> {
        let (mut class, position) = match self.stack.pop() {
            Some(OpenContainer::Class { class, position }) => (class, position),
            Some(other) => {
                let found = other.kind();
                self.stack.push(other);
                return Err(SlotcovError::ContainerMismatch {
                    expected: ContainerKind::Class,
                    found,
                });
            }
            None => {
                return Err(SlotcovError::ContainerStackEmpty {
                    expected: ContainerKind::Class,
                })
            }
        };
        class.region.end_line = end_line;
        class.region.end_column = end_column;
        class.data_length = self.current_offset - class.relative_index;

        if let Some(outer) = self.innermost_class_mut() {
            outer.aggregated_statements += class.aggregated_statements;
            outer.aggregated_complexity += class.aggregated_complexity;
        }
        let file = self.file_mut("exit_class")?;
        let position = position.min(file.classes.len());
        file.classes.insert(position, class);
        Ok(())
    }

    /// Begin a method; a class or method must be open.
    ///
    /// The method's first slot records entry into it.
    pub fn enter_method(&mut self, decl: MethodDecl) -> SlotcovResult<()> {
        if self.stack.is_empty() {
            return Err(SlotcovError::NoEnclosingContainer {
                operation: "enter_method",
            });
        }
        let method = MethodInfo {
            signature: decl.signature,
            region: decl.region,
            relative_index: self.current_offset,
            data_length: METHOD_ENTRY_SLOTS,
            complexity: decl.complexity,
            is_test: decl.is_test,
            static_test_name: decl.static_test_name,
            is_lambda: decl.is_lambda,
            context: decl.context,
            statements: Vec::new(),
            branches: Vec::new(),
            methods: Vec::new(),
            aggregated_statements: 0,
            aggregated_complexity: 0,
        };
        self.current_offset += METHOD_ENTRY_SLOTS;
        self.stack.push(OpenContainer::Method(method));
        Ok(())
    }

    /// Close the innermost method and roll its metrics into the parent.
    ///
    /// - parent is a class: the class takes the method and its aggregates
    /// - parent is a method, child is not a lambda (method of an anonymous
    ///   class, which has no class entity): the parent method takes the
    ///   aggregates and the nearest enclosing class takes the method
    /// - child is a lambda: the parent method takes the method and its
    ///   statement count, but not its complexity, which the parent's own
    ///   complexity already includes
    pub fn exit_method(&mut self, end_line: u32, end_column: u32) -> SlotcovResult<()> {
        let mut method = match self.stack.pop() {
            Some(OpenContainer::Method(method)) => method,
            Some(other) => {
                let found = other.kind();
                self.stack.push(other);
                return Err(SlotcovError::ContainerMismatch {
                    expected: ContainerKind::Method,
                    found,
                });
            }
            None => {
                return Err(SlotcovError::ContainerStackEmpty {
                    expected: ContainerKind::Method,
                })
            }
        };
        method.region.end_line = end_line;
        method.region.end_column = end_column;
        method.data_length = self.current_offset - method.relative_index;
        method.aggregated_statements += method.statements.len();
        method.aggregated_complexity += method.complexity;

        match self.stack.last_mut() {
            Some(OpenContainer::Class { class, .. }) => {
                class.aggregated_statements += method.aggregated_statements;
                class.aggregated_complexity += method.aggregated_complexity;
                class.methods.push(method);
            }
            Some(OpenContainer::Method(parent)) if method.is_lambda => {
                parent.aggregated_statements += method.aggregated_statements;
                parent.methods.push(method);
            }
            Some(OpenContainer::Method(parent)) => {
                parent.aggregated_statements += method.aggregated_statements;
                parent.aggregated_complexity += method.aggregated_complexity;
                match self.innermost_class_mut() {
                    Some(class) => class.methods.push(method),
                    None => {
                        if let Some(parent) = self.innermost_method_mut() {
                            parent.methods.push(method);
                        }
                    }
                }
            }
            None => {
                return Err(SlotcovError::NoEnclosingContainer {
                    operation: "exit_method",
                })
            }
        }
        Ok(())
    }

    /// Add a statement, returning its absolute slot.
    ///
    /// Attaches to the innermost open method; failing that to the innermost
    /// class, and failing that to the file. Statements outside methods are
    /// unusual enough to warrant a warning.
    pub fn add_statement(
        &mut self,
        region: SourceRegion,
        complexity: u32,
        context: ContextSet,
    ) -> SlotcovResult<usize> {
        self.file_mut("add_statement")?;
        let statement = StatementInfo {
            relative_index: self.current_offset,
            region,
            complexity,
            context,
        };
        let slot = self.current_file_index + self.current_offset;

        if let Some(method) = self.innermost_method_mut() {
            method.statements.push(statement);
        } else {
            tracing::warn!(
                line = region.start_line,
                slot,
                "statement outside any method; instrumentation may have been switched off mid-declaration"
            );
            if let Some(class) = self.innermost_class_mut() {
                class.statements.push(statement);
                class.aggregated_statements += 1;
            } else {
                self.file_mut("add_statement")?.statements.push(statement);
            }
        }
        self.current_offset += STATEMENT_SLOTS;
        Ok(slot)
    }

    /// Add a branch to the innermost open method, returning its absolute slot.
    ///
    /// With no method open the branch is dropped: attribution below method
    /// granularity is not modelled.
    pub fn add_branch(
        &mut self,
        region: SourceRegion,
        complexity: u32,
        instrumented: bool,
        context: ContextSet,
    ) -> Option<usize> {
        let relative_index = self.current_offset;
        let slot = self.current_file_index + relative_index;
        let Some(method) = self.innermost_method_mut() else {
            tracing::warn!(line = region.start_line, "branch outside any method dropped");
            return None;
        };
        method.branches.push(BranchInfo {
            relative_index,
            region,
            complexity,
            context,
            instrumented,
        });
        self.current_offset += BRANCH_SLOTS;
        Some(slot)
    }

    /// Close the session and produce its update
    #[must_use]
    pub fn finish(mut self) -> SessionUpdate {
        if self.current_file.is_some() || !self.stack.is_empty() {
            tracing::warn!(
                open_containers = self.stack.len(),
                "session finished with an open file; its contents are discarded"
            );
        }
        self.end_ts = now_ms();
        self.exit_package();
        tracing::debug!(
            version = self.version,
            slots = self.next_index_for_new_file,
            packages = self.changed_packages.len(),
            "instrumentation session finished"
        );
        SessionUpdate {
            version: self.version,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            slot_count: self.next_index_for_new_file,
            changed_packages: self.changed_packages.into_values().collect(),
            context_store: self.context_store,
        }
    }

    /// Finish and commit to the registry.
    ///
    /// Fails with [`SlotcovError::ConcurrentInstrumentation`] if another
    /// session committed first. There is no retry; the caller instruments
    /// the unit again with a fresh session.
    pub fn finish_and_apply(self) -> SlotcovResult<Arc<SessionUpdate>> {
        let registry = Arc::clone(&self.registry);
        let expected = self.start_version;
        registry.apply_update(expected, self.finish())
    }
}
