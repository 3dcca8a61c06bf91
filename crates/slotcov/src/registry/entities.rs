//! Structural model of an instrumented project.
//!
//! ```text
//! ProjectInfo
//! └── PackageInfo          absolute slot range
//!     └── FileInfo         absolute slot range
//!         ├── ClassInfo    range relative to the file (flat list, nested classes included)
//!         │   └── MethodInfo
//!         │       ├── StatementInfo / BranchInfo   one slot each
//!         │       └── MethodInfo (lambdas, inner functions)
//!         └── StatementInfo (file-level)
//! ```
//!
//! Classes, methods and elements store indices relative to their file so an
//! unchanged file can be moved or reused without rewriting its contents.

use super::context::ContextSet;
use crate::coverage::SlotRange;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name of the package files without a package declaration belong to
pub const DEFAULT_PACKAGE_NAME: &str = "default-pkg";

/// Line/column span of an element in its source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceRegion {
    /// First line (1-based)
    pub start_line: u32,
    /// First column (1-based)
    pub start_column: u32,
    /// Last line
    pub end_line: u32,
    /// Last column
    pub end_column: u32,
}

impl SourceRegion {
    /// Region spanning the given positions
    #[must_use]
    pub const fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Region whose end is not known yet
    #[must_use]
    pub const fn starting_at(line: u32, column: u32) -> Self {
        Self::new(line, column, line, column)
    }

    /// True if `line` falls inside the region
    #[must_use]
    pub const fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// What kind of type a class entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClassKind {
    /// Ordinary class
    #[default]
    Class,
    /// Interface
    Interface,
    /// Enum
    Enum,
    /// Annotation type
    Annotation,
}

/// A single-slot statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementInfo {
    /// Slot offset from the file's first slot
    pub relative_index: usize,
    /// Source span
    pub region: SourceRegion,
    /// Cyclomatic complexity contributed
    pub complexity: u32,
    /// Contexts the statement belongs to
    pub context: ContextSet,
}

/// A single-slot branch point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Slot offset from the file's first slot
    pub relative_index: usize,
    /// Source span
    pub region: SourceRegion,
    /// Cyclomatic complexity contributed
    pub complexity: u32,
    /// Contexts the branch belongs to
    pub context: ContextSet,
    /// False when the condition could not be rewritten and only its presence is recorded
    pub instrumented: bool,
}

/// A method, inner function or lambda
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Method signature as written
    pub signature: String,
    /// Source span
    pub region: SourceRegion,
    /// Offset of the method-entry slot from the file's first slot
    pub relative_index: usize,
    /// Slots owned by the method (entry slot, elements and nested methods)
    pub data_length: usize,
    /// Own cyclomatic complexity
    pub complexity: u32,
    /// True if this method is a test
    pub is_test: bool,
    /// Test name fixed at compile time (e.g. from an annotation)
    pub static_test_name: Option<String>,
    /// True for lambda bodies
    pub is_lambda: bool,
    /// Contexts the method belongs to
    pub context: ContextSet,
    /// Statements directly inside the method
    pub statements: Vec<StatementInfo>,
    /// Branches directly inside the method
    pub branches: Vec<BranchInfo>,
    /// Lambdas and inner functions
    pub methods: Vec<MethodInfo>,
    /// Statements of this method and everything rolled up into it
    pub aggregated_statements: usize,
    /// Complexity of this method and everything rolled up into it
    pub aggregated_complexity: u32,
}

impl MethodInfo {
    /// Absolute slot range, resolved against the owning file
    #[must_use]
    pub const fn slot_range(&self, file: &FileInfo) -> SlotRange {
        SlotRange::new(file.data_index + self.relative_index, self.data_length)
    }

    /// Absolute slot recording entry into the method
    #[must_use]
    pub const fn entry_slot(&self, file: &FileInfo) -> usize {
        file.data_index + self.relative_index
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a MethodInfo>) {
        out.push(self);
        for nested in &self.methods {
            nested.collect(out);
        }
    }
}

/// A class, interface, enum or annotation type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Simple name
    pub name: String,
    /// Source span
    pub region: SourceRegion,
    /// Class flavour
    pub kind: ClassKind,
    /// True if the class holds tests
    pub is_test: bool,
    /// True if declared inside another class of the same file
    pub is_nested: bool,
    /// Offset of the first slot from the file's first slot
    pub relative_index: usize,
    /// Slots owned by the class
    pub data_length: usize,
    /// Methods, including methods of anonymous classes declared inside them
    pub methods: Vec<MethodInfo>,
    /// Statements outside any method (initialisers)
    pub statements: Vec<StatementInfo>,
    /// Statements of the class and everything rolled up into it
    pub aggregated_statements: usize,
    /// Complexity of the class and everything rolled up into it
    pub aggregated_complexity: u32,
}

impl ClassInfo {
    /// Absolute slot range, resolved against the owning file
    #[must_use]
    pub const fn slot_range(&self, file: &FileInfo) -> SlotRange {
        SlotRange::new(file.data_index + self.relative_index, self.data_length)
    }
}

/// A source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name (unique inside its package)
    pub name: String,
    /// Path as given to the instrumenter
    pub path: String,
    /// Name of the owning package
    pub package: String,
    /// First slot
    pub data_index: usize,
    /// Slots owned by the file
    pub data_length: usize,
    /// Total line count
    pub line_count: u32,
    /// Non-comment line count
    pub ncline_count: u32,
    /// Modification time of the source (ms since epoch)
    pub timestamp: i64,
    /// Size in bytes
    pub size: u64,
    /// Content checksum
    pub checksum: u64,
    /// Earliest registry version whose slots for this file are still valid
    pub min_version: i64,
    /// Latest registry version that instrumented the file
    pub max_version: i64,
    /// Classes in declaration order, nested ones included
    pub classes: Vec<ClassInfo>,
    /// Statements outside any class
    pub statements: Vec<StatementInfo>,
}

impl FileInfo {
    /// Absolute slot range
    #[must_use]
    pub const fn slot_range(&self) -> SlotRange {
        SlotRange::new(self.data_index, self.data_length)
    }

    /// True if the file record matches the given content
    #[must_use]
    pub const fn is_unchanged(&self, checksum: u64, size: u64) -> bool {
        self.checksum == checksum && self.size == size
    }

    /// Every method of the file, nested methods and lambdas included
    #[must_use]
    pub fn all_methods(&self) -> Vec<&MethodInfo> {
        let mut out = Vec::new();
        for class in &self.classes {
            for method in &class.methods {
                method.collect(&mut out);
            }
        }
        out
    }

    /// Sum of the top-level classes' aggregated statements
    #[must_use]
    pub fn aggregated_statements(&self) -> usize {
        self.statements.len()
            + self
                .top_level_classes()
                .map(|c| c.aggregated_statements)
                .sum::<usize>()
    }

    /// Classes not nested in another class of this file
    pub fn top_level_classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter().filter(|class| !class.is_nested)
    }
}

/// A package and its files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Qualified name
    pub name: String,
    /// First slot
    pub data_index: usize,
    /// Slots spanned by the package's files
    pub data_length: usize,
    /// Files keyed by name, in first-instrumented order
    pub files: IndexMap<String, FileInfo>,
}

impl PackageInfo {
    /// Empty package starting at `data_index`
    #[must_use]
    pub fn new(name: impl Into<String>, data_index: usize) -> Self {
        Self {
            name: name.into(),
            data_index,
            data_length: 0,
            files: IndexMap::new(),
        }
    }

    /// Absolute slot range
    #[must_use]
    pub const fn slot_range(&self) -> SlotRange {
        SlotRange::new(self.data_index, self.data_length)
    }

    /// File with the given name
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileInfo> {
        self.files.get(name)
    }

    /// True for the package of files without a package declaration
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_PACKAGE_NAME
    }
}

/// Whole-project model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project name
    pub name: String,
    /// Slot high-watermark
    pub data_length: usize,
    /// Packages keyed by name
    pub packages: IndexMap<String, PackageInfo>,
}

impl ProjectInfo {
    /// Empty project
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_length: 0,
            packages: IndexMap::new(),
        }
    }

    /// Package by name; an empty name means the default package
    #[must_use]
    pub fn named_package(&self, name: &str) -> Option<&PackageInfo> {
        if name.is_empty() {
            return self.packages.get(DEFAULT_PACKAGE_NAME);
        }
        self.packages.get(name)
    }

    /// Call `visitor` for every file of every package
    pub fn visit_files<F: FnMut(&PackageInfo, &FileInfo)>(&self, mut visitor: F) {
        for package in self.packages.values() {
            for file in package.files.values() {
                visitor(package, file);
            }
        }
    }

    /// First file whose name or path equals `name_or_path`
    #[must_use]
    pub fn find_file(&self, name_or_path: &str) -> Option<&FileInfo> {
        self.packages
            .values()
            .flat_map(|p| p.files.values())
            .find(|f| f.name == name_or_path || f.path == name_or_path)
    }

    /// Every file, ordered by first slot
    #[must_use]
    pub fn all_files_sorted(&self) -> Vec<&FileInfo> {
        let mut files: Vec<&FileInfo> = self
            .packages
            .values()
            .flat_map(|p| p.files.values())
            .collect();
        files.sort_by_key(|f| (f.data_index, f.data_length));
        files
    }

    /// Number of files in the project
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.packages.values().map(|p| p.files.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(sig: &str, rel: usize, len: usize) -> MethodInfo {
        MethodInfo {
            signature: sig.to_string(),
            region: SourceRegion::default(),
            relative_index: rel,
            data_length: len,
            complexity: 1,
            is_test: false,
            static_test_name: None,
            is_lambda: false,
            context: ContextSet::EMPTY,
            statements: Vec::new(),
            branches: Vec::new(),
            methods: Vec::new(),
            aggregated_statements: 0,
            aggregated_complexity: 0,
        }
    }

    fn class(name: &str, rel: usize, len: usize, methods: Vec<MethodInfo>) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            region: SourceRegion::default(),
            kind: ClassKind::Class,
            is_test: false,
            is_nested: false,
            relative_index: rel,
            data_length: len,
            methods,
            statements: Vec::new(),
            aggregated_statements: 2,
            aggregated_complexity: 2,
        }
    }

    fn file(name: &str, index: usize, classes: Vec<ClassInfo>) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            path: format!("src/{name}"),
            package: "p".to_string(),
            data_index: index,
            data_length: 10,
            line_count: 20,
            ncline_count: 15,
            timestamp: 0,
            size: 100,
            checksum: 7,
            min_version: 1,
            max_version: 1,
            classes,
            statements: Vec::new(),
        }
    }

    #[test]
    fn test_relative_ranges_resolve_against_file() {
        let m = method("run()", 2, 3);
        let c = class("A", 0, 10, vec![m.clone()]);
        let f = file("A.java", 100, vec![c.clone()]);
        assert_eq!(m.slot_range(&f), SlotRange::new(102, 3));
        assert_eq!(m.entry_slot(&f), 102);
        assert_eq!(c.slot_range(&f), SlotRange::new(100, 10));
        assert_eq!(f.slot_range(), SlotRange::new(100, 10));
    }

    #[test]
    fn test_all_methods_includes_nested() {
        let mut outer = method("outer()", 0, 5);
        let mut lambda = method("lambda$0", 2, 2);
        lambda.is_lambda = true;
        lambda.methods.push(method("lambda$1", 3, 1));
        outer.methods.push(lambda);
        let f = file("A.java", 0, vec![class("A", 0, 6, vec![outer, method("b()", 5, 1)])]);
        let sigs: Vec<&str> = f.all_methods().iter().map(|m| m.signature.as_str()).collect();
        assert_eq!(sigs, vec!["outer()", "lambda$0", "lambda$1", "b()"]);
    }

    #[test]
    fn test_top_level_classes() {
        let f = file(
            "A.java",
            0,
            vec![
                class("A", 0, 10, vec![]),
                ClassInfo {
                    is_nested: true,
                    ..class("A.Inner", 2, 3, vec![])
                },
                class("B", 10, 0, vec![]),
            ],
        );
        let names: Vec<&str> = f.top_level_classes().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(f.aggregated_statements(), 4);
    }

    #[test]
    fn test_project_lookup() {
        let mut project = ProjectInfo::new("demo");
        let mut pkg = PackageInfo::new("p", 0);
        pkg.files.insert("B.java".into(), file("B.java", 10, vec![]));
        pkg.files.insert("A.java".into(), file("A.java", 0, vec![]));
        project.packages.insert("p".into(), pkg);
        let mut default = PackageInfo::new(DEFAULT_PACKAGE_NAME, 20);
        default.files.insert("C.java".into(), file("C.java", 20, vec![]));
        project.packages.insert(DEFAULT_PACKAGE_NAME.into(), default);

        assert!(project.named_package("p").is_some());
        assert!(project.named_package("").is_some_and(PackageInfo::is_default));
        assert_eq!(project.find_file("src/B.java").map(|f| f.data_index), Some(10));
        assert_eq!(project.file_count(), 3);

        let order: Vec<&str> = project
            .all_files_sorted()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(order, vec!["A.java", "B.java", "C.java"]);

        let mut visited = 0;
        project.visit_files(|_, _| visited += 1);
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_unchanged_file_check() {
        let f = file("A.java", 0, vec![]);
        assert!(f.is_unchanged(7, 100));
        assert!(!f.is_unchanged(8, 100));
        assert!(!f.is_unchanged(7, 101));
    }

    #[test]
    fn test_region_contains_line() {
        let region = SourceRegion::new(3, 1, 9, 2);
        assert!(region.contains_line(3));
        assert!(region.contains_line(9));
        assert!(!region.contains_line(10));
        assert_eq!(SourceRegion::starting_at(4, 5).end_line, 4);
    }
}
