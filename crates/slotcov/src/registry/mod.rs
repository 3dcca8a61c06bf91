//! Versioned project registry and instrumentation sessions.
//!
//! The registry owns the project's structural model and the slot
//! high-watermark. Instrumenters build changes in an
//! [`InstrumentationSession`] and commit them with an optimistic version
//! check; exactly one of several sessions started at the same version wins.

mod context;
mod entities;
mod session;
mod store;

pub use context::{ContextSet, ContextStore, MAX_CONTEXTS};
pub use entities::{
    BranchInfo, ClassInfo, ClassKind, FileInfo, MethodInfo, PackageInfo, ProjectInfo,
    SourceRegion, StatementInfo, DEFAULT_PACKAGE_NAME,
};
pub use session::{
    ClassDecl, InstrumentationSession, MethodDecl, SourceFile, BRANCH_SLOTS, METHOD_ENTRY_SLOTS,
    STATEMENT_SLOTS,
};
pub use store::{AccessMode, InstrumentationInfo, Registry, SessionUpdate};
