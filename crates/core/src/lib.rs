#![allow(clippy::result_large_err)]
//! pkgsplit-core: package restructuring engine for Go source trees.
//!
//! Moves files between packages, rewrites package clauses, qualifies bare
//! references to moved symbols and keeps import blocks consistent, all
//! without a full parser. Runs are idempotent: a second run over its own
//! output changes nothing.
//!
//! # Public API
//!
//! - [`migrate()`] / [`run()`] -- run the pipeline over a tree
//! - [`MappingTable`] -- validated file and symbol mapping
//! - [`SourceTree`] with [`DiskTree`] and [`MemoryTree`] -- tree access
//! - [`MigrationReport`] -- per-unit outcomes
//!
//! The individual stages are public for callers that want to drive a
//! single unit: [`scan()`], [`classify()`], [`qualify()`],
//! [`reconcile()`], [`relocate()`] and [`commit()`].

pub mod error;
pub mod imports;
pub mod mapping;
pub mod pipeline;
pub mod qualify;
pub mod relocate;
pub mod report;
pub mod scanner;
pub mod sites;
pub mod tree;
pub mod unit;

// ── Convenience re-exports: key types ────────────────────────────────

pub use error::{ConfigError, RunError, ScanError, Stage, UnitError};
pub use imports::ImportSpec;
pub use mapping::{MappingConfig, MappingEntry, MappingTable, Package};
pub use report::{MigrationReport, Outcome, RunStatus, Summary, UnitReport};
pub use scanner::{SpanKind, TextSpan};
pub use sites::{DeclKind, IdentSite, Site};
pub use tree::{DiskTree, MemoryTree, SourceTree};
pub use unit::SourceUnit;

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use imports::reconcile;
pub use pipeline::{migrate, run, RunOptions};
pub use qualify::qualify;
pub use relocate::{commit, relocate};
pub use scanner::scan;
pub use sites::classify;
