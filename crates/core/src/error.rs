use std::path::PathBuf;

use serde::Serialize;

/// A mapping configuration that cannot be used. Always fatal: the run stops
/// before any unit is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read mapping '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML mapping: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON mapping: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported mapping format '{}': expected .toml or .json", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Two entries bind one symbol to different qualifying packages.
    #[error("symbol '{symbol}' is bound to both '{first}' and '{second}'")]
    AmbiguousSymbol {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("symbol '{symbol}' has conflicting renames '{first}' and '{second}'")]
    ConflictingRename {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("symbols '{first}' and '{second}' both export as '{package}.{exported}'")]
    ExportCollision {
        package: String,
        exported: String,
        first: String,
        second: String,
    },

    #[error("file '{file}' is assigned to both '{first}' and '{second}'")]
    AmbiguousFile {
        file: String,
        first: String,
        second: String,
    },

    #[error("package '{name}' is declared twice ('{first}' and '{second}')")]
    DuplicatePackage {
        name: String,
        first: String,
        second: String,
    },

    #[error("{context} refers to undeclared package '{package}'")]
    UnknownPackage { context: String, package: String },

    #[error("'{name}' is not a valid identifier for {context}")]
    InvalidIdentifier { name: String, context: String },

    #[error("package '{0}' needs an import path but the mapping has no `module`")]
    MissingModule(String),

    #[error("invalid exclude glob '{glob}': {message}")]
    InvalidGlob { glob: String, message: String },
}

/// A unit whose text cannot be classified without guessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("line {line}: unterminated {what}")]
    Unterminated { what: &'static str, line: usize },

    #[error("no package clause found")]
    MissingPackageClause,

    #[error("line {line}: malformed import declaration")]
    MalformedImport { line: usize },
}

/// Pipeline stage of a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Scanned,
    Qualified,
    ImportsReconciled,
    Relocated,
    Done,
}

impl Stage {
    /// The stage a unit enters after this one.
    pub fn next(self) -> Stage {
        match self {
            Stage::Discovered => Stage::Scanned,
            Stage::Scanned => Stage::Qualified,
            Stage::Qualified => Stage::ImportsReconciled,
            Stage::ImportsReconciled => Stage::Relocated,
            Stage::Relocated | Stage::Done => Stage::Done,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Discovered => "discovered",
            Stage::Scanned => "scanned",
            Stage::Qualified => "qualified",
            Stage::ImportsReconciled => "imports-reconciled",
            Stage::Relocated => "relocated",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Unit-local failures. The orchestrator turns each of these into a report
/// entry; none of them stops independent units.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("parse ambiguity: {0}")]
    ParseAmbiguity(#[from] ScanError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{stage}: io error on '{}': {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read-back of '{}' does not match the written content", .0.display())]
    ReadBackMismatch(PathBuf),
}

impl UnitError {
    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UnitError::Io {
            stage,
            path: path.into(),
            source,
        }
    }
}

/// Run-level failures: nothing was processed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open source tree '{}': {source}", .root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot walk source tree: {0}")]
    Walk(#[source] std::io::Error),

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
