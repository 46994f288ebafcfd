//! Migration report: one entry per discovered unit plus run totals.

use serde::Serialize;

use crate::error::Stage;
use crate::imports::ImportSpec;
use crate::relocate::PackageChange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Moved,
    Rewritten,
    Unchanged,
    Skipped { reason: String },
    Conflict { detail: String },
    Failed { stage: Stage, reason: String },
}

/// Reason prefix of units skipped because their text could not be scanned.
pub const PARSE_AMBIGUITY: &str = "parse ambiguity";

impl Outcome {
    /// Skip a unit whose text could not be scanned.
    pub fn unscannable(err: impl std::fmt::Display) -> Self {
        Outcome::skipped(format!("{}: {}", PARSE_AMBIGUITY, err))
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Outcome::Conflict {
            detail: detail.into(),
        }
    }

    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        Outcome::Failed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Outcome::Moved | Outcome::Rewritten)
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, Outcome::Conflict { .. } | Outcome::Failed { .. })
    }

    pub fn is_unscannable(&self) -> bool {
        matches!(self, Outcome::Skipped { reason } if reason.starts_with(PARSE_AMBIGUITY))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Moved => "moved",
            Outcome::Rewritten => "rewritten",
            Outcome::Unchanged => "unchanged",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Conflict { .. } => "conflict",
            Outcome::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Skipped { reason } => write!(f, "skipped ({})", reason),
            Outcome::Conflict { detail } => write!(f, "conflict: {}", detail),
            Outcome::Failed { stage, reason } => write!(f, "failed at {}: {}", stage, reason),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_change: Option<PackageChange>,
    pub qualified: usize,
    pub renamed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports_added: Vec<ImportSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl UnitReport {
    pub fn new(path: impl Into<String>, outcome: Outcome) -> Self {
        UnitReport {
            path: path.into(),
            destination: None,
            outcome,
            package_change: None,
            qualified: 0,
            renamed: 0,
            imports_added: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SuccessWithWarnings,
    PartialFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub units: usize,
    pub moved: usize,
    pub rewritten: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Skipped units whose text could not be scanned.
    pub unscannable: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub qualified: usize,
    pub imports_added: usize,
}

impl Summary {
    fn tally(units: &[UnitReport]) -> Self {
        let mut s = Summary {
            units: units.len(),
            ..Summary::default()
        };
        for u in units {
            match u.outcome {
                Outcome::Moved => s.moved += 1,
                Outcome::Rewritten => s.rewritten += 1,
                Outcome::Unchanged => s.unchanged += 1,
                Outcome::Skipped { .. } => {
                    s.skipped += 1;
                    if u.outcome.is_unscannable() {
                        s.unscannable += 1;
                    }
                }
                Outcome::Conflict { .. } => s.conflicts += 1,
                Outcome::Failed { .. } => s.failed += 1,
            }
            s.qualified += u.qualified;
            s.imports_added += u.imports_added.len();
        }
        s
    }

    pub fn changes(&self) -> usize {
        self.moved + self.rewritten
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub status: RunStatus,
    /// Set when `fail_on_conflict` stopped the run.
    pub aborted: bool,
    pub summary: Summary,
    pub units: Vec<UnitReport>,
}

impl MigrationReport {
    /// Sort `units` by original path and derive the totals and status.
    /// Conflicts and failures make the run a partial failure only under
    /// `fail_on_conflict`; otherwise they are warnings, as are unit
    /// warnings and unscannable units.
    pub fn build(
        mut units: Vec<UnitReport>,
        dry_run: bool,
        fail_on_conflict: bool,
        aborted: bool,
    ) -> Self {
        units.sort_by(|a, b| a.path.cmp(&b.path));
        let summary = Summary::tally(&units);
        let problems = summary.conflicts + summary.failed;
        let warnings = summary.unscannable > 0 || units.iter().any(|u| !u.warnings.is_empty());
        let status = if problems > 0 && fail_on_conflict {
            RunStatus::PartialFailure
        } else if problems > 0 || warnings {
            RunStatus::SuccessWithWarnings
        } else {
            RunStatus::Success
        };
        MigrationReport {
            dry_run,
            status,
            aborted,
            summary,
            units,
        }
    }

    pub fn unit(&self, path: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_sorted_and_tallied() {
        let report = MigrationReport::build(
            vec![
                UnitReport::new("b.go", Outcome::Moved),
                UnitReport::new("a.go", Outcome::Unchanged),
                UnitReport::new("c.go", Outcome::skipped("outside configured packages")),
            ],
            false,
            false,
            false,
        );
        let paths: Vec<&str> = report.units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["a.go", "b.go", "c.go"]);
        assert_eq!(report.summary.moved, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn conflicts_are_warnings_unless_failing_on_conflict() {
        let units = vec![UnitReport::new("a.go", Outcome::conflict("taken"))];
        assert_eq!(
            MigrationReport::build(units.clone(), false, false, false).status,
            RunStatus::SuccessWithWarnings
        );
        assert_eq!(
            MigrationReport::build(units, false, true, true).status,
            RunStatus::PartialFailure
        );
    }

    #[test]
    fn failures_follow_the_conflict_policy() {
        let units = vec![UnitReport::new(
            "a.go",
            Outcome::failed(Stage::Relocated, "disk full"),
        )];
        assert_eq!(
            MigrationReport::build(units.clone(), false, true, false).status,
            RunStatus::PartialFailure
        );
        let report = MigrationReport::build(units, false, false, false);
        assert_eq!(report.status, RunStatus::SuccessWithWarnings);
        assert_eq!(
            report.units[0].outcome.to_string(),
            "failed at relocated: disk full"
        );
    }

    #[test]
    fn unscannable_units_are_warnings() {
        let report = MigrationReport::build(
            vec![
                UnitReport::new(
                    "broken.go",
                    Outcome::unscannable("line 3: unterminated string literal"),
                ),
                UnitReport::new("main.go", Outcome::skipped("outside configured packages")),
                UnitReport::new("ok.go", Outcome::Unchanged),
            ],
            false,
            false,
            false,
        );
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.unscannable, 1);
        assert_eq!(report.status, RunStatus::SuccessWithWarnings);
        assert_eq!(
            report.units[0].outcome.to_string(),
            "skipped (parse ambiguity: line 3: unterminated string literal)"
        );
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(Outcome::skipped("aborted")).unwrap();
        assert_eq!(json["kind"], "skipped");
        assert_eq!(json["reason"], "aborted");
    }
}
