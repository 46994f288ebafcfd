//! Pipeline orchestration.
//!
//! A run has two phases. The *plan* phase reads, scans, qualifies,
//! reconciles imports and relocates every unit in memory, in parallel,
//! and detects conflicts. The *commit* phase creates destination
//! directories in a sequential pre-pass and then writes units in parallel.
//! Unit-local failures become report entries; only a broken tree or an
//! invalid mapping stop the run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{RunError, Stage, UnitError};
use crate::imports;
use crate::mapping::{MappingConfig, MappingTable, Package};
use crate::qualify::qualify;
use crate::relocate::{self, Committed, Destination};
use crate::report::{MigrationReport, Outcome, UnitReport};
use crate::tree::{DiskTree, SourceTree};
use crate::unit::{file_name, parent_dir, SourceUnit};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Compute the report without writing anything.
    pub dry_run: bool,
    /// Abort before any write when the plan has conflicts, and stop
    /// starting new units after an IO failure.
    pub fail_on_conflict: bool,
    /// Worker threads; `0` uses one per core.
    pub jobs: usize,
}

/// Load `config`, open `root` on disk and run the pipeline.
pub fn migrate(
    root: &Path,
    config: &MappingConfig,
    options: &RunOptions,
) -> Result<MigrationReport, RunError> {
    let mapping = MappingTable::load(config)?;
    let tree = DiskTree::new(root).map_err(|source| RunError::Root {
        root: root.to_path_buf(),
        source,
    })?;
    run(&tree, &mapping, options)
}

/// Where a discovered unit goes.
struct Target<'m> {
    path: String,
    package: &'m Package,
    destination: String,
}

struct Planned {
    unit: SourceUnit,
    changed: bool,
    /// The destination already holds this unit's final text.
    already_written: bool,
    report: UnitReport,
}

enum Slot {
    Settled(UnitReport),
    Planned(Box<Planned>),
}

impl Slot {
    fn report(&self) -> &UnitReport {
        match self {
            Slot::Settled(r) => r,
            Slot::Planned(p) => &p.report,
        }
    }

    fn into_report(self) -> UnitReport {
        match self {
            Slot::Settled(r) => r,
            Slot::Planned(p) => p.report,
        }
    }
}

/// Report outcome for `err`, raised while a unit that had completed
/// `reached` was working on the next stage. Text that cannot be scanned as
/// read is skipped; a re-scan failure after our own edits is a failure of
/// the stage that made them.
fn outcome_of(err: &UnitError, reached: Stage) -> Outcome {
    match err {
        UnitError::ParseAmbiguity(e) if reached < Stage::Scanned => Outcome::unscannable(e),
        UnitError::ParseAmbiguity(_) => Outcome::failed(reached.next(), err.to_string()),
        UnitError::Conflict(detail) => Outcome::conflict(detail.clone()),
        UnitError::Io { stage, .. } => Outcome::failed(*stage, err.to_string()),
        UnitError::ReadBackMismatch(_) => Outcome::failed(Stage::Relocated, err.to_string()),
    }
}

/// Run the pipeline over `tree`.
#[tracing::instrument(skip_all, fields(dry_run = options.dry_run, jobs = options.jobs))]
pub fn run(
    tree: &dyn SourceTree,
    mapping: &MappingTable,
    options: &RunOptions,
) -> Result<MigrationReport, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()?;
    let files = tree.walk().map_err(RunError::Walk)?;

    let (targets, mut settled) = discover(mapping, files);
    info!(
        units = targets.len() + settled.len(),
        participating = targets.len(),
        "pipeline: discovered units"
    );

    let mut slots: Vec<Slot> = pool.install(|| {
        targets
            .par_iter()
            .map(|target| plan_unit(tree, mapping, target))
            .collect()
    });
    claim_destinations(&mut slots);

    let conflicts = slots
        .iter()
        .filter(|s| s.report().outcome.is_problem())
        .count();
    info!(conflicts, "pipeline: plan complete");

    if options.dry_run {
        settled.extend(slots.into_iter().map(Slot::into_report));
        return Ok(MigrationReport::build(settled, true, options.fail_on_conflict, false));
    }

    if options.fail_on_conflict && conflicts > 0 {
        warn!(conflicts, "pipeline: aborting before any write");
        settled.extend(slots.into_iter().map(|slot| match slot {
            Slot::Settled(r) => r,
            Slot::Planned(p) => UnitReport {
                outcome: Outcome::skipped("aborted"),
                ..p.report
            },
        }));
        return Ok(MigrationReport::build(settled, false, true, true));
    }

    create_destination_dirs(tree, &mut slots);

    let abort = AtomicBool::new(false);
    let committed: Vec<UnitReport> = pool.install(|| {
        slots
            .into_par_iter()
            .map(|slot| match slot {
                Slot::Settled(r) => r,
                Slot::Planned(p) => commit_unit(tree, *p, options, &abort),
            })
            .collect()
    });
    settled.extend(committed);

    let report = MigrationReport::build(
        settled,
        false,
        options.fail_on_conflict,
        abort.load(Ordering::SeqCst),
    );
    info!(
        moved = report.summary.moved,
        rewritten = report.summary.rewritten,
        unchanged = report.summary.unchanged,
        failed = report.summary.failed,
        "pipeline: commit complete"
    );
    Ok(report)
}

/// Split the walked files into participating units and settled reports.
fn discover<'m>(
    mapping: &'m MappingTable,
    files: Vec<String>,
) -> (Vec<Target<'m>>, Vec<UnitReport>) {
    let mut targets = Vec::new();
    let mut settled = Vec::new();

    for path in files {
        if !path.ends_with(".go") {
            continue;
        }
        if mapping.is_excluded(&path) {
            debug!(unit = %path, "pipeline: excluded");
            continue;
        }
        if path.ends_with("_test.go") && !mapping.include_tests() {
            settled.push(UnitReport::new(path, Outcome::skipped("test file")));
            continue;
        }

        let target = if let Some(package) = mapping.file_destination(&path) {
            let destination = if package.dir.is_empty() {
                file_name(&path).to_string()
            } else {
                format!("{}/{}", package.dir, file_name(&path))
            };
            Some((package, destination))
        } else {
            mapping
                .package_for_dir(parent_dir(&path))
                .map(|package| (package, path.clone()))
        };

        match target {
            Some((package, destination)) => targets.push(Target {
                path,
                package,
                destination,
            }),
            None => settled.push(UnitReport::new(
                path,
                Outcome::skipped("outside configured packages"),
            )),
        }
    }

    (targets, settled)
}

fn plan_unit(tree: &dyn SourceTree, mapping: &MappingTable, target: &Target<'_>) -> Slot {
    let mut report = UnitReport::new(target.path.clone(), Outcome::Unchanged);
    let mut unit = match read_unit(tree, target) {
        Ok(unit) => unit,
        Err(err) => {
            warn!(unit = %target.path, error = %err, "pipeline: unit not migrated");
            report.outcome = outcome_of(&err, Stage::Discovered);
            return Slot::Settled(report);
        }
    };
    let text = unit.text.clone();
    match plan_stages(tree, mapping, target, &mut unit, &mut report) {
        Ok(already_written) => {
            let changed = unit.text != text;
            report.outcome = if unit.is_moved() {
                Outcome::Moved
            } else if changed {
                Outcome::Rewritten
            } else {
                Outcome::Unchanged
            };
            debug!(unit = %target.path, outcome = report.outcome.label(), "pipeline: planned");
            Slot::Planned(Box::new(Planned {
                unit,
                changed,
                already_written,
                report,
            }))
        }
        Err(err) => {
            warn!(
                unit = %target.path,
                stage = %unit.stage,
                error = %err,
                "pipeline: unit not migrated"
            );
            report.outcome = outcome_of(&err, unit.stage);
            Slot::Settled(report)
        }
    }
}

fn read_unit(tree: &dyn SourceTree, target: &Target<'_>) -> Result<SourceUnit, UnitError> {
    let text = tree
        .read(&target.path)
        .map_err(|e| UnitError::io(Stage::Discovered, &target.path, e))?;
    let mut unit = SourceUnit::parse(target.path.clone(), text)?;
    unit.destination_path = Some(target.destination.clone());
    Ok(unit)
}

/// Advance `unit` through qualification, import reconciliation and
/// relocation. `unit.stage` records the last stage completed. Returns
/// whether the destination already holds the final text.
fn plan_stages(
    tree: &dyn SourceTree,
    mapping: &MappingTable,
    target: &Target<'_>,
    unit: &mut SourceUnit,
    report: &mut UnitReport,
) -> Result<bool, UnitError> {
    if unit.is_moved() {
        report.destination = Some(target.destination.clone());
    }

    let q = qualify(unit, mapping, Some(target.package))?;
    unit.stage = Stage::Qualified;
    report.qualified = q.qualified;
    report.renamed = q.renamed;
    report.warnings = q.warnings;

    report.imports_added = imports::reconcile(unit, &q.imports)?;
    unit.stage = Stage::ImportsReconciled;

    report.package_change = relocate::relocate(unit, target.package, &target.destination)?;
    unit.stage = Stage::Relocated;
    let destination = relocate::check_destination(tree, unit)?;

    for warning in &report.warnings {
        warn!(unit = %target.path, "{}", warning);
    }
    Ok(destination == Destination::AlreadyWritten)
}

/// Two units writing one destination is a conflict for all of them. A
/// mover whose destination already holds its text only removes its
/// original, so it does not claim the path.
fn claim_destinations(slots: &mut [Slot]) {
    let mut claims: HashMap<String, usize> = HashMap::new();
    for slot in slots.iter() {
        if let Slot::Planned(p) = slot {
            if !p.already_written {
                *claims.entry(p.unit.final_path().to_string()).or_default() += 1;
            }
        }
    }
    for slot in slots.iter_mut() {
        let Slot::Planned(p) = slot else {
            continue;
        };
        if p.already_written {
            continue;
        }
        let claimants = claims.get(p.unit.final_path()).copied().unwrap_or_default();
        if claimants > 1 {
            let mut report = p.report.clone();
            report.outcome = Outcome::conflict(format!(
                "destination '{}' is claimed by {} units",
                p.unit.final_path(),
                claimants
            ));
            *slot = Slot::Settled(report);
        }
    }
}

fn create_destination_dirs(tree: &dyn SourceTree, slots: &mut [Slot]) {
    let mut failed: HashMap<String, String> = HashMap::new();
    let mut created: Vec<String> = Vec::new();
    for slot in slots.iter() {
        let Slot::Planned(p) = slot else {
            continue;
        };
        if !p.unit.is_moved() {
            continue;
        }
        let dir = p.unit.final_dir().to_string();
        if created.contains(&dir) || failed.contains_key(&dir) {
            continue;
        }
        match tree.create_dir_all(&dir) {
            Ok(()) => created.push(dir),
            Err(e) => {
                warn!(dir = %dir, error = %e, "pipeline: cannot create destination directory");
                failed.insert(dir, e.to_string());
            }
        }
    }
    if failed.is_empty() {
        return;
    }
    for slot in slots.iter_mut() {
        let Slot::Planned(p) = slot else {
            continue;
        };
        if let Some(reason) = failed.get(p.unit.final_dir()) {
            let mut report = p.report.clone();
            report.outcome = Outcome::failed(
                Stage::Relocated,
                format!("cannot create '{}': {}", p.unit.final_dir(), reason),
            );
            *slot = Slot::Settled(report);
        }
    }
}

fn commit_unit(
    tree: &dyn SourceTree,
    planned: Planned,
    options: &RunOptions,
    abort: &AtomicBool,
) -> UnitReport {
    let Planned {
        mut unit,
        changed,
        mut report,
        ..
    } = planned;

    if abort.load(Ordering::SeqCst) {
        report.outcome = Outcome::skipped("aborted");
        return report;
    }

    match relocate::commit(tree, &unit, changed) {
        Ok(committed) => {
            unit.stage = Stage::Done;
            report.outcome = match committed {
                Committed::Moved => Outcome::Moved,
                Committed::Rewritten => Outcome::Rewritten,
                Committed::Unchanged => Outcome::Unchanged,
            };
            debug!(
                unit = %unit.original_path,
                outcome = report.outcome.label(),
                "pipeline: committed"
            );
        }
        Err(err) => {
            warn!(unit = %unit.original_path, error = %err, "pipeline: commit failed");
            if options.fail_on_conflict {
                abort.store(true, Ordering::SeqCst);
            }
            report.outcome = outcome_of(&err, unit.stage);
        }
    }
    report
}
