//! Package clause rewriting and the write / read-back / remove protocol
//! that moves a unit to its destination.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Stage, UnitError};
use crate::mapping::Package;
use crate::tree::SourceTree;
use crate::unit::{Edit, SourceUnit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageChange {
    pub from: String,
    pub to: String,
}

/// Clause name a unit should carry inside `package`. External test
/// packages keep their `_test` suffix.
pub fn clause_name_for(unit: &SourceUnit, package: &Package) -> String {
    if unit.is_test() && unit.package_name.ends_with("_test") {
        format!("{}_test", package.name)
    } else {
        package.name.clone()
    }
}

/// Point `unit` at `destination_path` and rewrite its package clause to
/// `package`. Nothing is written yet; see [`commit`].
pub fn relocate(
    unit: &mut SourceUnit,
    package: &Package,
    destination_path: &str,
) -> Result<Option<PackageChange>, UnitError> {
    unit.destination_path = Some(destination_path.to_string());
    let from = unit.package_name.clone();
    let to = clause_name_for(unit, package);
    if from == to {
        return Ok(None);
    }
    let (start, end) = unit.package_name_range();
    unit.apply(vec![Edit::replace(start, end, to.clone())])?;
    Ok(Some(PackageChange { from, to }))
}

/// Result of checking a move destination before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Free,
    /// The destination already holds exactly this unit's content, left by
    /// an interrupted earlier run.
    AlreadyWritten,
}

pub fn check_destination(
    tree: &dyn SourceTree,
    unit: &SourceUnit,
) -> Result<Destination, UnitError> {
    let dest = unit.final_path();
    if !unit.is_moved() || !tree.exists(dest) {
        return Ok(Destination::Free);
    }
    let current = tree
        .read(dest)
        .map_err(|e| UnitError::io(Stage::Relocated, dest, e))?;
    if current == unit.text {
        Ok(Destination::AlreadyWritten)
    } else {
        Err(UnitError::Conflict(format!(
            "destination '{}' already exists with different content",
            dest
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    /// Written to a new path and the original removed.
    Moved,
    /// Rewritten in place.
    Rewritten,
    /// Nothing to write.
    Unchanged,
}

/// Persist `unit`. `changed` says whether the text differs from what was
/// read. A moved unit is written, read back and compared before the
/// original is removed; the original is never touched when any of that
/// fails.
pub fn commit(
    tree: &dyn SourceTree,
    unit: &SourceUnit,
    changed: bool,
) -> Result<Committed, UnitError> {
    let original = unit.original_path.as_str();

    if !unit.is_moved() {
        if !changed {
            return Ok(Committed::Unchanged);
        }
        write_verified(tree, original, &unit.text)?;
        return Ok(Committed::Rewritten);
    }

    let dest = unit.final_path();
    match check_destination(tree, unit)? {
        Destination::AlreadyWritten => {
            debug!(unit = original, dest, "relocate: destination already written");
        }
        Destination::Free => {
            if let Err(err) = write_verified(tree, dest, &unit.text) {
                if matches!(err, UnitError::ReadBackMismatch(_)) {
                    if let Err(e) = tree.remove(dest) {
                        warn!(dest, error = %e, "relocate: cannot remove unverified copy");
                    }
                }
                return Err(err);
            }
        }
    }

    tree.copy_permissions(original, dest)
        .map_err(|e| UnitError::io(Stage::Relocated, dest, e))?;
    tree.remove(original)
        .map_err(|e| UnitError::io(Stage::Relocated, original, e))?;
    Ok(Committed::Moved)
}

fn write_verified(tree: &dyn SourceTree, path: &str, text: &str) -> Result<(), UnitError> {
    tree.write(path, text)
        .map_err(|e| UnitError::io(Stage::Relocated, path, e))?;
    let back = tree
        .read(path)
        .map_err(|e| UnitError::io(Stage::Relocated, path, e))?;
    if back != text {
        return Err(UnitError::ReadBackMismatch(path.into()));
    }
    Ok(())
}
