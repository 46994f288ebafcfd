//! Reference qualification.
//!
//! Rewrites bare references to mapped symbols into `pkg.Symbol`, applies
//! export renames, and heals `pkg.Symbol` selectors whose import is
//! missing. Only identifier sites the classifier marks as references are
//! candidates, so matching is always on whole tokens: `ResolveOptions` can
//! never be rewritten as `Resolve` followed by `Options`.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::error::UnitError;
use crate::imports::{self, Binding, ImportSpec, Need};
use crate::mapping::{MappingEntry, MappingTable, Package};
use crate::sites::{DeclKind, Site};
use crate::unit::{Edit, SourceUnit};

/// What qualification did to one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qualification {
    pub qualified: usize,
    pub renamed: usize,
    /// Specs the import block must gain for the rewritten references.
    pub imports: Vec<ImportSpec>,
    pub warnings: Vec<String>,
}

enum Rewrite<'m> {
    Qualify {
        start: usize,
        end: usize,
        entry: &'m MappingEntry,
        path: String,
    },
    Rename {
        start: usize,
        end: usize,
        entry: &'m MappingEntry,
    },
}

/// Qualify the references of `unit`, which ends up in `home` (`None` when
/// its final directory is not a configured package).
pub fn qualify(
    unit: &mut SourceUnit,
    mapping: &MappingTable,
    home: Option<&Package>,
) -> Result<Qualification, UnitError> {
    let sites = unit.sites();
    let existing = imports::existing(unit)?;
    let home_name = home.map(|p| p.name.as_str());
    let mut out = Qualification::default();

    // Names that would shadow an import's local name.
    let declared: HashSet<String> = sites
        .iter()
        .filter(|s| {
            matches!(
                s.site,
                Site::Declaration {
                    kind: DeclKind::PackageLevel | DeclKind::Local | DeclKind::Receiver
                }
            )
        })
        .map(|s| s.text(&unit.text).to_string())
        .collect();

    let bound: HashMap<&str, &str> = existing
        .iter()
        .filter_map(|s| s.local_name().map(|local| (local, s.path.as_str())))
        .collect();

    if let Some(home) = home {
        if existing.iter().any(|s| s.path == home.import_path) {
            out.warnings.push(format!(
                "imports its own package \"{}\"",
                home.import_path
            ));
        }
    }

    let mut needed: BTreeMap<String, Need> = BTreeMap::new();
    let mut rewrites = Vec::new();

    for site in &sites {
        let text = site.text(&unit.text);
        match site.site {
            Site::Reference => {
                let Some(entry) = mapping.entry(text) else {
                    continue;
                };
                if home_name == Some(entry.package.as_str()) {
                    if entry.is_renamed() {
                        rewrites.push(Rewrite::Rename {
                            start: site.start,
                            end: site.end,
                            entry,
                        });
                    }
                    continue;
                }
                let Some(pkg) = mapping.package(&entry.package) else {
                    continue;
                };
                needed.entry(pkg.import_path.clone()).or_insert(Need {
                    name: pkg.name.clone(),
                    fixed: false,
                });
                rewrites.push(Rewrite::Qualify {
                    start: site.start,
                    end: site.end,
                    entry,
                    path: pkg.import_path.clone(),
                });
            }

            Site::Declaration { kind } => {
                let Some(entry) = mapping.entry(text) else {
                    continue;
                };
                let in_home = home_name == Some(entry.package.as_str());
                match kind {
                    DeclKind::PackageLevel | DeclKind::Receiver if in_home => {
                        if entry.is_renamed() {
                            rewrites.push(Rewrite::Rename {
                                start: site.start,
                                end: site.end,
                                entry,
                            });
                        }
                    }
                    DeclKind::PackageLevel => out.warnings.push(format!(
                        "declares '{}', which is mapped to package '{}'",
                        text, entry.package
                    )),
                    _ => {}
                }
            }

            Site::Selected {
                qualifier: Some((qs, qe)),
            } => {
                let local = &unit.text[qs..qe];
                if declared.contains(local) {
                    continue;
                }
                let target = match bound.get(local) {
                    Some(path) => mapping.packages().find(|p| p.import_path == *path),
                    None => mapping.package(local),
                };
                let Some(pkg) = target else {
                    continue;
                };

                let renamed = mapping
                    .entry(text)
                    .filter(|e| e.package == pkg.name && e.is_renamed());
                let known = renamed.is_some() || mapping.exports(&pkg.name, text);
                if !known {
                    continue;
                }
                if let Some(entry) = renamed {
                    rewrites.push(Rewrite::Rename {
                        start: site.start,
                        end: site.end,
                        entry,
                    });
                }
                if !bound.contains_key(local) && home_name != Some(pkg.name.as_str()) {
                    needed
                        .entry(pkg.import_path.clone())
                        .and_modify(|n| {
                            n.name = local.to_string();
                            n.fixed = true;
                        })
                        .or_insert(Need {
                            name: local.to_string(),
                            fixed: true,
                        });
                }
            }

            Site::Selected { qualifier: None } => {}
        }
    }

    let plan = imports::plan(&existing, &needed, &declared)?;

    let mut edits = Vec::with_capacity(rewrites.len());
    for rewrite in rewrites {
        match rewrite {
            Rewrite::Qualify {
                start,
                end,
                entry,
                path,
            } => match plan.binding(&path) {
                Some(Binding::Qualified(local)) => {
                    edits.push(Edit::replace(start, end, format!("{}.{}", local, entry.exported)));
                    out.qualified += 1;
                }
                Some(Binding::Dot) if entry.is_renamed() => {
                    edits.push(Edit::replace(start, end, entry.exported.clone()));
                    out.renamed += 1;
                }
                _ => {}
            },
            Rewrite::Rename { start, end, entry } => {
                edits.push(Edit::replace(start, end, entry.exported.clone()));
                out.renamed += 1;
            }
        }
    }

    if !edits.is_empty() {
        debug!(
            unit = %unit.original_path,
            qualified = out.qualified,
            renamed = out.renamed,
            "qualify: rewriting references"
        );
    }
    unit.apply(edits)?;
    out.imports = plan.additions;
    Ok(out)
}
