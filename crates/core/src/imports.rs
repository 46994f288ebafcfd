//! Import block management: reading the existing imports of a unit,
//! choosing local names for newly required packages, and splicing new
//! import specs into the unit text.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::{ScanError, UnitError};
use crate::scanner::{line_of, tokenize, SpanKind, TokenKind};
use crate::unit::{Edit, SourceUnit};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
}

impl ImportSpec {
    pub fn new(path: impl Into<String>) -> Self {
        ImportSpec {
            alias: None,
            path: path.into(),
        }
    }

    pub fn aliased(alias: impl Into<String>, path: impl Into<String>) -> Self {
        ImportSpec {
            alias: Some(alias.into()),
            path: path.into(),
        }
    }

    /// Name the import binds in the file, guessed from the path when the
    /// spec is not aliased. `None` for dot and blank imports.
    pub fn local_name(&self) -> Option<&str> {
        match self.alias.as_deref() {
            Some("." | "_") => None,
            Some(alias) => Some(alias),
            None => Some(default_name(&self.path)),
        }
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} \"{}\"", alias, self.path),
            None => format!("\"{}\"", self.path),
        }
    }
}

/// Conventional package name of an import path: the last element, skipping
/// a trailing major-version element (`/v2`) and a `.vN` suffix.
pub fn default_name(path: &str) -> &str {
    let mut elems = path.rsplit('/');
    let mut last = elems.next().unwrap_or(path);
    if is_major_version(last) {
        if let Some(prev) = elems.next() {
            last = prev;
        }
    }
    match last.rsplit_once(".v") {
        Some((head, v)) if !head.is_empty() && v.chars().all(|c| c.is_ascii_digit()) => head,
        _ => last,
    }
}

fn is_major_version(elem: &str) -> bool {
    elem.len() > 1 && elem.starts_with('v') && elem[1..].chars().all(|c| c.is_ascii_digit())
}

/// Standard library paths have no dot in their first element.
fn is_stdlib(path: &str) -> bool {
    !path.split('/').next().unwrap_or(path).contains('.')
}

/// Byte range of each spec and whether the region contains a group.
struct Layout {
    specs: Vec<(ImportSpec, usize, usize)>,
    /// Offsets of the `(` and `)` of the first grouped declaration.
    group: Option<(usize, usize)>,
}

fn unquote(lit: &str) -> String {
    lit.trim_matches(|c| c == '"' || c == '`').to_string()
}

fn layout(unit: &SourceUnit) -> Result<Option<Layout>, ScanError> {
    let Some(block) = unit.span(SpanKind::ImportBlock) else {
        return Ok(None);
    };
    let base = block.start;
    let src = block.text(&unit.text);
    let tokens = tokenize(src)?;

    let mut specs = Vec::new();
    let mut group_open = None;
    let mut group_close = None;
    let mut depth = 0usize;
    let mut alias: Option<(String, usize)> = None;

    for tok in tokens.iter().filter(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment)) {
        let text = tok.text(src);
        match tok.kind {
            TokenKind::Ident if text == "import" => alias = None,
            TokenKind::Ident => alias = Some((text.to_string(), tok.start)),
            TokenKind::Punct if text == "." && alias.is_none() => {
                alias = Some((".".to_string(), tok.start))
            }
            TokenKind::Punct if text == "(" => {
                depth += 1;
                group_open.get_or_insert(base + tok.start);
            }
            TokenKind::Punct if text == ")" => {
                depth = depth.saturating_sub(1);
                group_close.get_or_insert(base + tok.start);
            }
            TokenKind::Str => {
                let (name, start) = match alias.take() {
                    Some((name, start)) => (Some(name), start),
                    None => (None, tok.start),
                };
                specs.push((
                    ImportSpec {
                        alias: name,
                        path: unquote(text),
                    },
                    base + start,
                    base + tok.end,
                ));
            }
            TokenKind::Punct if text == ";" => alias = None,
            _ => {
                return Err(ScanError::MalformedImport {
                    line: line_of(&unit.text, base + tok.start),
                })
            }
        }
    }
    if depth != 0 {
        return Err(ScanError::MalformedImport {
            line: line_of(&unit.text, base),
        });
    }
    Ok(Some(Layout {
        specs,
        group: group_open.zip(group_close),
    }))
}

/// Existing import specs of a unit, in source order.
pub fn existing(unit: &SourceUnit) -> Result<Vec<ImportSpec>, ScanError> {
    Ok(layout(unit)?
        .map(|l| l.specs.into_iter().map(|(spec, _, _)| spec).collect())
        .unwrap_or_default())
}

/// How references to a package are spelled in one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `local.Symbol`
    Qualified(String),
    /// The package is dot-imported; references stay bare.
    Dot,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    /// Import path -> binding.
    pub bindings: BTreeMap<String, Binding>,
    /// Specs that must be added to the unit.
    pub additions: Vec<ImportSpec>,
}

impl ImportPlan {
    pub fn binding(&self, path: &str) -> Option<&Binding> {
        self.bindings.get(path)
    }
}

/// A package the unit needs, and whether its local name is fixed because
/// the text already spells it (`base.X` written before the import exists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Need {
    pub name: String,
    pub fixed: bool,
}

/// Choose local names for `needed` (import path -> package name).
///
/// Existing imports of the same path are reused. New imports take the
/// package name unless it collides with another import, a name declared in
/// the unit, or an earlier choice; then the parent directory is prefixed
/// (`clibase`), and finally a numeric suffix is appended. Paths are handled
/// in sorted order so the result is stable across runs.
pub fn plan(
    existing: &[ImportSpec],
    needed: &BTreeMap<String, Need>,
    declared: &HashSet<String>,
) -> Result<ImportPlan, UnitError> {
    let mut plan = ImportPlan::default();
    let mut taken: HashSet<String> = existing
        .iter()
        .filter_map(|s| s.local_name().map(str::to_string))
        .collect();
    taken.extend(declared.iter().cloned());

    for (path, need) in needed {
        if let Some(spec) = existing.iter().find(|s| &s.path == path) {
            let binding = match spec.alias.as_deref() {
                Some("_") => {
                    return Err(UnitError::Conflict(format!(
                        "\"{}\" is imported for side effects only but its symbols are referenced",
                        path
                    )))
                }
                Some(".") => Binding::Dot,
                Some(alias) => Binding::Qualified(alias.to_string()),
                None => Binding::Qualified(need.name.clone()),
            };
            plan.bindings.insert(path.clone(), binding);
            continue;
        }

        let local = if need.fixed {
            need.name.clone()
        } else {
            pick_local(path, &need.name, &taken)
        };
        taken.insert(local.clone());
        let spec = if local == default_name(path) {
            ImportSpec::new(path.clone())
        } else {
            ImportSpec::aliased(local.clone(), path.clone())
        };
        plan.bindings.insert(path.clone(), Binding::Qualified(local));
        plan.additions.push(spec);
    }

    Ok(plan)
}

fn pick_local(path: &str, name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let parent = path
        .rsplit('/')
        .nth(1)
        .map(|p| p.replace(|c: char| !(c.is_alphanumeric() || c == '_'), ""))
        .unwrap_or_default();
    let prefixed = format!("{}{}", parent, name);
    if !parent.is_empty() && !taken.contains(&prefixed) {
        return prefixed;
    }
    (2..)
        .map(|n| format!("{}{}", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Add `required` to the unit's imports. Paths already imported are left
/// alone, duplicates in `required` collapse to the first spec per path, and
/// existing specs keep their text and order. Returns the specs added.
pub fn reconcile(
    unit: &mut SourceUnit,
    required: &[ImportSpec],
) -> Result<Vec<ImportSpec>, UnitError> {
    let layout = layout(unit)?;
    let present: HashSet<&str> = layout
        .iter()
        .flat_map(|l| l.specs.iter().map(|(s, _, _)| s.path.as_str()))
        .collect();

    let mut additions: BTreeMap<&str, &ImportSpec> = BTreeMap::new();
    for spec in required {
        if !present.contains(spec.path.as_str()) {
            additions.entry(spec.path.as_str()).or_insert(spec);
        }
    }
    if additions.is_empty() {
        return Ok(Vec::new());
    }
    let added: Vec<ImportSpec> = additions.values().map(|s| (*s).clone()).collect();
    let lines: String = added.iter().map(|s| format!("\t{}\n", s.render())).collect();

    let edits = match layout {
        None => {
            let clause_end = unit
                .span(SpanKind::PackageClause)
                .map(|s| s.end)
                .unwrap_or_default();
            vec![Edit::insert(clause_end, format!("\n\nimport (\n{})", lines))]
        }
        Some(Layout {
            specs,
            group: Some((open, close)),
        }) => {
            let grouped: Vec<&(ImportSpec, usize, usize)> = specs
                .iter()
                .filter(|(_, start, end)| *start > open && *end < close)
                .collect();
            match grouped.last() {
                Some((last, _, end)) => {
                    let after_stdlib =
                        is_stdlib(&last.path) && added.iter().all(|s| !is_stdlib(&s.path));
                    let gap = if after_stdlib { "\n" } else { "" };
                    let line_end = unit.text[*end..close]
                        .find('\n')
                        .map(|off| end + off + 1);
                    match line_end {
                        Some(at) => vec![Edit::insert(at, format!("{}{}", gap, lines))],
                        None => vec![Edit::insert(*end, format!("\n{}{}", gap, lines))],
                    }
                }
                None => {
                    let newline = if unit.text[..close].ends_with('\n') { "" } else { "\n" };
                    vec![Edit::insert(close, format!("{}{}", newline, lines))]
                }
            }
        }
        Some(Layout { specs, group: None }) => {
            // Single-line declarations only: promote the first to a group.
            let Some((_, start, end)) = specs.first() else {
                return Ok(Vec::new());
            };
            let first = unit.text[*start..*end].to_string();
            let block = unit.span(SpanKind::ImportBlock).map(|s| s.start).unwrap_or(*start);
            vec![Edit::replace(
                block,
                *end,
                format!("import (\n\t{}\n{})", first, lines),
            )]
        }
    };

    unit.apply(edits)?;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(text: &str) -> SourceUnit {
        SourceUnit::parse("a.go", text).unwrap()
    }

    fn paths(unit: &SourceUnit) -> Vec<String> {
        existing(unit)
            .unwrap()
            .into_iter()
            .map(|s| s.path)
            .collect()
    }

    const BASE: &str = "github.com/acme/gdrv/internal/cli/base";

    #[test]
    fn default_names_follow_go_conventions() {
        assert_eq!(default_name("fmt"), "fmt");
        assert_eq!(default_name("github.com/acme/gdrv/internal/cli/base"), "base");
        assert_eq!(default_name("github.com/alecthomas/kong/v2"), "kong");
        assert_eq!(default_name("gopkg.in/yaml.v3"), "yaml");
    }

    #[test]
    fn reads_grouped_and_aliased_specs() {
        let u = unit("package cli\n\nimport (\n\t\"fmt\"\n\tkb \"github.com/x/kong\"\n\t. \"strings\"\n\t_ \"embed\"\n)\n");
        let specs = existing(&u).unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[1], ImportSpec::aliased("kb", "github.com/x/kong"));
        assert_eq!(specs[2].local_name(), None);
        assert_eq!(specs[3].alias.as_deref(), Some("_"));
    }

    #[test]
    fn synthesizes_block_after_package_clause() {
        let mut u = unit("package drive\n\nfunc Bar() { base.NewOutputWriter() }\n");
        let added = reconcile(&mut u, &[ImportSpec::new(BASE)]).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(
            u.text,
            format!(
                "package drive\n\nimport (\n\t\"{}\"\n)\n\nfunc Bar() {{ base.NewOutputWriter() }}\n",
                BASE
            )
        );
    }

    #[test]
    fn inserts_into_existing_group_after_stdlib_with_gap() {
        let mut u = unit("package drive\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n");
        reconcile(&mut u, &[ImportSpec::new(BASE)]).unwrap();
        assert_eq!(
            u.text,
            format!("package drive\n\nimport (\n\t\"fmt\"\n\t\"os\"\n\n\t\"{}\"\n)\n", BASE)
        );
    }

    #[test]
    fn inserts_into_third_party_group_without_gap() {
        let mut u = unit("package drive\n\nimport (\n\t\"fmt\"\n\n\t\"github.com/x/kong\"\n)\n");
        reconcile(&mut u, &[ImportSpec::new(BASE)]).unwrap();
        assert_eq!(paths(&u), vec!["fmt", "github.com/x/kong", BASE]);
        assert!(u.text.contains("kong\"\n\t\"github.com/acme"));
    }

    #[test]
    fn promotes_single_line_import() {
        let mut u = unit("package drive\n\nimport \"fmt\"\n\nfunc f() {}\n");
        reconcile(&mut u, &[ImportSpec::new(BASE)]).unwrap();
        assert_eq!(
            u.text,
            format!("package drive\n\nimport (\n\t\"fmt\"\n\t\"{}\"\n)\n\nfunc f() {{}}\n", BASE)
        );
    }

    #[test]
    fn same_import_twice_yields_one_spec() {
        let mut u = unit("package drive\n\nimport \"fmt\"\n");
        reconcile(&mut u, &[ImportSpec::new(BASE), ImportSpec::new(BASE)]).unwrap();
        let again = reconcile(&mut u, &[ImportSpec::new(BASE)]).unwrap();
        assert!(again.is_empty());
        assert_eq!(paths(&u).iter().filter(|p| *p == BASE).count(), 1);
    }

    #[test]
    fn plan_reuses_existing_alias() {
        let existing = vec![ImportSpec::aliased("clibase", BASE)];
        let mut needed = BTreeMap::new();
        needed.insert(BASE.to_string(), Need { name: "base".into(), fixed: false });
        let plan = plan(&existing, &needed, &HashSet::new()).unwrap();
        assert!(plan.additions.is_empty());
        assert_eq!(plan.binding(BASE), Some(&Binding::Qualified("clibase".into())));
    }

    #[test]
    fn plan_aliases_on_collision() {
        let existing = vec![ImportSpec::new("github.com/other/base")];
        let mut needed = BTreeMap::new();
        needed.insert(BASE.to_string(), Need { name: "base".into(), fixed: false });
        let p = plan(&existing, &needed, &HashSet::new()).unwrap();
        assert_eq!(p.additions, vec![ImportSpec::aliased("clibase", BASE)]);

        let declared: HashSet<String> = ["base".to_string(), "clibase".to_string()].into();
        let p = plan(&[], &needed, &declared).unwrap();
        assert_eq!(p.additions, vec![ImportSpec::aliased("base2", BASE)]);
    }

    #[test]
    fn plan_rejects_blank_import_of_needed_package() {
        let existing = vec![ImportSpec::aliased("_", BASE)];
        let mut needed = BTreeMap::new();
        needed.insert(BASE.to_string(), Need { name: "base".into(), fixed: false });
        assert!(matches!(
            plan(&existing, &needed, &HashSet::new()),
            Err(UnitError::Conflict(_))
        ));
    }

    #[test]
    fn plan_honours_dot_imports() {
        let existing = vec![ImportSpec::aliased(".", BASE)];
        let mut needed = BTreeMap::new();
        needed.insert(BASE.to_string(), Need { name: "base".into(), fixed: false });
        let p = plan(&existing, &needed, &HashSet::new()).unwrap();
        assert_eq!(p.binding(BASE), Some(&Binding::Dot));
    }
}
