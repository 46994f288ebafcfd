//! A source unit and its text-edit bookkeeping.
//!
//! Every stage rewrites the unit through [`SourceUnit::apply`], which
//! splices a batch of non-overlapping edits into the text and re-scans the
//! result. Spans are therefore always in sync with the text they describe.

use crate::error::{ScanError, Stage};
use crate::scanner::{scan, SpanKind, TextSpan};
use crate::sites::{classify, IdentSite};

/// Replace `start..end` of the current text with `replacement`. An empty
/// range is an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn replace(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Edit {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }
}

/// Splice `edits` into `text`. Edits are applied in offset order; inserts at
/// the same offset keep their relative order. Overlapping edits are a
/// caller bug and the later one is dropped.
pub fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));
    let mut out = String::with_capacity(text.len() + edits.len() * 8);
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..edit.start]);
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Tree-relative path the unit was discovered at.
    pub original_path: String,
    /// Tree-relative path the unit will be written to. Equal to
    /// `original_path` for units that stay in place.
    pub destination_path: Option<String>,
    pub package_name: String,
    pub text: String,
    pub spans: Vec<TextSpan>,
    pub stage: Stage,
}

impl SourceUnit {
    /// Scan `text` and build a unit in the `Scanned` stage.
    pub fn parse(path: impl Into<String>, text: impl Into<String>) -> Result<Self, ScanError> {
        let text = text.into();
        let spans = scan(&text)?;
        let package_name = clause_name(&text, &spans).to_string();
        Ok(SourceUnit {
            original_path: path.into(),
            destination_path: None,
            package_name,
            text,
            spans,
            stage: Stage::Scanned,
        })
    }

    /// Apply `edits` and re-scan. Returns whether the text changed.
    pub fn apply(&mut self, edits: Vec<Edit>) -> Result<bool, ScanError> {
        if edits.is_empty() {
            return Ok(false);
        }
        let text = apply_edits(&self.text, edits);
        if text == self.text {
            return Ok(false);
        }
        self.spans = scan(&text)?;
        self.package_name = clause_name(&text, &self.spans).to_string();
        self.text = text;
        Ok(true)
    }

    pub fn sites(&self) -> Vec<IdentSite> {
        classify(&self.text, &self.spans)
    }

    pub fn span(&self, kind: SpanKind) -> Option<&TextSpan> {
        self.spans.iter().find(|s| s.kind == kind)
    }

    /// Byte range of the package name inside the package clause.
    pub fn package_name_range(&self) -> (usize, usize) {
        let end = self
            .span(SpanKind::PackageClause)
            .map(|s| s.end)
            .unwrap_or_default();
        (end - self.package_name.len(), end)
    }

    /// Path the unit ends up at.
    pub fn final_path(&self) -> &str {
        self.destination_path
            .as_deref()
            .unwrap_or(&self.original_path)
    }

    /// Directory the unit ends up in (`""` for the tree root).
    pub fn final_dir(&self) -> &str {
        parent_dir(self.final_path())
    }

    pub fn is_moved(&self) -> bool {
        self.final_path() != self.original_path
    }

    pub fn is_test(&self) -> bool {
        self.original_path.ends_with("_test.go")
    }
}

pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// The package name is the trailing identifier of the clause span.
fn clause_name<'a>(text: &'a str, spans: &[TextSpan]) -> &'a str {
    let Some(span) = spans.iter().find(|s| s.kind == SpanKind::PackageClause) else {
        return "";
    };
    let clause = span.text(text);
    let start = clause
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(clause.len());
    &clause[start..]
}
