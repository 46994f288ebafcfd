//! Identifier site classification.
//!
//! Walks the significant spans of a scanned unit and decides, for every
//! identifier, whether it is a plain reference (a rewrite candidate), the
//! selected half of `x.Name`, or a declaration site of some kind. This is a
//! token-level heuristic over the scanner's output, not a parser: it tracks
//! brace/paren depth, declaration groups, receiver lists and struct bodies.

use serde::Serialize;

use crate::scanner::{SpanKind, TextSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    /// Name after `func`, `type`, `var` or `const` outside function bodies.
    PackageLevel,
    /// Method name following a receiver list.
    Method,
    /// Any identifier inside a method receiver list.
    Receiver,
    /// Struct field or interface method name.
    Field,
    /// Composite literal key (`Name: value`).
    Key,
    /// `:=` targets and declarations inside function bodies.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "site")]
pub enum Site {
    Reference,
    /// `Name` in `x.Name`. `qualifier` is the byte range of `x` when `x` is
    /// a bare identifier.
    Selected { qualifier: Option<(usize, usize)> },
    Declaration { kind: DeclKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentSite {
    pub start: usize,
    pub end: usize,
    pub site: Site,
}

impl IdentSite {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// True for a non-keyword Go identifier.
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_') && !is_keyword(word)
}

#[derive(Debug, Clone, Copy)]
struct Tok<'a> {
    kind: SpanKind,
    text: &'a str,
    start: usize,
    end: usize,
    line_start: bool,
}

impl Tok<'_> {
    fn is(&self, text: &str) -> bool {
        self.kind == SpanKind::Other && self.text == text
    }

    fn is_ident(&self) -> bool {
        self.kind == SpanKind::Identifier && !is_keyword(self.text)
    }
}

/// Tokens after which a line break cannot end a declaration: a binary
/// operator, `=`, a list separator or an open index.
fn continues_expression(tok: &Tok<'_>) -> bool {
    tok.kind == SpanKind::Other
        && matches!(
            tok.text,
            "=" | "+" | "-" | "*" | "/" | "%" | "&" | "|" | "^" | "<" | ">" | "," | "[" | ":"
        )
}

fn significant<'a>(src: &'a str, spans: &[TextSpan]) -> Vec<Tok<'a>> {
    let mut out = Vec::with_capacity(spans.len());
    let mut newline = true;
    for span in spans {
        let text = span.text(src);
        let blank = span.kind == SpanKind::Comment || span.is_whitespace(src);
        if blank {
            newline |= text.contains('\n');
            continue;
        }
        out.push(Tok {
            kind: span.kind,
            text,
            start: span.start,
            end: span.end,
            line_start: newline,
        });
        newline = false;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pending {
    #[default]
    Nothing,
    Receiver,
    Group,
    Body,
}

#[derive(Debug, Default)]
struct State {
    braces: usize,
    parens: usize,
    /// (paren depth, brace depth) of open `var (`/`const (`/`type (` groups.
    groups: Vec<(usize, usize)>,
    /// Brace depths of open struct/interface bodies.
    bodies: Vec<usize>,
    /// Paren depth of an open receiver list.
    receiver: Option<usize>,
    pending: Pending,
    expect: Option<DeclKind>,
    names_continue: Option<DeclKind>,
    in_case: bool,
}

impl State {
    fn keyword(&mut self, toks: &[Tok<'_>], i: usize) {
        self.expect = None;
        self.names_continue = None;
        let prev = i.checked_sub(1).map(|p| toks[p]);
        let next = toks.get(i + 1);

        match toks[i].text {
            "func" => {
                let in_expression = prev.is_some_and(|p| {
                    p.kind == SpanKind::Other && matches!(p.text, "=" | "," | "(" | "[" | ":")
                });
                if self.braces == 0 && self.parens == 0 && !in_expression {
                    match next {
                        Some(n) if n.is("(") => self.pending = Pending::Receiver,
                        Some(n) if n.is_ident() => self.expect = Some(DeclKind::PackageLevel),
                        _ => {}
                    }
                }
            }
            "type" | "var" | "const" => {
                let kind = if self.braces == 0 {
                    DeclKind::PackageLevel
                } else {
                    DeclKind::Local
                };
                match next {
                    Some(n) if n.is("(") => self.pending = Pending::Group,
                    Some(n) if n.is_ident() => self.expect = Some(kind),
                    _ => {}
                }
            }
            "struct" | "interface" => {
                if next.is_some_and(|n| n.is("{")) {
                    self.pending = Pending::Body;
                }
            }
            "case" => self.in_case = true,
            _ => {}
        }
    }

    fn punct(&mut self, tok: &Tok<'_>) {
        self.expect = None;
        if tok.text == "," {
            if let Some(kind) = self.names_continue.take() {
                self.expect = Some(kind);
            }
            return;
        }
        self.names_continue = None;
        let pending = std::mem::take(&mut self.pending);

        match tok.text {
            "(" => {
                self.parens += 1;
                match pending {
                    Pending::Receiver => self.receiver = Some(self.parens),
                    Pending::Group => self.groups.push((self.parens, self.braces)),
                    _ => {}
                }
            }
            ")" => {
                if self.receiver == Some(self.parens) {
                    self.receiver = None;
                    self.expect = Some(DeclKind::Method);
                }
                if self.groups.last() == Some(&(self.parens, self.braces)) {
                    self.groups.pop();
                }
                self.parens = self.parens.saturating_sub(1);
            }
            "{" => {
                self.braces += 1;
                if pending == Pending::Body {
                    self.bodies.push(self.braces);
                }
            }
            "}" => {
                if self.bodies.last() == Some(&self.braces) {
                    self.bodies.pop();
                }
                self.braces = self.braces.saturating_sub(1);
            }
            ":" => self.in_case = false,
            _ => {}
        }
    }

    fn other(&mut self) {
        self.expect = None;
        self.names_continue = None;
        self.pending = Pending::Nothing;
    }

    fn identifier(&mut self, toks: &[Tok<'_>], i: usize) -> Site {
        let tok = &toks[i];
        let prev = i.checked_sub(1).map(|p| toks[p]);
        let next = toks.get(i + 1).copied();
        self.names_continue = None;
        self.pending = Pending::Nothing;

        let ellipsis = i >= 2 && toks[i - 2].is(".");
        if prev.is_some_and(|p| p.is(".")) && !ellipsis {
            self.expect = None;
            return Site::Selected {
                qualifier: qualifier_of(toks, i),
            };
        }

        if self.receiver.is_some() {
            return declared(DeclKind::Receiver);
        }

        if let Some(kind) = self.expect.take() {
            self.continue_names(kind, next);
            return declared(kind);
        }

        let starts_line =
            tok.line_start || prev.is_some_and(|p| p.is(";") || p.is("(") || p.is("{"));

        if let Some(&(parens, braces)) = self.groups.last() {
            let continued = prev.is_some_and(|p| continues_expression(&p));
            if parens == self.parens && braces == self.braces && starts_line && !continued {
                let kind = if braces == 0 {
                    DeclKind::PackageLevel
                } else {
                    DeclKind::Local
                };
                self.continue_names(kind, next);
                return declared(kind);
            }
        }

        if self.bodies.last() == Some(&self.braces) && starts_line {
            let names_field = next.is_some_and(|n| {
                !n.line_start
                    && n.kind != SpanKind::StringLiteral
                    && !n.is(".")
                    && !n.is(";")
                    && !n.is("}")
            });
            if names_field {
                self.continue_names(DeclKind::Field, next);
                return declared(DeclKind::Field);
            }
        }

        let keyed = !self.in_case
            && self.braces > 0
            && next.is_some_and(|n| n.is(":"))
            && !is_define(toks, i + 1)
            && prev.is_some_and(|p| p.is("{") || p.is(","));
        if keyed {
            return declared(DeclKind::Key);
        }

        if short_var_decl(toks, i) {
            return declared(DeclKind::Local);
        }

        Site::Reference
    }

    fn continue_names(&mut self, kind: DeclKind, next: Option<Tok<'_>>) {
        if next.is_some_and(|n| n.is(",")) {
            self.names_continue = Some(kind);
        }
    }
}

fn declared(kind: DeclKind) -> Site {
    Site::Declaration { kind }
}

fn qualifier_of(toks: &[Tok<'_>], i: usize) -> Option<(usize, usize)> {
    let q = toks.get(i.checked_sub(2)?)?;
    let chained = i >= 3 && toks[i - 3].is(".");
    (q.is_ident() && !chained).then_some((q.start, q.end))
}

/// `:` immediately followed by `=` at token `j`.
fn is_define(toks: &[Tok<'_>], j: usize) -> bool {
    match (toks.get(j), toks.get(j + 1)) {
        (Some(colon), Some(eq)) => colon.is(":") && eq.is("=") && eq.start == colon.end,
        _ => false,
    }
}

fn short_var_decl(toks: &[Tok<'_>], i: usize) -> bool {
    let mut j = i + 1;
    while toks.get(j).is_some_and(|t| t.is(",")) && toks.get(j + 1).is_some_and(|t| t.is_ident()) {
        j += 2;
    }
    is_define(toks, j)
}

/// Classify every non-keyword identifier span of a scanned unit.
pub fn classify(src: &str, spans: &[TextSpan]) -> Vec<IdentSite> {
    let toks = significant(src, spans);
    let mut state = State::default();
    let mut sites = Vec::new();

    for (i, tok) in toks.iter().enumerate() {
        match tok.kind {
            SpanKind::Identifier if is_keyword(tok.text) => state.keyword(&toks, i),
            SpanKind::Identifier => {
                let site = state.identifier(&toks, i);
                sites.push(IdentSite {
                    start: tok.start,
                    end: tok.end,
                    site,
                });
            }
            SpanKind::Other => state.punct(tok),
            _ => state.other(),
        }
    }

    sites
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn sites_of(src: &str) -> Vec<(String, Site)> {
        let spans = scan(src).unwrap();
        classify(src, &spans)
            .into_iter()
            .map(|s| (s.text(src).to_string(), s.site))
            .collect()
    }

    fn site(src: &str, name: &str, nth: usize) -> Site {
        sites_of(src)
            .into_iter()
            .filter(|(t, _)| t == name)
            .nth(nth)
            .map(|(_, s)| s)
            .unwrap_or_else(|| panic!("no occurrence {} of {}", nth, name))
    }

    #[test]
    fn call_is_reference() {
        let src = "package cli; func Bar(){ NewOutputWriter() }";
        assert_eq!(site(src, "NewOutputWriter", 0), Site::Reference);
        assert_eq!(site(src, "Bar", 0), declared(DeclKind::PackageLevel));
    }

    #[test]
    fn method_declaration_and_receiver() {
        let src = "package drive\n\nfunc (w *OutputWriter) NewOutputWriter() *OutputWriter {\n\treturn NewOutputWriter()\n}\n";
        assert_eq!(site(src, "w", 0), declared(DeclKind::Receiver));
        assert_eq!(site(src, "OutputWriter", 0), declared(DeclKind::Receiver));
        assert_eq!(site(src, "NewOutputWriter", 0), declared(DeclKind::Method));
        assert_eq!(site(src, "OutputWriter", 1), Site::Reference);
        assert_eq!(site(src, "NewOutputWriter", 1), Site::Reference);
    }

    #[test]
    fn parameter_types_after_receiver_are_references() {
        let src = "package drive\nfunc (cmd *FilesCmd) Run(globals *Globals) error { return nil }\n";
        assert_eq!(site(src, "Run", 0), declared(DeclKind::Method));
        assert_eq!(site(src, "Globals", 0), Site::Reference);
    }

    #[test]
    fn function_literal_params_are_not_receivers() {
        let src = "package drive\nvar hook = func(g *Globals) {}\nfunc f() { run(func(g *Globals) {}) }\n";
        assert_eq!(site(src, "Globals", 0), Site::Reference);
        assert_eq!(site(src, "Globals", 1), Site::Reference);
    }

    #[test]
    fn selectors_record_their_qualifier() {
        let src = "package drive\nfunc f() { base.NewOutputWriter(); a.b.Truncate() }\n";
        let spans = scan(src).unwrap();
        let sites = classify(src, &spans);
        let now = sites.iter().find(|s| s.text(src) == "NewOutputWriter").unwrap();
        match now.site {
            Site::Selected {
                qualifier: Some((s, e)),
            } => assert_eq!(&src[s..e], "base"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            site(src, "Truncate", 0),
            Site::Selected { qualifier: None }
        );
    }

    #[test]
    fn variadic_parameter_type_is_reference() {
        let src = "package drive\nfunc f(opts ...ResolveOption) {}\n";
        assert_eq!(site(src, "ResolveOption", 0), Site::Reference);
    }

    #[test]
    fn grouped_declarations() {
        let src = "package cli\n\nconst (\n\toauthClientSource = iota\n\toauthClientSourceEnv\n\ta, b = 1, oauthClientSource\n)\n";
        assert_eq!(site(src, "oauthClientSource", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "oauthClientSourceEnv", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "a", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "b", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "oauthClientSource", 1), Site::Reference);
    }

    #[test]
    fn continued_value_in_group_is_reference() {
        let src = "package cli\n\nconst (\n\ta = 1 +\n\t\tResolve\n\tb =\n\t\tResolveOptions\n\tc\n)\n";
        assert_eq!(site(src, "a", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "Resolve", 0), Site::Reference);
        assert_eq!(site(src, "b", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "ResolveOptions", 0), Site::Reference);
        assert_eq!(site(src, "c", 0), declared(DeclKind::PackageLevel));
    }

    #[test]
    fn struct_fields_and_embedded_types() {
        let src = "package drive\n\ntype Cmd struct {\n\tGlobals *Globals\n\tOutputWriter\n\tName, Alias string `json:\"name\"`\n}\n";
        assert_eq!(site(src, "Cmd", 0), declared(DeclKind::PackageLevel));
        assert_eq!(site(src, "Globals", 0), declared(DeclKind::Field));
        assert_eq!(site(src, "Globals", 1), Site::Reference);
        assert_eq!(site(src, "OutputWriter", 0), Site::Reference);
        assert_eq!(site(src, "Name", 0), declared(DeclKind::Field));
        assert_eq!(site(src, "Alias", 0), declared(DeclKind::Field));
    }

    #[test]
    fn interface_methods_are_fields() {
        let src = "package drive\ntype Runner interface {\n\tRun(g *Globals) error\n\tio.Closer\n}\n";
        assert_eq!(site(src, "Run", 0), declared(DeclKind::Field));
        assert_eq!(site(src, "Globals", 0), Site::Reference);
    }

    #[test]
    fn composite_keys_and_case_labels() {
        let src = "package drive\nfunc f(s int) {\n\to := Options{Resolve: NewResolver()}\n\tswitch s {\n\tcase oauthClientSourceEnv, oauthClientSourceFlags:\n\t}\n}\n";
        assert_eq!(site(src, "o", 0), declared(DeclKind::Local));
        assert_eq!(site(src, "Resolve", 0), declared(DeclKind::Key));
        assert_eq!(site(src, "NewResolver", 0), Site::Reference);
        assert_eq!(site(src, "oauthClientSourceEnv", 0), Site::Reference);
        assert_eq!(site(src, "oauthClientSourceFlags", 0), Site::Reference);
    }

    #[test]
    fn short_variable_declarations() {
        let src = "package drive\nfunc f() {\n\tw, err := NewOutputWriter()\n\tfor _, v := range items {}\n}\n";
        assert_eq!(site(src, "w", 0), declared(DeclKind::Local));
        assert_eq!(site(src, "err", 0), declared(DeclKind::Local));
        assert_eq!(site(src, "v", 0), declared(DeclKind::Local));
        assert_eq!(site(src, "NewOutputWriter", 0), Site::Reference);
        assert_eq!(site(src, "items", 0), Site::Reference);
    }

    #[test]
    fn type_switch_keyword_is_harmless() {
        let src = "package drive\nfunc f(x any) {\n\tswitch x.(type) {\n\tcase *Globals:\n\t}\n}\n";
        assert_eq!(site(src, "Globals", 0), Site::Reference);
    }

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("NewOutputWriter"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("func"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
