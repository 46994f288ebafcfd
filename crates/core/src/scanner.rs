//! Lexical scanner for Go source units.
//!
//! Produces an ordered list of [`TextSpan`]s that covers the whole text with
//! no gaps and no overlaps. Only as much of the grammar is recognised as the
//! rewrite stages need: the package clause, the import region, literals,
//! comments and identifiers. Everything else is [`SpanKind::Other`].

use serde::Serialize;

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// `package <name>`
    PackageClause,
    /// One or more consecutive `import` declarations, single-line or grouped.
    ImportBlock,
    /// Interpreted, raw and rune literals (quotes included).
    StringLiteral,
    /// Line and block comments.
    Comment,
    /// Identifiers and keywords. Keywords are never mapping symbols.
    Identifier,
    /// Whitespace, punctuation and numeric literals.
    Other,
}

/// A classified byte range of a unit's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    pub fn is_whitespace(&self, src: &str) -> bool {
        self.kind == SpanKind::Other && self.text(src).trim().is_empty()
    }
}

/// Raw token kinds. Whitespace, numbers and punctuation all surface as
/// [`SpanKind::Other`] once grouped into spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Str,
    Comment,
    Space,
    Number,
    Punct,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }

    fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Space | TokenKind::Comment)
    }

    fn is_punct(&self, src: &str, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(src) == p
    }

    fn is_word(&self, src: &str, w: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(src) == w
    }

    fn span_kind(&self) -> SpanKind {
        match self.kind {
            TokenKind::Ident => SpanKind::Identifier,
            TokenKind::Str => SpanKind::StringLiteral,
            TokenKind::Comment => SpanKind::Comment,
            TokenKind::Space | TokenKind::Number | TokenKind::Punct => SpanKind::Other,
        }
    }
}

/// 1-based line number of a byte offset.
pub fn line_of(src: &str, offset: usize) -> usize {
    src[..offset.min(src.len())].matches('\n').count() + 1
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Consume a quoted literal whose opening quote is at the cursor.
    fn quoted(&mut self, quote: char, what: &'static str) -> Result<(), ScanError> {
        let start = self.pos;
        self.bump();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(ScanError::Unterminated {
                        what,
                        line: line_of(self.src, start),
                    })
                }
                Some('\\') => {
                    if self.bump().is_none() {
                        return Err(ScanError::Unterminated {
                            what,
                            line: line_of(self.src, start),
                        });
                    }
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn number(&mut self) {
        let hex = self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X'));
        let mut last = self.bump().unwrap_or('0');
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && if hex {
                    matches!(last, 'p' | 'P')
                } else {
                    matches!(last, 'e' | 'E')
                };
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                self.bump();
                last = c;
            } else {
                break;
            }
        }
    }
}

/// Split `src` into raw tokens. Offsets are relative to `src`.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ScanError> {
    let mut tokens = Vec::new();
    let mut cur = Cursor { src, pos: 0 };

    while let Some(c) = cur.peek() {
        let start = cur.pos;
        let second = cur.peek_second();

        let kind = if c == '/' && second == Some('/') {
            cur.eat_while(|c| c != '\n');
            TokenKind::Comment
        } else if c == '/' && second == Some('*') {
            match src[start + 2..].find("*/") {
                Some(off) => cur.pos = start + 2 + off + 2,
                None => {
                    return Err(ScanError::Unterminated {
                        what: "block comment",
                        line: line_of(src, start),
                    })
                }
            }
            TokenKind::Comment
        } else if c.is_whitespace() {
            cur.eat_while(char::is_whitespace);
            TokenKind::Space
        } else if c == '"' {
            cur.quoted('"', "string literal")?;
            TokenKind::Str
        } else if c == '\'' {
            cur.quoted('\'', "rune literal")?;
            TokenKind::Str
        } else if c == '`' {
            match src[start + 1..].find('`') {
                Some(off) => cur.pos = start + 1 + off + 1,
                None => {
                    return Err(ScanError::Unterminated {
                        what: "raw string literal",
                        line: line_of(src, start),
                    })
                }
            }
            TokenKind::Str
        } else if c.is_alphabetic() || c == '_' {
            cur.eat_while(|c| c.is_alphanumeric() || c == '_');
            TokenKind::Ident
        } else if c.is_ascii_digit() || (c == '.' && second.is_some_and(|d| d.is_ascii_digit())) {
            cur.number();
            TokenKind::Number
        } else {
            cur.bump();
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            start,
            end: cur.pos,
        });
    }

    Ok(tokens)
}

fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| tokens[i].is_significant())
}

/// Like [`next_significant`], also skipping explicit `;` separators.
fn next_declaration(src: &str, tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| tokens[i].is_significant() && !tokens[i].is_punct(src, ";"))
}

/// Locate the package clause: the first significant token must be the
/// `package` keyword followed by the package name. Returns the token
/// indices of the keyword and the name.
fn package_clause(src: &str, tokens: &[Token]) -> Result<(usize, usize), ScanError> {
    let kw = next_significant(tokens, 0).ok_or(ScanError::MissingPackageClause)?;
    if !tokens[kw].is_word(src, "package") {
        return Err(ScanError::MissingPackageClause);
    }
    let name = next_significant(tokens, kw + 1).ok_or(ScanError::MissingPackageClause)?;
    if tokens[name].kind != TokenKind::Ident {
        return Err(ScanError::MissingPackageClause);
    }
    Ok((kw, name))
}

/// Locate the import region starting at token `from`. Returns the token
/// indices of the first `import` keyword and of the last token of the final
/// consecutive import declaration.
fn import_region(
    src: &str,
    tokens: &[Token],
    from: usize,
) -> Result<Option<(usize, usize)>, ScanError> {
    let mut first = None;
    let mut last = None;
    let mut cursor = from;

    while let Some(kw) = next_declaration(src, tokens, cursor) {
        if !tokens[kw].is_word(src, "import") {
            break;
        }
        let malformed = || ScanError::MalformedImport {
            line: line_of(src, tokens[kw].start),
        };
        let head = next_significant(tokens, kw + 1).ok_or_else(malformed)?;

        let end = if tokens[head].is_punct(src, "(") {
            (head + 1..tokens.len())
                .find(|&i| tokens[i].is_punct(src, ")"))
                .ok_or_else(malformed)?
        } else {
            let mut spec = head;
            if tokens[spec].kind == TokenKind::Ident || tokens[spec].is_punct(src, ".") {
                spec = next_significant(tokens, spec + 1).ok_or_else(malformed)?;
            }
            if tokens[spec].kind != TokenKind::Str {
                return Err(malformed());
            }
            spec
        };

        first.get_or_insert(kw);
        last = Some(end);
        cursor = end + 1;
    }

    Ok(first.zip(last))
}

/// Classify `src` into contiguous, non-overlapping spans.
pub fn scan(src: &str) -> Result<Vec<TextSpan>, ScanError> {
    let tokens = tokenize(src)?;
    let (kw, name) = package_clause(src, &tokens)?;
    let imports = import_region(src, &tokens, name + 1)?;

    let mut spans = Vec::with_capacity(tokens.len());
    let push_tokens = |spans: &mut Vec<TextSpan>, range: std::ops::Range<usize>| {
        spans.extend(tokens[range].iter().map(|t| TextSpan {
            kind: t.span_kind(),
            start: t.start,
            end: t.end,
        }));
    };

    push_tokens(&mut spans, 0..kw);
    spans.push(TextSpan {
        kind: SpanKind::PackageClause,
        start: tokens[kw].start,
        end: tokens[name].end,
    });

    let rest = match imports {
        Some((first, last)) => {
            push_tokens(&mut spans, name + 1..first);
            spans.push(TextSpan {
                kind: SpanKind::ImportBlock,
                start: tokens[first].start,
                end: tokens[last].end,
            });
            last + 1
        }
        None => name + 1,
    };
    push_tokens(&mut spans, rest..tokens.len());

    Ok(spans)
}
