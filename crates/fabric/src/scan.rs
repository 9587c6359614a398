//! Identifier-level scanning of shading-language text.
//!
//! This is not a parser: it splits text into identifiers while
//! skipping comments and numeric literals, which is all the validator and the
//! composer need to find references, rewrite names, and spot
//! `uniform <type> <name>;` declarations.
use std::collections::HashMap;
use std::ops::Range;

/// One identifier occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// The character right before the identifier is `.`.
    pub after_period: bool,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Iterates the identifiers of `source`, skipping `//` and `/* */` comments
/// and numeric literals such as `1.0e5` or `0x1Fu`.
pub fn identifiers(source: &str) -> Identifiers<'_> {
    Identifiers { source, pos: 0 }
}

pub struct Identifiers<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Iterator for Identifiers<'a> {
    type Item = Ident<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b == b'/' && bytes.get(self.pos + 1) == Some(&b'/') {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else if b == b'/' && bytes.get(self.pos + 1) == Some(&b'*') {
                self.pos += 2;
                while self.pos < bytes.len()
                    && !(bytes[self.pos] == b'*' && bytes.get(self.pos + 1) == Some(&b'/'))
                {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(bytes.len());
            } else if b.is_ascii_digit() {
                while self.pos < bytes.len()
                    && (is_ident_continue(bytes[self.pos]) || bytes[self.pos] == b'.')
                {
                    self.pos += 1;
                }
            } else if is_ident_start(b) {
                let start = self.pos;
                while self.pos < bytes.len() && is_ident_continue(bytes[self.pos]) {
                    self.pos += 1;
                }
                return Some(Ident {
                    text: &self.source[start..self.pos],
                    start,
                    end: self.pos,
                    after_period: start > 0 && bytes[start - 1] == b'.',
                });
            } else {
                self.pos += 1;
            }
        }
        None
    }
}

/// Counts references to `name`. Occurrences right after a `.` (member
/// accesses such as `color.name`) only count when `include_members` is set.
pub fn count_references(source: &str, name: &str, include_members: bool) -> usize {
    identifiers(source)
        .filter(|ident| ident.text == name && (include_members || !ident.after_period))
        .count()
}

/// A replacement applied by [`rewrite`].
#[derive(Debug, Clone)]
pub struct Replacement {
    pub text: String,
    /// Also replace occurrences right after a `.`.
    pub include_members: bool,
}

/// Rewrites every identifier found in `replacements` in a single pass, so
/// replacement text is never rescanned.
pub fn rewrite(source: &str, replacements: &HashMap<String, Replacement>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for ident in identifiers(source) {
        let Some(replacement) = replacements.get(ident.text) else {
            continue;
        };
        if ident.after_period && !replacement.include_members {
            continue;
        }
        out.push_str(&source[cursor..ident.start]);
        out.push_str(&replacement.text);
        cursor = ident.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// `base.member` accesses, with `base` not itself a member.
pub fn member_accesses(source: &str) -> Vec<(&str, &str)> {
    let mut accesses = Vec::new();
    let mut previous: Option<Ident<'_>> = None;
    for ident in identifiers(source) {
        if let Some(base) = previous {
            if ident.after_period && ident.start == base.end + 1 && !base.after_period {
                accesses.push((base.text, ident.text));
            }
        }
        previous = Some(ident);
    }
    accesses
}

/// `uniform [precision] <type> <name>;` found in raw source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration<'a> {
    pub type_name: &'a str,
    pub name: &'a str,
    /// Byte range from `uniform` through the terminating `;`.
    pub span: Range<usize>,
}

const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Finds single-name uniform declarations. Whitespace between tokens may be
/// any mix of spaces, tabs, and `\r\n`/`\n` line breaks.
pub fn uniform_declarations(source: &str) -> Vec<Declaration<'_>> {
    let tokens: Vec<Ident<'_>> = identifiers(source).collect();
    let only_space = |range: Range<usize>| source[range].bytes().all(|b| b.is_ascii_whitespace());

    let mut declarations = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let keyword = tokens[i];
        if keyword.text != "uniform" || keyword.after_period {
            i += 1;
            continue;
        }
        let mut next = i + 1;
        if let Some(token) = tokens.get(next) {
            if PRECISIONS.contains(&token.text) && only_space(keyword.end..token.start) {
                next += 1;
            }
        }
        let (Some(ty), Some(name)) = (tokens.get(next), tokens.get(next + 1)) else {
            break;
        };
        let previous_end = tokens[next - 1].end;
        if !only_space(previous_end..ty.start) || !only_space(ty.end..name.start) {
            i += 1;
            continue;
        }
        let rest = &source[name.end..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with(';') {
            let semicolon = name.end + (rest.len() - trimmed.len());
            declarations.push(Declaration {
                type_name: ty.text,
                name: name.text,
                span: keyword.start..semicolon + 1,
            });
            i = next + 2;
        } else {
            i += 1;
        }
    }
    declarations
}

/// Removes the given byte ranges (sorted, non-overlapping) from `source`.
pub fn remove_spans(source: &str, spans: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&source[cursor..span.start]);
        cursor = span.end;
    }
    out.push_str(&source[cursor..]);
    out
}
