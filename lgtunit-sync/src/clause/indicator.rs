// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    SourceText,
    lexer::{Neck, code_chars, ends_with_full_stop, find_at_top_level, find_neck, strip_line_comment},
};
use std::fmt;

/// Whether an indicator names a predicate or a grammar rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IndicatorKind {
    /// `Name/Arity`
    Predicate,

    /// `Name//Arity`
    NonTerminal,
}

/// The predicate or grammar rule a clause belongs to.
///
/// Two clauses belong to the same predicate only if their entity qualifiers match too: a
/// multifile clause `other::foo(X)` is not a clause of a local `foo/1`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClauseIndicator {
    /// The entity qualifier of a multifile clause, as written.
    pub entity: Option<String>,

    /// The predicate or non-terminal name, unquoted.
    pub name: String,

    /// The number of arguments.
    pub arity: usize,

    /// Predicate or grammar rule.
    pub kind: IndicatorKind,
}

impl ClauseIndicator {
    /// Resolves the indicator of the clause whose head starts at the 0-based `line`.
    ///
    /// Lines are read until the head is terminated by `:-`, `-->` or a full stop. Returns `None`
    /// for directives, unbalanced heads and anything else that isn't a clause head.
    pub fn resolve(source: &SourceText<'_>, line: u32) -> Option<Self> {
        let mut text = String::new();
        for line in line..source.line_count() {
            let code = strip_line_comment(source.line(line)?).trim();
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(code);

            if let Some((idx, neck)) = find_neck(&text) {
                let kind = match neck {
                    Neck::Rule => IndicatorKind::Predicate,
                    Neck::GrammarRule => IndicatorKind::NonTerminal,
                };
                return Self::parse_head(&text[..idx], kind);
            }
            if ends_with_full_stop(&text) {
                let head = text.trim_end();
                return Self::parse_head(&head[..head.len() - 1], IndicatorKind::Predicate);
            }
        }
        None
    }

    /// Parses a clause head, without its neck or full stop.
    pub fn parse_head(head: &str, kind: IndicatorKind) -> Option<Self> {
        let head = head.trim();
        let (entity, mut head) = match find_at_top_level(head, "::") {
            Some(idx) => {
                let entity = head[..idx].trim();
                if !is_entity(entity) {
                    return None;
                }
                (Some(entity.to_owned()), head[idx + 2..].trim_start())
            }
            None => (None, head),
        };
        if kind == IndicatorKind::NonTerminal {
            // Drop a pushback list: `Head, PushBack --> Body`.
            if let Some(idx) = find_at_top_level(head, ",") {
                head = head[..idx].trim_end();
            }
        }

        let (name, rest) = lex_atom(head)?;
        let (arity, rest) = count_arguments(rest)?;
        if !rest.trim().is_empty() {
            return None;
        }
        Some(Self {
            entity,
            name,
            arity,
            kind,
        })
    }
}

impl fmt::Display for ClauseIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.kind {
            IndicatorKind::Predicate => "/",
            IndicatorKind::NonTerminal => "//",
        };
        write!(f, "{}{sep}{}", self.name, self.arity)
    }
}

/// Lexes a leading atom, quoted or not. Returns the unquoted name and the rest of the text.
fn lex_atom(text: &str) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    match chars.next()? {
        (_, '\'') => {
            let mut name = String::new();
            let mut chars = chars.peekable();
            while let Some((idx, c)) = chars.next() {
                match c {
                    '\\' => name.push(chars.next()?.1),
                    '\'' if chars.next_if(|&(_, next)| next == '\'').is_some() => name.push('\''),
                    '\'' => return Some((name, &text[idx + 1..])),
                    c => name.push(c),
                }
            }
            None
        }
        (_, c) if c.is_lowercase() => {
            let end = text
                .char_indices()
                .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
                .map_or(text.len(), |(idx, _)| idx);
            Some((text[..end].to_owned(), &text[end..]))
        }
        _ => None,
    }
}

/// Returns true if `text` is an entity identifier: an atom with optional parameters.
fn is_entity(text: &str) -> bool {
    lex_atom(text)
        .and_then(|(_, rest)| count_arguments(rest))
        .is_some_and(|(_, rest)| rest.trim().is_empty())
}

/// Counts the arguments of a parenthesized list at the start of `text`, returning the count and
/// the text after the list.
///
/// Text that doesn't start with `(` has no arguments. Returns `None` if the brackets don't
/// balance.
fn count_arguments(text: &str) -> Option<(usize, &str)> {
    if !text.starts_with('(') {
        return Some((0, text));
    }

    let mut closers = Vec::new();
    let mut commas = 0;
    for (idx, c) in code_chars(text) {
        match c {
            '(' => closers.push(')'),
            '[' => closers.push(']'),
            '{' => closers.push('}'),
            ')' | ']' | '}' => {
                if closers.pop()? != c {
                    return None;
                }
                if closers.is_empty() {
                    if text[1..idx].trim().is_empty() {
                        return None;
                    }
                    return Some((commas + 1, &text[idx + 1..]));
                }
            }
            ',' if closers.len() == 1 => commas += 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn resolve(text: &str) -> Option<String> {
        ClauseIndicator::resolve(&SourceText::new(text), 0).map(|indicator| indicator.to_string())
    }

    #[test_case("foo.", "foo/0"; "bare atom")]
    #[test_case("foo(a, b, c).", "foo/3"; "fact")]
    #[test_case("foo(X) :- bar(X).", "foo/1"; "rule")]
    #[test_case("foo([a, b], {c, d}, (e, f)) :- true.", "foo/3"; "nested brackets")]
    #[test_case("'hello world'(X) :-\n\ttrue.", "hello world/1"; "quoted name")]
    #[test_case("'it''s'.", "it's/0"; "doubled quote in name")]
    #[test_case("foo(',', 'a(b').", "foo/2"; "brackets and commas in quotes")]
    #[test_case("foo(0',, X).", "foo/2"; "comma char literal")]
    #[test_case("greeting(X) --> [hello], name(X).", "greeting//1"; "grammar rule")]
    #[test_case("greeting, [x] --> [hello].", "greeting//0"; "grammar rule with pushback")]
    #[test_case("foo(\n\ta,\n\tb\n) :-\n\ttrue.", "foo/2"; "multi-line head")]
    #[test_case("foo(a, % first\n\tb).", "foo/2"; "comment inside head")]
    #[test_case("other::foo(X) :- true.", "foo/1"; "multifile")]
    #[test_case("obj(P)::foo(X, Y).", "foo/2"; "parametric multifile")]
    fn resolves(text: &str, expected: &str) {
        assert_eq!(resolve(text).as_deref(), Some(expected));
    }

    #[test_case(":- object(foo)."; "directive")]
    #[test_case("foo(a, b."; "unbalanced paren")]
    #[test_case("foo(a, [b) :- true."; "mismatched brackets")]
    #[test_case("foo(a)) :- true."; "extra closer")]
    #[test_case("foo(a), bar :- true."; "trailing text")]
    #[test_case("X :- true."; "variable head")]
    #[test_case("foo() :- true."; "empty arguments")]
    #[test_case("foo(a,"; "end of source")]
    fn unresolvable(text: &str) {
        assert_eq!(resolve(text), None);
    }

    #[test]
    fn multifile_entity_is_kept() {
        let indicator =
            ClauseIndicator::resolve(&SourceText::new("obj(P)::foo(X) :- true."), 0).unwrap();
        assert_eq!(indicator.entity.as_deref(), Some("obj(P)"));
        assert_ne!(
            Some(indicator),
            ClauseIndicator::resolve(&SourceText::new("foo(X) :- true."), 0)
        );
    }
}
