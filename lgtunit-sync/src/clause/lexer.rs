// Copyright (c) The lgtunit-sync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Character-level scanning of Logtalk source that skips quoted text.

use std::{iter::Peekable, str::CharIndices};

/// Iterates over the characters of `text` that are code: quoted atoms, strings, back-quoted
/// text and `0'c` character literals are skipped.
///
/// Yields byte offsets into `text`.
pub(super) fn code_chars(text: &str) -> CodeChars<'_> {
    CodeChars {
        chars: text.char_indices().peekable(),
    }
}

pub(super) struct CodeChars<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl CodeChars<'_> {
    fn skip_quoted(&mut self, quote: char) {
        while let Some((_, c)) = self.chars.next() {
            if c == '\\' {
                self.chars.next();
            } else if c == quote {
                // A doubled quote stands for itself.
                if self.chars.next_if(|&(_, next)| next == quote).is_none() {
                    return;
                }
            }
        }
    }

    fn skip_char_literal(&mut self) {
        match self.chars.next() {
            Some((_, '\\')) => {
                self.chars.next();
            }
            Some((_, '\'')) => {
                self.chars.next_if(|&(_, next)| next == '\'');
            }
            _ => {}
        }
    }
}

impl Iterator for CodeChars<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (idx, c) = self.chars.next()?;
            match c {
                '\'' | '"' | '`' => self.skip_quoted(c),
                '0' if self.chars.next_if(|&(_, next)| next == '\'').is_some() => {
                    self.skip_char_literal();
                    return Some((idx, c));
                }
                _ => return Some((idx, c)),
            }
        }
    }
}

/// Returns `line` up to its `%` comment, if any.
pub(crate) fn strip_line_comment(line: &str) -> &str {
    code_chars(line)
        .find(|&(_, c)| c == '%')
        .map_or(line, |(idx, _)| &line[..idx])
}

/// A clause neck.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Neck {
    /// `:-`
    Rule,
    /// `-->`
    GrammarRule,
}

/// Finds the first `:-` or `-->` outside brackets and quotes, returning its offset.
pub(super) fn find_neck(text: &str) -> Option<(usize, Neck)> {
    let mut depth = 0usize;
    for (idx, c) in code_chars(text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && text[idx..].starts_with(":-") => return Some((idx, Neck::Rule)),
            '-' if depth == 0 && text[idx..].starts_with("-->") => {
                return Some((idx, Neck::GrammarRule));
            }
            _ => {}
        }
    }
    None
}

/// Finds the first occurrence of `pattern` outside brackets and quotes.
pub(super) fn find_at_top_level(text: &str, pattern: &str) -> Option<usize> {
    let mut depth = 0usize;
    let first = pattern.chars().next()?;
    for (idx, c) in code_chars(text) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == first && depth == 0 && text[idx..].starts_with(pattern) => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Returns the first argument of a compound term, given the text after its opening `(`.
///
/// Returns `None` if the argument list isn't closed on this text.
pub(crate) fn first_argument(args: &str) -> Option<&str> {
    let mut depth = 0usize;
    for (idx, c) in code_chars(args) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth == 0 => return Some(args[..idx].trim()),
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => return Some(args[..idx].trim()),
            _ => {}
        }
    }
    None
}

const SYMBOL_CHARS: &str = "#$&*+-./:<=>?@^~\\";

/// Returns true if `code` ends with a clause-terminating full stop.
///
/// A `.` that is part of a symbolic operator such as `=..` doesn't count.
pub(crate) fn ends_with_full_stop(code: &str) -> bool {
    let code = code.trim_end();
    let Some(before) = code.strip_suffix('.') else {
        return false;
    };
    if before.ends_with(|c| SYMBOL_CHARS.contains(c)) {
        return false;
    }
    // The final `.` must be code, not the inside of an unterminated quote.
    code_chars(code).last().map(|(idx, _)| idx) == Some(code.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("foo(X) :- bar(X).", "foo(X) :- bar(X)."; "no comment")]
    #[test_case("foo(X). % trailing", "foo(X). "; "trailing comment")]
    #[test_case("foo('100%'). % c", "foo('100%'). "; "percent in quotes")]
    #[test_case("foo(0'%). % c", "foo(0'%). "; "percent char literal")]
    #[test_case("% whole line", ""; "comment line")]
    fn strip_comments(input: &str, expected: &str) {
        assert_eq!(strip_line_comment(input), expected);
    }

    #[test_case("foo(X) :- bar", Some((7, Neck::Rule)); "rule")]
    #[test_case("greeting --> [hello]", Some((9, Neck::GrammarRule)); "grammar rule")]
    #[test_case("foo((a :- b))", None; "neck inside brackets")]
    #[test_case("foo(':-') :- x", Some((10, Neck::Rule)); "neck inside quotes")]
    fn necks(input: &str, expected: Option<(usize, Neck)>) {
        assert_eq!(find_neck(input), expected);
    }

    #[test_case("foo) :- true.", Some("foo"); "single argument")]
    #[test_case("tests, extends(lgtunit)).", Some("tests"); "first of several")]
    #[test_case("tests(_X, [a, b]), extends(lgtunit)).", Some("tests(_X, [a, b])"); "compound")]
    #[test_case("'a, b') :- true.", Some("'a, b'"); "quoted comma")]
    #[test_case("tests,", Some("tests"); "continued on next line")]
    #[test_case("tests(", None; "unclosed")]
    fn first_arguments(input: &str, expected: Option<&str>) {
        assert_eq!(first_argument(input), expected);
    }

    #[test_case("foo(a).", true; "fact")]
    #[test_case("  true.  ", true; "trailing whitespace")]
    #[test_case("X =..", false; "univ operator")]
    #[test_case("foo('a.", false; "unterminated quote")]
    #[test_case("foo(a)", false; "no stop")]
    fn full_stops(input: &str, expected: bool) {
        assert_eq!(ends_with_full_stop(input), expected);
    }
}
