// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Host wildcard matching for directory enumeration.
//!
//! Names are compared case-insensitively with the expression rules of
//! the host platform:
//!
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `<` matches any run of characters that does not reach past the
//!   final `.` of the name
//! - `>` matches any single character, or nothing at a `.` or at the
//!   end of the name
//! - `"` matches a `.`, or nothing at the end of the name

#[cfg(test)]
#[path = "./pattern_test.rs"]
mod pattern_test;

const STAR: char = '*';
const QUESTION: char = '?';
const DOS_STAR: char = '<';
const DOS_QM: char = '>';
const DOS_DOT: char = '"';

/// A compiled, case-folded wildcard expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    expression: Option<Vec<char>>,
}

impl Pattern {
    /// Compile a host expression. An empty expression or a single
    /// `*` matches every name.
    pub fn new<S: AsRef<str>>(expression: S) -> Self {
        let expression = expression.as_ref();
        if expression.is_empty() || expression == "*" {
            return Self { expression: None };
        }
        Self {
            expression: Some(fold(expression)),
        }
    }

    pub fn matches_all(&self) -> bool {
        self.expression.is_none()
    }

    pub fn matches<S: AsRef<str>>(&self, name: S) -> bool {
        match &self.expression {
            None => true,
            Some(expression) => match_from(expression, &fold(name.as_ref())),
        }
    }
}

/// Test a single name against a host expression
pub fn is_match<P: AsRef<str>, N: AsRef<str>>(pattern: P, name: N) -> bool {
    Pattern::new(pattern).matches(name)
}

fn fold(value: &str) -> Vec<char> {
    value.chars().flat_map(char::to_lowercase).collect()
}

/// Match by filling in, from the end of the pattern backwards,
/// which suffixes of the name each suffix of the pattern accepts.
fn match_from(pattern: &[char], name: &[char]) -> bool {
    let end = name.len();
    let last_dot = name.iter().rposition(|c| *c == '.');
    // `next[j]` is whether the remaining pattern matches `name[j..]`
    let mut next: Vec<bool> = (0..=end).map(|j| j == end).collect();
    let mut current = vec![false; end + 1];
    for &token in pattern.iter().rev() {
        for j in (0..=end).rev() {
            let first = name.get(j);
            current[j] = match token {
                STAR => next[j] || (first.is_some() && current[j + 1]),
                DOS_STAR => {
                    let limit = match last_dot {
                        Some(dot) if dot >= j => dot,
                        _ => end,
                    };
                    next[j] || (j < limit && current[j + 1])
                }
                QUESTION => first.is_some() && next[j + 1],
                DOS_QM => match first {
                    Some(c) if *c != '.' => next[j + 1],
                    _ => next[j],
                },
                DOS_DOT => match first {
                    Some('.') => next[j + 1],
                    None => next[j],
                    Some(_) => false,
                },
                literal => first == Some(&literal) && next[j + 1],
            };
        }
        std::mem::swap(&mut next, &mut current);
    }
    next[0]
}
