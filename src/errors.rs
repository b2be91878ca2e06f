/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::fmt;
use thiserror::Error;

/// A position in the source text. Rows are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub row: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error("Lexical Error: {reason}")]
    LexicalError {
        location: Location,
        width: usize,
        reason: String,
    },

    #[error("Syntax Error: {reason}")]
    SyntaxError {
        location: Location,
        width: usize,
        reason: String,
    },

    #[error("Semantic Error: {reason}")]
    SemanticError {
        location: Location,
        width: usize,
        reason: String,
    },

    #[error("Internal Compiler Error: {reason}")]
    InternalError { reason: String },
}

impl AssemblyError {
    /// The source position and underline width of the offending span, if
    /// the error points at one (internal errors do not).
    pub fn span(&self) -> Option<(Location, usize)> {
        match self {
            AssemblyError::LexicalError {
                location, width, ..
            }
            | AssemblyError::SyntaxError {
                location, width, ..
            }
            | AssemblyError::SemanticError {
                location, width, ..
            } => Some((*location, (*width).max(1))),
            AssemblyError::InternalError { .. } => None,
        }
    }
}

/// Render an error against its source text: a header line with the file
/// name (or `<string>` when the source did not come from a file), the
/// offending line with two lines of context on either side, and a `^~~~`
/// underline spanning the offending token.
pub fn render_diagnostic(error: &AssemblyError, source: &str, filename: Option<&str>) -> String {
    let name = filename.unwrap_or("<string>");

    let Some((location, width)) = error.span() else {
        return format!("{}: {}", name, error);
    };

    let mut out = format!("{}:{}:{}: {}\n", name, location.row, location.column, error);

    let lines: Vec<&str> = source.lines().collect();
    let first = location.row.saturating_sub(2).max(1);
    let last = (location.row + 2).min(lines.len().max(1));

    for row in first..=last {
        let Some(line) = lines.get(row - 1) else {
            continue;
        };
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
        if row == location.row {
            out.push_str("  ");
            out.push_str(&" ".repeat(location.column));
            out.push('^');
            out.push_str(&"~".repeat(width - 1));
            out.push('\n');
        }
    }

    out
}
