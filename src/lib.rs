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

pub mod ast;
pub mod errors;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod printer;
pub mod semantics;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use errors::AssemblyError;

/// Run the whole pipeline over one source string: tokenize, parse, resolve
/// labels, optimize, render.
pub fn optimize_source(source: &str) -> Result<String, AssemblyError> {
    let stream = lexer::tokenize(source)?;
    let mut unit = parser::parse(stream)?;
    parser::resolve_labels(&mut unit);
    optimizer::optimize(&mut unit)?;
    Ok(printer::render(&unit))
}

/// Read an assembly file and optimize it. Errors carry the rendered
/// diagnostic, underline and context lines included.
pub fn optimize_file(path: &Path) -> Result<String> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    optimize_source(&source).map_err(|error| {
        let filename = path.display().to_string();
        anyhow::anyhow!(errors::render_diagnostic(&error, &source, Some(&filename)))
    })
}
