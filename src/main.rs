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

use anyhow::Result;
use clap::Parser as clap_parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// SPARC assembly source file
    input: PathBuf,
}

fn run(opts: &Opts) -> Result<String> {
    sparcopt::optimize_file(&opts.input)
}

fn main() -> ExitCode {
    let opts: Opts = Opts::parse();

    match run(&opts) {
        Ok(optimized) => {
            print!("{}", optimized);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::from(1)
        }
    }
}
