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

use indoc::indoc;
use sparcopt::errors::AssemblyError;
use sparcopt::optimize_source;
use std::io::Write;

/// Output layout is not byte-stable across optimizations; compare with all
/// whitespace removed.
fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn assert_optimizes_to(source: &str, expected: &str) {
    let optimized = optimize_source(source).unwrap();
    assert_eq!(
        strip_whitespace(&optimized),
        strip_whitespace(expected),
        "full output was:\n{}",
        optimized
    );
}

#[test]
fn test_independent_instruction_moves_into_branch_delay_slot() {
    assert_optimizes_to(
        indoc! {"
            label1:
            \tmov 2, %l3
            \tset 0xFFFF, %l1
            \tcmp %l0, %l1
            \tbge label2
            \tnop
        "},
        indoc! {"
            label1:
            \tset 0xFFFF, %l1
            \tcmp %l0, %l1
            \tbge label2
            \tmov 2, %l3
        "},
    );
}

#[test]
fn test_filler_found_despite_call_argument_write() {
    assert_optimizes_to(
        indoc! {"
            label1:
            \tmov %l1, %o0
            \tmov 4, %o1
            \tcall .mul
            \tnop
        "},
        indoc! {"
            label1:
            \tmov %l1, %o0
            \tcall .mul
            \tmov 4, %o1
        "},
    );
}

#[test]
fn test_no_candidate_keeps_nop() {
    let source = indoc! {"
        label1:
        \tset 0xFFFF, %o0
        \tset 0xEEEE, %o1
        \tcall .mul
        \tnop
    "};
    assert_optimizes_to(source, source);
}

#[test]
fn test_no_reordering_across_label_boundary() {
    let source = indoc! {"
        label1:
        \tmov 9, %l0
        \tcmp %l0, %l1
        \tbne label2
        \tnop
        label2:
        \tmov 1, %l2
    "};
    assert_optimizes_to(source, source);
}

#[test]
fn test_branch_target_hoist_with_annul() {
    assert_optimizes_to(
        indoc! {"
            start:
            \tba L
            \tnop
            \tmov 1, %l0
            L:
            \tmov 2, %l3
            \tmov 3, %l4
        "},
        indoc! {"
            start:
            \tba,a L
            \tmov 2, %l3
            \tmov 1, %l0
            \tmov 2, %l3
            L:
            \tmov 3, %l4
        "},
    );
}

#[test]
fn test_gratuitous_nop_removal() {
    assert_optimizes_to(
        indoc! {"
            \tmov 1, %l0
            \tnop
            \tmov 2, %l1
        "},
        indoc! {"
            \tmov 1, %l0
            \tmov 2, %l1
        "},
    );
}

#[test]
fn test_comments_and_directives_survive() {
    assert_optimizes_to(
        indoc! {"
            ! multiply by four
            \t.section \".text\"
            \t.global main
            main:
            \tsave %sp, -96, %sp
            \tsll %i0, 2, %o0
            \tret
            \tnop
        "},
        indoc! {"
            ! multiply by four
            \t.section \".text\"
            \t.global main
            main:
            \tsave %sp, -96, %sp
            \tret
            \tsll %i0, 2, %o0
        "},
    );
}

#[test]
fn test_optimizer_is_idempotent_end_to_end() {
    let source = indoc! {"
        start:
        \tba L
        \tnop
        \tmov 1, %l0
        L:
        \tmov 2, %l3
        \tmov 3, %l4
        done:
        \tset 0xFFFF, %l1
        \tcmp %l0, %l1
        \tbge exit
        \tnop
    "};
    let once = optimize_source(source).unwrap();
    let twice = optimize_source(&once).unwrap();
    assert_eq!(strip_whitespace(&once), strip_whitespace(&twice));
}

#[test]
fn test_constants_round_trip() {
    let source = indoc! {"
        offset = 0x10
        \tmov offset, %l0
        \tnop
        \tmov 2, %l1
    "};
    let optimized = optimize_source(source).unwrap();
    let stripped = strip_whitespace(&optimized);
    assert!(stripped.contains("offset=0x10"));
    assert!(stripped.contains("movoffset,%l0"));
    assert!(!stripped.contains("nop"));
}

#[test]
fn test_load_store_slots_respect_data_flow() {
    // the ld writes %l1, which the cmp feeding the branch reads; it may
    // not move past the cmp into the slot, and nothing else is eligible
    let source = indoc! {"
        loop:
        \tld [%l0], %l1
        \tcmp %l1, %l2
        \tbne loop2
        \tnop
    "};
    assert_optimizes_to(source, source);
}

#[test]
fn test_store_moves_when_independent() {
    assert_optimizes_to(
        indoc! {"
            label1:
            \tst %l5, [%fp-4]
            \tcmp %l0, %l1
            \tbge label2
            \tnop
        "},
        indoc! {"
            label1:
            \tcmp %l0, %l1
            \tbge label2
            \tst %l5, [%fp-4]
        "},
    );
}

#[test]
fn test_parse_error_is_reported_with_location() {
    let err = optimize_source("label1:\n\tbogus 1\n").unwrap_err();
    match err {
        AssemblyError::SyntaxError {
            location, reason, ..
        } => {
            assert_eq!(location.row, 2);
            assert_eq!(location.column, 1);
            assert!(reason.contains("bogus"));
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_definitions_are_semantic_errors() {
    assert!(matches!(
        optimize_source("a:\na:\n"),
        Err(AssemblyError::SemanticError { .. })
    ));
    assert!(matches!(
        optimize_source("k = 1\nk:\n"),
        Err(AssemblyError::SemanticError { .. })
    ));
}

#[test]
fn test_optimize_file_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "label1:\n\tmov 1, %l0\n\tnop\n\tmov 2, %l1\n").unwrap();

    let optimized = sparcopt::optimize_file(file.path()).unwrap();
    assert!(!strip_whitespace(&optimized).contains("nop"));
}

#[test]
fn test_optimize_file_renders_diagnostic_with_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "\t.align 4\n").unwrap();

    let err = sparcopt::optimize_file(file.path()).unwrap_err();
    let message = format!("{}", err);
    assert!(message.contains(".align"));
    assert!(message.contains(&file.path().display().to_string()));
    assert!(message.contains('^'));
}

#[test]
fn test_missing_file_is_an_error() {
    let err = sparcopt::optimize_file(std::path::Path::new("no-such-file.s")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read input file"));
}
