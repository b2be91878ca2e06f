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

use crate::ast::{CompilationUnit, Directive, Instruction, ItemKind, Operand};

/// Render the root list back to assembly text. Every item ends its own
/// line; label declarations get a separating blank line above them.
/// Comments are emitted exactly as they appeared in the source.
pub fn render(unit: &CompilationUnit) -> String {
    let mut out = String::new();
    for id in unit.iter() {
        match unit.kind(id) {
            ItemKind::Comment(text) => {
                out.push_str(text);
                out.push('\n');
            }
            ItemKind::Directive(Directive::Section(name)) => {
                out.push_str(&format!("\t.section \"{}\"\n", name));
            }
            ItemKind::Directive(Directive::Global { name, .. }) => {
                out.push_str(&format!("\t.global {}\n", name));
            }
            ItemKind::LabelDecl(name) => {
                out.push_str(&format!("\n{}:\n", name));
            }
            ItemKind::ConstantDecl { name, value } => {
                out.push_str(&format!("{} = {}\n", name, render_operand(value)));
            }
            ItemKind::Instruction(instruction) => {
                out.push_str(&render_instruction(instruction));
                out.push('\n');
            }
            ItemKind::Newline => out.push('\n'),
            ItemKind::Eof => {}
        }
    }
    out
}

pub fn render_instruction(instruction: &Instruction) -> String {
    let mut out = String::from("\t");
    out.push_str(instruction.op.mnemonic());
    if instruction.annulled {
        out.push_str(",a");
    }
    if !instruction.args.is_empty() {
        out.push('\t');
        let args: Vec<String> = instruction.args.iter().map(render_operand).collect();
        out.push_str(&args.join(",\t"));
    }
    out
}

pub fn render_operand(operand: &Operand) -> String {
    match operand {
        Operand::Register(reg) => format!("%{}", reg.name()),
        Operand::Number { text, .. } => text.clone(),
        Operand::StringLit(text) => format!("\"{}\"", text),
        Operand::CharLit(ch) => format!("'{}'", ch),
        Operand::Constant { name, .. } => name.clone(),
        Operand::Label { name, .. } => name.clone(),
        Operand::Binary { op, left, right } => format!(
            "{} {} {}",
            render_operand(left),
            op.symbol(),
            render_operand(right)
        ),
        Operand::Negate(inner) => format!("-{}", render_operand(inner)),
        Operand::Grouped(inner) => format!("({})", render_operand(inner)),
        Operand::Address { base, offset: None } => format!("[%{}]", base.name()),
        Operand::Address {
            base,
            offset: Some((op, offset)),
        } => format!("[%{}{}{}]", base.name(), op.symbol(), render_operand(offset)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn round_trip(source: &str) -> String {
        render(&parse(tokenize(source).unwrap()).unwrap())
    }

    #[test]
    fn test_instruction_layout() {
        assert_eq!(round_trip("mov 2, %l3\n"), "\tmov\t2,\t%l3\n");
        assert_eq!(round_trip("nop\n"), "\tnop\n");
        assert_eq!(round_trip("save %sp, -96, %sp\n"), "\tsave\t%sp,\t-96,\t%sp\n");
    }

    #[test]
    fn test_annulled_branch_layout() {
        assert_eq!(round_trip("ba,a out\n"), "\tba,a\tout\n");
    }

    #[test]
    fn test_label_gets_blank_line() {
        assert_eq!(round_trip("loop:\nnop\n"), "\nloop:\n\tnop\n");
    }

    #[test]
    fn test_directives() {
        assert_eq!(round_trip(".section \".text\"\n"), "\t.section \".text\"\n");
        assert_eq!(round_trip(".global main\n"), "\t.global main\n");
    }

    #[test]
    fn test_number_lexeme_preserved() {
        assert_eq!(round_trip("set 0xFFFF, %l1\n"), "\tset\t0xFFFF,\t%l1\n");
    }

    #[test]
    fn test_address_forms() {
        assert_eq!(round_trip("ld [%l0], %l1\n"), "\tld\t[%l0],\t%l1\n");
        assert_eq!(round_trip("st %l2, [%fp-4]\n"), "\tst\t%l2,\t[%fp-4]\n");
        assert_eq!(round_trip("ld [%l0+%l1], %l2\n"), "\tld\t[%l0+%l1],\t%l2\n");
    }

    #[test]
    fn test_comments_verbatim() {
        assert_eq!(round_trip("! heading\n"), "! heading\n");
        assert_eq!(round_trip("/* block */\n"), "/* block */\n");
    }

    #[test]
    fn test_constant_declaration_renders_swapped_sum() {
        // the add parser puts the newest term on the left
        assert_eq!(round_trip("k = 1 + 2\n"), "k = 2 + 1\n");
    }
}
