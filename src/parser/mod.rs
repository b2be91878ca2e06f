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

use crate::ast::{
    AddressOp, BinaryOp, CompilationUnit, Directive, Instruction, ItemKind, NodeId, Operand,
    Register,
};
use crate::errors::AssemblyError;
use crate::lexer::TokenStream;
use crate::lexer::token::{Token, TokenKind};
use crate::semantics::{ArgSchema, Opcode};
use std::collections::HashMap;

/// Parse a token stream into a compilation unit. Stops at the first error.
/// Label references are left unresolved; run `resolve_labels` afterwards.
pub fn parse(stream: TokenStream) -> Result<CompilationUnit, AssemblyError> {
    Parser {
        stream,
        unit: CompilationUnit::new(),
    }
    .run()
}

/// Attach every label reference to its declaration. References to labels
/// not declared in this unit stay unattached; they name external symbols.
pub fn resolve_labels(unit: &mut CompilationUnit) {
    let labels = unit.labels.clone();
    for kind in unit.kinds_mut() {
        match kind {
            ItemKind::Instruction(instruction) => {
                for arg in &mut instruction.args {
                    attach_labels(arg, &labels);
                }
            }
            ItemKind::Directive(Directive::Global { name, decl }) => {
                *decl = labels.get(name.as_str()).copied();
            }
            _ => {}
        }
    }
}

fn attach_labels(operand: &mut Operand, labels: &HashMap<String, NodeId>) {
    match operand {
        Operand::Label { name, decl } => {
            *decl = labels.get(name.as_str()).copied();
        }
        Operand::Binary { left, right, .. } => {
            attach_labels(left, labels);
            attach_labels(right, labels);
        }
        Operand::Negate(inner) | Operand::Grouped(inner) => attach_labels(inner, labels),
        Operand::Address {
            offset: Some((_, offset)),
            ..
        } => attach_labels(offset, labels),
        _ => {}
    }
}

struct Parser {
    stream: TokenStream,
    unit: CompilationUnit,
}

impl Parser {
    fn run(mut self) -> Result<CompilationUnit, AssemblyError> {
        loop {
            let token = self.stream.peek().clone();
            match token.kind {
                TokenKind::Eof => {
                    self.unit.push_back(ItemKind::Eof, token.location);
                    break;
                }
                TokenKind::Comment => {
                    self.stream.advance();
                    self.unit
                        .push_back(ItemKind::Comment(token.text), token.location);
                }
                TokenKind::Identifier => self.parse_item()?,
                _ => {
                    return Err(syntax_error(
                        &token,
                        format!("unexpected token '{}'", token.text),
                    ));
                }
            }
        }
        Ok(self.unit)
    }

    /// Top-level dispatch. Identifiers starting with a dot are directives;
    /// everything else needs one token of lookahead past the identifier to
    /// tell `name :` and `name =` from an instruction, which is the one
    /// place the parser rewinds.
    fn parse_item(&mut self) -> Result<(), AssemblyError> {
        if self.stream.peek().text.starts_with('.') {
            return self.parse_directive();
        }

        let snapshot = self.stream.snapshot();
        let ident = self.stream.advance();
        match self.stream.peek().kind {
            TokenKind::Colon => {
                self.stream.advance();
                self.declare_label(ident)
            }
            TokenKind::Assign => {
                self.stream.advance();
                self.declare_constant(ident)
            }
            _ => {
                self.stream.restore(snapshot);
                self.parse_instruction()
            }
        }
    }

    fn parse_directive(&mut self) -> Result<(), AssemblyError> {
        let name = self.stream.advance();
        match name.text.as_str() {
            ".section" => {
                let arg = self.expect(TokenKind::StringLit, "expected section name string")?;
                let section = strip_quotes(&arg.text);
                self.unit.push_back(
                    ItemKind::Directive(Directive::Section(section)),
                    name.location,
                );
                Ok(())
            }
            ".global" => {
                let arg =
                    self.expect(TokenKind::Identifier, "expected symbol name after .global")?;
                self.unit.push_back(
                    ItemKind::Directive(Directive::Global {
                        name: arg.text,
                        decl: None,
                    }),
                    name.location,
                );
                Ok(())
            }
            ".align" => Err(syntax_error(
                &name,
                "unsupported directive '.align'".to_string(),
            )),
            _ => Err(syntax_error(
                &name,
                format!("unknown directive '{}'", name.text),
            )),
        }
    }

    fn declare_label(&mut self, ident: Token) -> Result<(), AssemblyError> {
        if self.unit.labels.contains_key(&ident.text) {
            return Err(semantic_error(
                &ident,
                format!("duplicate label definition: {}", ident.text),
            ));
        }
        if self.unit.constants.contains_key(&ident.text) {
            return Err(semantic_error(
                &ident,
                format!("label already defined as a constant: {}", ident.text),
            ));
        }
        let id = self
            .unit
            .push_back(ItemKind::LabelDecl(ident.text.clone()), ident.location);
        self.unit.labels.insert(ident.text, id);
        Ok(())
    }

    fn declare_constant(&mut self, ident: Token) -> Result<(), AssemblyError> {
        if self.unit.constants.contains_key(&ident.text) {
            return Err(semantic_error(
                &ident,
                format!("duplicate constant definition: {}", ident.text),
            ));
        }
        if self.unit.labels.contains_key(&ident.text) {
            return Err(semantic_error(
                &ident,
                format!("constant already defined as a label: {}", ident.text),
            ));
        }
        let value = self.parse_immediate()?;
        let id = self.unit.push_back(
            ItemKind::ConstantDecl {
                name: ident.text.clone(),
                value,
            },
            ident.location,
        );
        self.unit.constants.insert(ident.text, id);
        Ok(())
    }

    fn parse_instruction(&mut self) -> Result<(), AssemblyError> {
        let mnemonic = self.stream.advance();
        let op = Opcode::from_mnemonic(&mnemonic.text)
            .ok_or_else(|| syntax_error(&mnemonic, format!("unknown opcode '{}'", mnemonic.text)))?;

        let mut annulled = false;
        if op.is_branch() && self.stream.peek().kind == TokenKind::Comma {
            self.stream.advance();
            let flag = self.expect(TokenKind::Identifier, "expected 'a' after ','")?;
            if flag.text != "a" {
                return Err(syntax_error(
                    &flag,
                    format!("expected 'a' after ',', found '{}'", flag.text),
                ));
            }
            annulled = true;
        }

        let schema = op.schema();
        let mut args = Vec::with_capacity(schema.len());
        for (index, shape) in schema.iter().enumerate() {
            if index > 0 {
                self.expect(TokenKind::Comma, "expected ',' between arguments")?;
            }
            args.push(self.parse_operand(*shape)?);
        }

        self.unit.push_back(
            ItemKind::Instruction(Instruction { op, args, annulled }),
            mnemonic.location,
        );
        Ok(())
    }

    fn parse_operand(&mut self, shape: ArgSchema) -> Result<Operand, AssemblyError> {
        match shape {
            ArgSchema::Reg => Ok(Operand::Register(self.parse_register()?)),
            ArgSchema::Address => self.parse_address(),
            ArgSchema::Label => self.parse_label_reference(),
            ArgSchema::Imm => self.parse_immediate(),
            ArgSchema::RegOrImm => {
                if self.stream.peek().kind == TokenKind::Percent {
                    Ok(Operand::Register(self.parse_register()?))
                } else {
                    self.parse_immediate()
                }
            }
        }
    }

    fn parse_register(&mut self) -> Result<Register, AssemblyError> {
        self.expect(TokenKind::Percent, "expected register")?;
        let name = self.expect(TokenKind::Identifier, "expected register name after '%'")?;
        Ok(Register::new(name.text))
    }

    fn parse_label_reference(&mut self) -> Result<Operand, AssemblyError> {
        let name = self.expect(TokenKind::Identifier, "expected label")?;
        Ok(Operand::Label {
            name: name.text,
            decl: None,
        })
    }

    /// `'[' reg (('+'|'-') (reg | imm))? ']'`
    fn parse_address(&mut self) -> Result<Operand, AssemblyError> {
        self.expect(TokenKind::OpenBracket, "expected address")?;
        let base = self.parse_register()?;
        let offset = match self.stream.peek().kind {
            TokenKind::Plus => {
                self.stream.advance();
                Some((AddressOp::Plus, Box::new(self.parse_address_offset()?)))
            }
            TokenKind::Minus => {
                self.stream.advance();
                Some((AddressOp::Minus, Box::new(self.parse_address_offset()?)))
            }
            _ => None,
        };
        self.expect(TokenKind::CloseBracket, "expected ']'")?;
        Ok(Operand::Address { base, offset })
    }

    fn parse_address_offset(&mut self) -> Result<Operand, AssemblyError> {
        if self.stream.peek().kind == TokenKind::Percent {
            Ok(Operand::Register(self.parse_register()?))
        } else {
            self.parse_immediate()
        }
    }

    // Immediate expressions, loosest binding first: | ^ & +- unary- atom.

    fn parse_immediate(&mut self) -> Result<Operand, AssemblyError> {
        let mut ret = self.parse_xor()?;
        while self.stream.peek().kind == TokenKind::Pipe {
            self.stream.advance();
            ret = Operand::Binary {
                op: BinaryOp::Or,
                left: Box::new(ret),
                right: Box::new(self.parse_xor()?),
            };
        }
        Ok(ret)
    }

    fn parse_xor(&mut self) -> Result<Operand, AssemblyError> {
        let mut ret = self.parse_and()?;
        while self.stream.peek().kind == TokenKind::Caret {
            self.stream.advance();
            ret = Operand::Binary {
                op: BinaryOp::Xor,
                left: Box::new(ret),
                right: Box::new(self.parse_and()?),
            };
        }
        Ok(ret)
    }

    fn parse_and(&mut self) -> Result<Operand, AssemblyError> {
        let mut ret = self.parse_add_sub()?;
        while self.stream.peek().kind == TokenKind::Ampersand {
            self.stream.advance();
            ret = Operand::Binary {
                op: BinaryOp::And,
                left: Box::new(ret),
                right: Box::new(self.parse_add_sub()?),
            };
        }
        Ok(ret)
    }

    fn parse_add_sub(&mut self) -> Result<Operand, AssemblyError> {
        let mut ret = self.parse_pre_unary()?;
        loop {
            let op = match self.stream.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.stream.advance();
            // the newly parsed term lands on the left, the running result
            // on the right; the printer renders left-op-right
            ret = Operand::Binary {
                op,
                left: Box::new(self.parse_pre_unary()?),
                right: Box::new(ret),
            };
        }
        Ok(ret)
    }

    fn parse_pre_unary(&mut self) -> Result<Operand, AssemblyError> {
        if self.stream.peek().kind == TokenKind::Minus {
            self.stream.advance();
            return Ok(Operand::Negate(Box::new(self.parse_pre_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Operand, AssemblyError> {
        let token = self.stream.peek().clone();
        match token.kind {
            TokenKind::OpenParen => {
                self.stream.advance();
                let inner = self.parse_immediate()?;
                self.expect(TokenKind::CloseParen, "expected ')'")?;
                Ok(Operand::Grouped(Box::new(inner)))
            }
            TokenKind::NumberLit => {
                self.stream.advance();
                Ok(Operand::Number {
                    value: token.value.unwrap_or_default(),
                    text: token.text,
                })
            }
            TokenKind::StringLit => {
                self.stream.advance();
                Ok(Operand::StringLit(strip_quotes(&token.text)))
            }
            TokenKind::CharLit => {
                self.stream.advance();
                let inner = token.text.chars().nth(1).unwrap_or_default();
                Ok(Operand::CharLit(inner))
            }
            TokenKind::Identifier => {
                // constants must be declared before use
                let Some(&decl) = self.unit.constants.get(&token.text) else {
                    return Err(syntax_error(
                        &token,
                        format!("unknown constant '{}'", token.text),
                    ));
                };
                self.stream.advance();
                Ok(Operand::Constant {
                    name: token.text,
                    decl,
                })
            }
            _ => Err(syntax_error(
                &token,
                format!("expected immediate expression, found '{}'", token.text),
            )),
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, AssemblyError> {
        let token = self.stream.peek().clone();
        if token.kind != kind {
            return Err(syntax_error(&token, message.to_string()));
        }
        Ok(self.stream.advance())
    }
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches('"').to_string()
}

fn syntax_error(token: &Token, reason: String) -> AssemblyError {
    AssemblyError::SyntaxError {
        location: token.location,
        width: token.width(),
        reason,
    }
}

fn semantic_error(token: &Token, reason: String) -> AssemblyError {
    AssemblyError::SemanticError {
        location: token.location,
        width: token.width(),
        reason,
    }
}
