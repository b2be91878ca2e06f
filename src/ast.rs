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

use std::collections::{HashMap, HashSet};

use crate::errors::Location;
use crate::semantics::Opcode;

/// Index of a root-list node in the compilation unit's arena.
pub type NodeId = usize;

/// A register, identified by name. `%l3` and `%l3` are the same register;
/// equality and hashing are by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    name: String,
}

impl Register {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The integer condition codes, written by `cmp` and read by every
    /// conditional branch.
    pub fn condition_codes() -> Self {
        Self::new("nzvc")
    }

    /// Outgoing argument register `%o{n}`.
    pub fn outgoing(n: usize) -> Self {
        Self::new(format!("o{}", n))
    }

    /// The full register-window set `{i0..i8, l0..l8, o0..o8}` clobbered by
    /// `save`. The 0-8 enumeration (nine per class) is wider than the
    /// hardware's 0-7; the extra names only make the data-flow model more
    /// conservative.
    pub fn window_registers() -> HashSet<Register> {
        let mut regs = HashSet::new();
        for class in ["i", "l", "o"] {
            for n in 0..=8 {
                regs.insert(Self::new(format!("{}{}", class, n)));
            }
        }
        regs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Add,
    Sub,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::And => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressOp {
    Plus,
    Minus,
}

impl AddressOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            AddressOp::Plus => "+",
            AddressOp::Minus => "-",
        }
    }
}

/// All forms an instruction argument can take. Number literals keep their
/// original lexeme so `0xFFFF` prints back as written. A direction on an
/// `Address` always comes with an offset, by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(Register),
    Number { value: i64, text: String },
    StringLit(String),
    CharLit(char),
    Constant { name: String, decl: NodeId },
    Label { name: String, decl: Option<NodeId> },
    Binary { op: BinaryOp, left: Box<Operand>, right: Box<Operand> },
    Negate(Box<Operand>),
    Grouped(Box<Operand>),
    Address { base: Register, offset: Option<(AddressOp, Box<Operand>)> },
}

impl Operand {
    /// Collect every register this operand mentions, address bases and
    /// register offsets included.
    pub fn registers(&self, out: &mut HashSet<Register>) {
        match self {
            Operand::Register(reg) => {
                out.insert(reg.clone());
            }
            Operand::Address { base, offset } => {
                out.insert(base.clone());
                if let Some((_, operand)) = offset {
                    operand.registers(out);
                }
            }
            Operand::Binary { left, right, .. } => {
                left.registers(out);
                right.registers(out);
            }
            Operand::Negate(inner) | Operand::Grouped(inner) => inner.registers(out),
            Operand::Number { .. }
            | Operand::StringLit(_)
            | Operand::CharLit(_)
            | Operand::Constant { .. }
            | Operand::Label { .. } => {}
        }
    }

    /// The declaration back reference of a label operand, if resolved.
    pub fn label_decl(&self) -> Option<NodeId> {
        match self {
            Operand::Label { decl, .. } => *decl,
            _ => None,
        }
    }

    pub fn label_name(&self) -> Option<&str> {
        match self {
            Operand::Label { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub args: Vec<Operand>,
    /// Only meaningful on branches; rendered as a `,a` suffix.
    pub annulled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Section(String),
    Global { name: String, decl: Option<NodeId> },
}

/// The items that may appear in the root list. Newline is a formatting
/// sentinel inserted by the optimizer behind moved instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Comment(String),
    Directive(Directive),
    LabelDecl(String),
    ConstantDecl { name: String, value: Operand },
    Instruction(Instruction),
    Newline,
    Eof,
}

impl ItemKind {
    /// Formatting items carry no program meaning; list-position queries
    /// skip them.
    pub fn is_significant(&self) -> bool {
        !matches!(self, ItemKind::Newline | ItemKind::Comment(_))
    }
}

#[derive(Debug)]
struct Item {
    kind: ItemKind,
    location: Location,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// The parsed program: an arena of root items threaded into a doubly-linked
/// list, plus the label and constant tables built during parsing. The arena
/// owns every node for the unit's lifetime; unlinking only detaches a node
/// from the list. All link operations are O(1).
#[derive(Debug, Default)]
pub struct CompilationUnit {
    nodes: Vec<Item>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    pub labels: HashMap<String, NodeId>,
    pub constants: HashMap<String, NodeId>,
}

impl CompilationUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node without linking it into the list.
    pub fn alloc(&mut self, kind: ItemKind, location: Location) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Item {
            kind,
            location,
            prev: None,
            next: None,
        });
        id
    }

    /// Allocate a node and link it at the end of the list.
    pub fn push_back(&mut self, kind: ItemKind, location: Location) -> NodeId {
        let id = self.alloc(kind, location);
        match self.tail {
            Some(tail) => {
                self.nodes[tail].next = Some(id);
                self.nodes[id].prev = Some(tail);
                self.tail = Some(id);
            }
            None => {
                self.head = Some(id);
                self.tail = Some(id);
            }
        }
        id
    }

    pub fn kind(&self, id: NodeId) -> &ItemKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut ItemKind {
        &mut self.nodes[id].kind
    }

    pub fn kinds_mut(&mut self) -> impl Iterator<Item = &mut ItemKind> {
        self.nodes.iter_mut().map(|item| &mut item.kind)
    }

    pub fn location(&self, id: NodeId) -> Location {
        self.nodes[id].location
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].next
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].prev
    }

    /// Iterate the linked root items front to back.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.head, move |&id| self.next(id))
    }

    /// The nearest following node that is not formatting.
    pub fn next_significant(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = self.next(id);
        while let Some(node) = cursor {
            if self.kind(node).is_significant() {
                return Some(node);
            }
            cursor = self.next(node);
        }
        None
    }

    /// The nearest preceding node that is not formatting.
    pub fn prev_significant(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = self.prev(id);
        while let Some(node) = cursor {
            if self.kind(node).is_significant() {
                return Some(node);
            }
            cursor = self.prev(node);
        }
        None
    }

    /// Detach a node from the list. The node stays in the arena and can be
    /// relinked with `insert_before` / `insert_after`.
    pub fn unlink(&mut self, id: NodeId) {
        let (prev, next) = (self.nodes[id].prev, self.nodes[id].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => {
                if self.head == Some(id) {
                    self.head = next;
                }
            }
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => {
                if self.tail == Some(id) {
                    self.tail = prev;
                }
            }
        }
        self.nodes[id].prev = None;
        self.nodes[id].next = None;
    }

    /// Link a detached node directly before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, id: NodeId) {
        let prev = self.nodes[anchor].prev;
        self.nodes[id].prev = prev;
        self.nodes[id].next = Some(anchor);
        self.nodes[anchor].prev = Some(id);
        match prev {
            Some(p) => self.nodes[p].next = Some(id),
            None => self.head = Some(id),
        }
    }

    /// Link a detached node directly after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, id: NodeId) {
        let next = self.nodes[anchor].next;
        self.nodes[id].next = next;
        self.nodes[id].prev = Some(anchor);
        self.nodes[anchor].next = Some(id);
        match next {
            Some(n) => self.nodes[n].prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    pub fn instruction(&self, id: NodeId) -> Option<&Instruction> {
        match self.kind(id) {
            ItemKind::Instruction(instruction) => Some(instruction),
            _ => None,
        }
    }

    /// Allocate a detached copy of an instruction node: new identity, same
    /// opcode, annul flag, and argument values. Arguments never change
    /// after parsing, so the copy is indistinguishable from the original.
    pub fn clone_instruction(&mut self, id: NodeId) -> Option<NodeId> {
        let (kind, location) = match self.kind(id) {
            ItemKind::Instruction(instruction) => {
                (ItemKind::Instruction(instruction.clone()), self.location(id))
            }
            _ => return None,
        };
        Some(self.alloc(kind, location))
    }
}
