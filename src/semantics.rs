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

use std::collections::HashSet;

use crate::ast::{Instruction, Register};

/// The shape of one argument position, used by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSchema {
    Reg,
    RegOrImm,
    Imm,
    Label,
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    Set,
    Cmp,
    Save,
    Call,
    Ld,
    Ldub,
    Ldsb,
    Lduh,
    Ldsh,
    St,
    Sth,
    Stb,
    Add,
    Sub,
    Srl,
    Sll,
    Sra,
    Bne,
    Be,
    Ba,
    Bn,
    Bge,
    Bg,
    Ble,
    Bl,
    Nop,
    Ret,
    Restore,
}

impl Opcode {
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        let op = match name {
            "mov" => Opcode::Mov,
            "set" => Opcode::Set,
            "cmp" => Opcode::Cmp,
            "save" => Opcode::Save,
            "call" => Opcode::Call,
            "ld" => Opcode::Ld,
            "ldub" => Opcode::Ldub,
            "ldsb" => Opcode::Ldsb,
            "lduh" => Opcode::Lduh,
            "ldsh" => Opcode::Ldsh,
            "st" => Opcode::St,
            "sth" => Opcode::Sth,
            "stb" => Opcode::Stb,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "srl" => Opcode::Srl,
            "sll" => Opcode::Sll,
            "sra" => Opcode::Sra,
            "bne" => Opcode::Bne,
            "be" => Opcode::Be,
            "ba" => Opcode::Ba,
            "bn" => Opcode::Bn,
            "bge" => Opcode::Bge,
            "bg" => Opcode::Bg,
            "ble" => Opcode::Ble,
            "bl" => Opcode::Bl,
            "nop" => Opcode::Nop,
            "ret" => Opcode::Ret,
            "restore" => Opcode::Restore,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Set => "set",
            Opcode::Cmp => "cmp",
            Opcode::Save => "save",
            Opcode::Call => "call",
            Opcode::Ld => "ld",
            Opcode::Ldub => "ldub",
            Opcode::Ldsb => "ldsb",
            Opcode::Lduh => "lduh",
            Opcode::Ldsh => "ldsh",
            Opcode::St => "st",
            Opcode::Sth => "sth",
            Opcode::Stb => "stb",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Srl => "srl",
            Opcode::Sll => "sll",
            Opcode::Sra => "sra",
            Opcode::Bne => "bne",
            Opcode::Be => "be",
            Opcode::Ba => "ba",
            Opcode::Bn => "bn",
            Opcode::Bge => "bge",
            Opcode::Bg => "bg",
            Opcode::Ble => "ble",
            Opcode::Bl => "bl",
            Opcode::Nop => "nop",
            Opcode::Ret => "ret",
            Opcode::Restore => "restore",
        }
    }

    pub fn schema(&self) -> &'static [ArgSchema] {
        use ArgSchema::*;
        match self {
            Opcode::Mov => &[RegOrImm, Reg],
            Opcode::Set => &[Imm, Reg],
            Opcode::Cmp => &[Reg, RegOrImm],
            Opcode::Save => &[Reg, RegOrImm, Reg],
            Opcode::Call => &[Label],
            Opcode::Ld | Opcode::Ldub | Opcode::Ldsb | Opcode::Lduh | Opcode::Ldsh => {
                &[Address, Reg]
            }
            Opcode::St | Opcode::Sth | Opcode::Stb => &[Reg, Address],
            Opcode::Add | Opcode::Sub | Opcode::Srl | Opcode::Sll | Opcode::Sra => {
                &[Reg, RegOrImm, Reg]
            }
            Opcode::Bne
            | Opcode::Be
            | Opcode::Ba
            | Opcode::Bn
            | Opcode::Bge
            | Opcode::Bg
            | Opcode::Ble
            | Opcode::Bl => &[Label],
            Opcode::Nop | Opcode::Ret | Opcode::Restore => &[],
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Bne
                | Opcode::Be
                | Opcode::Ba
                | Opcode::Bn
                | Opcode::Bge
                | Opcode::Bg
                | Opcode::Ble
                | Opcode::Bl
        )
    }

    /// The instruction textually after a delay-slotted one executes before
    /// the transfer takes effect.
    pub fn has_delay_slot(&self) -> bool {
        self.is_branch() || matches!(self, Opcode::Call | Opcode::Ret)
    }

    /// Two-cycle instructions may not be placed into a delay slot.
    pub fn is_two_cycle(&self) -> bool {
        self.has_delay_slot() || matches!(self, Opcode::Set)
    }

    fn is_load(&self) -> bool {
        matches!(
            self,
            Opcode::Ld | Opcode::Ldub | Opcode::Ldsb | Opcode::Lduh | Opcode::Ldsh
        )
    }

    fn is_store(&self) -> bool {
        matches!(self, Opcode::St | Opcode::Sth | Opcode::Stb)
    }
}

impl Instruction {
    /// The registers this instruction logically consumes.
    pub fn reads(&self) -> HashSet<Register> {
        let mut regs = HashSet::new();
        match self.op {
            Opcode::Nop | Opcode::Ret | Opcode::Restore => {}
            Opcode::Mov | Opcode::Set => self.arg_registers(0, &mut regs),
            Opcode::Save
            | Opcode::Cmp
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Srl
            | Opcode::Sll
            | Opcode::Sra => {
                self.arg_registers(0, &mut regs);
                self.arg_registers(1, &mut regs);
            }
            Opcode::Call => {
                for n in 0..6 {
                    regs.insert(Register::outgoing(n));
                }
            }
            op if op.is_branch() => {
                regs.insert(Register::condition_codes());
            }
            op if op.is_load() => self.arg_registers(0, &mut regs),
            op if op.is_store() => {
                // stores read the source register and the address
                self.arg_registers(0, &mut regs);
                self.arg_registers(1, &mut regs);
            }
            _ => {}
        }
        regs
    }

    /// The registers this instruction logically produces.
    pub fn writes(&self) -> HashSet<Register> {
        let mut regs = HashSet::new();
        match self.op {
            Opcode::Nop | Opcode::Ret | Opcode::Restore => {}
            Opcode::Mov | Opcode::Set => self.arg_registers(1, &mut regs),
            Opcode::Save => {
                // the register-window shift is modeled conservatively
                self.arg_registers(2, &mut regs);
                regs.extend(Register::window_registers());
            }
            Opcode::Add | Opcode::Sub | Opcode::Srl | Opcode::Sll | Opcode::Sra => {
                self.arg_registers(2, &mut regs);
            }
            Opcode::Call => {
                regs.insert(Register::outgoing(0));
            }
            Opcode::Cmp => {
                regs.insert(Register::condition_codes());
            }
            op if op.is_load() => self.arg_registers(1, &mut regs),
            _ => {}
        }
        regs
    }

    fn arg_registers(&self, index: usize, out: &mut HashSet<Register>) {
        if let Some(arg) = self.args.get(index) {
            arg.registers(out);
        }
    }
}
