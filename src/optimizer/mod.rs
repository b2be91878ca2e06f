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

use crate::ast::{CompilationUnit, Directive, ItemKind, NodeId, Register};
use crate::errors::AssemblyError;
use crate::semantics::Opcode;

/// Run both peephole passes over a parsed, label-resolved unit. The branch
/// pass must go first: it needs the un-filled nop behind each branch, which
/// the basic-block pass would consume.
pub fn optimize(unit: &mut CompilationUnit) -> Result<(), AssemblyError> {
    hoist_branch_targets(unit)?;
    fill_delay_slots(unit)?;
    Ok(())
}

/// Pass 1: for each removable nop behind a branch, pull the first
/// instruction of the branch target up into the delay slot of every branch
/// to that label, and annul those branches. Annulling makes the delay slot
/// execute only on the taken path, where the hoisted instruction was about
/// to run anyway. The target keeps its meaning for fall-through because the
/// hoisted instruction moves to just above the label.
pub fn hoist_branch_targets(unit: &mut CompilationUnit) -> Result<(), AssemblyError> {
    // labels named by any .global stay visible to other units and cannot
    // have their first instruction moved
    let mut globals: HashSet<String> = HashSet::new();
    for id in unit.iter() {
        if let ItemKind::Directive(Directive::Global { name, .. }) = unit.kind(id) {
            globals.insert(name.clone());
        }
    }

    let mut unremovable: HashSet<NodeId> = HashSet::new();
    while let Some(nop) = next_candidate_nop(unit, &unremovable) {
        // the nop must sit in the delay slot of a branch
        let Some(branch) = unit
            .prev_significant(nop)
            .filter(|&id| is_branch(unit, id))
        else {
            unremovable.insert(nop);
            continue;
        };

        // the branch target must be a label declared here and not exported
        let Some(target) = branch_target(unit, branch) else {
            unremovable.insert(nop);
            continue;
        };
        let ItemKind::LabelDecl(label_name) = unit.kind(target) else {
            unremovable.insert(nop);
            continue;
        };
        let label_name = label_name.clone();
        if globals.contains(&label_name) {
            unremovable.insert(nop);
            continue;
        }

        // a branch that falls through into its own target gains nothing
        if unit.next_significant(nop) == Some(target) {
            unremovable.insert(nop);
            continue;
        }

        // the target's first instruction must fit in a delay slot
        let Some(first) = unit
            .next_significant(target)
            .filter(|&id| is_single_cycle(unit, id))
        else {
            unremovable.insert(nop);
            continue;
        };

        // every branch to this label must be un-annulled and trailed by a
        // nop we can replace
        let branches: Vec<NodeId> = unit
            .iter()
            .filter(|&id| branches_to(unit, id, &label_name))
            .collect();
        let hoistable = branches.iter().all(|&b| {
            let annulled = unit.instruction(b).is_some_and(|ins| ins.annulled);
            let slot_is_nop = unit
                .next_significant(b)
                .is_some_and(|slot| is_nop(unit, slot));
            !annulled && slot_is_nop
        });
        if !hoistable {
            unremovable.insert(nop);
            continue;
        }

        // the hoisted instruction moves above the label so the fall-through
        // path still executes it
        unit.unlink(first);
        unit.insert_before(target, first);

        for &b in &branches {
            let slot = unit
                .next_significant(b)
                .filter(|&slot| is_nop(unit, slot))
                .ok_or_else(|| AssemblyError::InternalError {
                    reason: format!(
                        "branch to '{}' lost its delay-slot nop during hoisting",
                        label_name
                    ),
                })?;
            unit.unlink(slot);
            let clone = unit
                .clone_instruction(first)
                .ok_or_else(|| AssemblyError::InternalError {
                    reason: format!("hoisted node before '{}' is not an instruction", label_name),
                })?;
            unit.insert_after(b, clone);
            let newline = unit.alloc(ItemKind::Newline, unit.location(clone));
            unit.insert_after(clone, newline);
            if let ItemKind::Instruction(ins) = unit.kind_mut(b) {
                ins.annulled = true;
            }
        }
    }
    Ok(())
}

/// Pass 2: fill the delay slot behind any delay-slotted instruction with a
/// safe single-cycle instruction from earlier in the same basic block, or
/// drop nops that protect no delay slot at all.
pub fn fill_delay_slots(unit: &mut CompilationUnit) -> Result<(), AssemblyError> {
    let mut unremovable: HashSet<NodeId> = HashSet::new();
    while let Some(nop) = next_candidate_nop(unit, &unremovable) {
        let slot_owner = unit.prev_significant(nop).filter(|&id| {
            unit.instruction(id)
                .is_some_and(|ins| ins.op.has_delay_slot())
        });
        let Some(owner) = slot_owner else {
            // nothing with a delay slot ahead of it, the nop is gratuitous
            unit.unlink(nop);
            continue;
        };

        let (owner_is_branch, owner_annulled, owner_reads) = match unit.instruction(owner) {
            Some(ins) => (ins.op.is_branch(), ins.annulled, ins.reads()),
            None => (false, false, HashSet::new()),
        };
        if owner_annulled {
            // an annulled slot runs only on the taken path; filling it from
            // straight-line code would change the fall-through path
            unremovable.insert(nop);
            continue;
        }

        // a branch must observe its sources before the delay slot writes them
        let mut tainted: HashSet<Register> = if owner_is_branch {
            owner_reads
        } else {
            HashSet::new()
        };

        let mut filler: Option<NodeId> = None;
        let mut cursor = unit.prev(owner);
        while let Some(id) = cursor {
            match unit.kind(id) {
                ItemKind::LabelDecl(_) => break,
                ItemKind::Instruction(candidate) => {
                    if candidate.op.is_branch() {
                        break;
                    }
                    let reads = candidate.reads();
                    let writes = candidate.writes();
                    // an instruction already sitting in a delay slot is
                    // pinned there; stealing it would unprotect its owner
                    let in_delay_slot = unit
                        .prev_significant(id)
                        .and_then(|p| unit.instruction(p))
                        .is_some_and(|p| p.op.has_delay_slot());
                    if !candidate.op.is_two_cycle()
                        && !in_delay_slot
                        && reads.is_disjoint(&tainted)
                        && writes.is_disjoint(&tainted)
                    {
                        filler = Some(id);
                        break;
                    }
                    tainted.extend(reads);
                    tainted.extend(writes);
                }
                _ => {}
            }
            cursor = unit.prev(id);
        }

        match filler {
            Some(id) => {
                unit.unlink(id);
                unit.insert_before(nop, id);
                let newline = unit.alloc(ItemKind::Newline, unit.location(id));
                unit.insert_after(id, newline);
                unit.unlink(nop);
            }
            None => {
                unremovable.insert(nop);
            }
        }
    }
    Ok(())
}

fn next_candidate_nop(unit: &CompilationUnit, unremovable: &HashSet<NodeId>) -> Option<NodeId> {
    unit.iter()
        .find(|&id| is_nop(unit, id) && !unremovable.contains(&id))
}

fn is_nop(unit: &CompilationUnit, id: NodeId) -> bool {
    unit.instruction(id).is_some_and(|ins| ins.op == Opcode::Nop)
}

fn is_branch(unit: &CompilationUnit, id: NodeId) -> bool {
    unit.instruction(id).is_some_and(|ins| ins.op.is_branch())
}

fn is_single_cycle(unit: &CompilationUnit, id: NodeId) -> bool {
    unit.instruction(id).is_some_and(|ins| !ins.op.is_two_cycle())
}

/// The declaration node of a branch's label argument, if resolved.
fn branch_target(unit: &CompilationUnit, id: NodeId) -> Option<NodeId> {
    unit.instruction(id)?.args.first()?.label_decl()
}

/// Whether the node is a branch instruction whose label argument carries
/// the given name. Matching is by name: every branch to the label gets the
/// same rewrite, resolved or not.
fn branches_to(unit: &CompilationUnit, id: NodeId, label_name: &str) -> bool {
    let Some(ins) = unit.instruction(id) else {
        return false;
    };
    ins.op.is_branch()
        && ins
            .args
            .first()
            .and_then(|arg| arg.label_name())
            .is_some_and(|name| name == label_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Instruction, Operand};
    use crate::lexer::tokenize;
    use crate::parser::{parse, resolve_labels};

    fn optimized(source: &str) -> CompilationUnit {
        let mut unit = parse(tokenize(source).unwrap()).unwrap();
        resolve_labels(&mut unit);
        optimize(&mut unit).unwrap();
        unit
    }

    fn opcodes(unit: &CompilationUnit) -> Vec<Opcode> {
        unit.iter()
            .filter_map(|id| unit.instruction(id))
            .map(|ins| ins.op)
            .collect()
    }

    fn instructions(unit: &CompilationUnit) -> Vec<&Instruction> {
        unit.iter().filter_map(|id| unit.instruction(id)).collect()
    }

    #[test]
    fn test_gratuitous_nop_removed() {
        let unit = optimized("\tmov 1, %l0\n\tnop\n\tmov 2, %l1\n");
        assert_eq!(opcodes(&unit), vec![Opcode::Mov, Opcode::Mov]);
    }

    #[test]
    fn test_nop_after_label_is_gratuitous() {
        let unit = optimized("start:\n\tnop\n\tmov 1, %l0\n");
        assert_eq!(opcodes(&unit), vec![Opcode::Mov]);
    }

    #[test]
    fn test_independent_mov_fills_branch_slot() {
        let unit = optimized(
            "label1:\n\tmov 2, %l3\n\tset 0xFFFF, %l1\n\tcmp %l0, %l1\n\tbge label2\n\tnop\n",
        );
        let ops = opcodes(&unit);
        assert_eq!(ops, vec![Opcode::Set, Opcode::Cmp, Opcode::Bge, Opcode::Mov]);
        // the branch keeps its sources intact and is not annulled
        let ins = instructions(&unit);
        assert!(!ins[2].annulled);
    }

    #[test]
    fn test_filler_may_write_call_arguments() {
        let unit = optimized("label1:\n\tmov %l1, %o0\n\tmov 4, %o1\n\tcall .mul\n\tnop\n");
        let ops = opcodes(&unit);
        assert_eq!(ops, vec![Opcode::Mov, Opcode::Call, Opcode::Mov]);
        let ins = instructions(&unit);
        // the o0 setup stays put; the o1 setup moves into the slot
        assert_eq!(ins[0].args[1], Operand::Register(Register::new("o0")));
        assert_eq!(ins[2].args[1], Operand::Register(Register::new("o1")));
    }

    #[test]
    fn test_two_cycle_candidates_leave_nop_in_place() {
        let unit = optimized("label1:\n\tset 0xFFFF, %o0\n\tset 0xEEEE, %o1\n\tcall .mul\n\tnop\n");
        assert_eq!(
            opcodes(&unit),
            vec![Opcode::Set, Opcode::Set, Opcode::Call, Opcode::Nop]
        );
    }

    #[test]
    fn test_no_motion_across_labels() {
        let unit = optimized(
            "label1:\n\tmov 9, %l0\n\tcmp %l0, %l1\n\tbne label2\n\tnop\nlabel2:\n\tmov 1, %l2\n",
        );
        assert_eq!(
            opcodes(&unit),
            vec![Opcode::Mov, Opcode::Cmp, Opcode::Bne, Opcode::Nop, Opcode::Mov]
        );
        let ins = instructions(&unit);
        assert!(!ins[2].annulled);
    }

    #[test]
    fn test_no_motion_across_branches() {
        // the second slot's only candidates sit behind the first branch
        let unit = optimized("a:\n\tcmp %l0, %l1\n\tbe first\n\tnop\n\tbne second\n\tnop\n");
        assert_eq!(
            opcodes(&unit),
            vec![Opcode::Cmp, Opcode::Be, Opcode::Nop, Opcode::Bne, Opcode::Nop]
        );
    }

    #[test]
    fn test_filler_is_not_stolen_from_another_delay_slot() {
        // the mov lands in the first call's slot; the second call must not
        // pull it back out
        let unit = optimized("a:\n\tmov 4, %o1\n\tcall .mul\n\tnop\n\tcall .mul\n\tnop\n");
        assert_eq!(
            opcodes(&unit),
            vec![Opcode::Call, Opcode::Mov, Opcode::Call, Opcode::Nop]
        );
    }

    #[test]
    fn test_branch_reads_protect_condition_codes() {
        // cmp cannot move into the slot of the branch that reads its result
        let unit = optimized("label1:\n\tcmp %l0, %l1\n\tbge label2\n\tnop\n");
        assert_eq!(opcodes(&unit), vec![Opcode::Cmp, Opcode::Bge, Opcode::Nop]);
    }

    #[test]
    fn test_ret_slot_filled_with_restore() {
        let unit = optimized("leave:\n\tmov 0, %i0\n\trestore\n\tret\n\tnop\n");
        assert_eq!(opcodes(&unit), vec![Opcode::Mov, Opcode::Ret, Opcode::Restore]);
    }

    #[test]
    fn test_branch_target_hoist_sets_annul() {
        let unit = optimized(
            "start:\n\tba done\n\tnop\n\tmov 1, %l0\ndone:\n\tmov 2, %l3\n\tmov 3, %l4\n",
        );
        let ins = instructions(&unit);
        let ops: Vec<Opcode> = ins.iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![Opcode::Ba, Opcode::Mov, Opcode::Mov, Opcode::Mov, Opcode::Mov]
        );
        // the branch is annulled and its slot holds a clone of the old
        // first target instruction
        assert!(ins[0].annulled);
        assert_eq!(
            ins[1].args,
            vec![
                Operand::Number {
                    value: 2,
                    text: "2".into()
                },
                Operand::Register(Register::new("l3")),
            ]
        );
        // the original moved above the label; the block now starts at mov 3
        let label = unit.iter().find(|&id| matches!(unit.kind(id), ItemKind::LabelDecl(n) if n == "done")).unwrap();
        let after = unit.next_significant(label).unwrap();
        let block_first = unit.instruction(after).unwrap();
        assert_eq!(block_first.args[1], Operand::Register(Register::new("l4")));
        let before = unit.prev_significant(label).unwrap();
        assert_eq!(
            unit.instruction(before).unwrap().args[1],
            Operand::Register(Register::new("l3"))
        );
    }

    #[test]
    fn test_hoist_rewrites_every_branch_to_the_label() {
        let unit = optimized(
            "a:\n\tbe done\n\tnop\n\tcmp %l0, %l1\n\tbne done\n\tnop\n\tmov 9, %l7\ndone:\n\tmov 2, %l3\n\tmov 3, %l4\n",
        );
        let ins = instructions(&unit);
        assert!(ins.iter().all(|i| i.op != Opcode::Nop));
        let annulled: Vec<bool> = ins
            .iter()
            .filter(|i| i.op.is_branch())
            .map(|i| i.annulled)
            .collect();
        assert_eq!(annulled, vec![true, true]);
    }

    #[test]
    fn test_no_hoist_for_global_labels() {
        let unit = optimized(
            ".global done\nstart:\n\tba done\n\tnop\n\tmov 1, %l0\ndone:\n\tmov 2, %l3\n\tmov 3, %l4\n",
        );
        let ins = instructions(&unit);
        assert!(!ins[0].annulled);
        // the basic-block pass cannot help either: nothing precedes the branch
        assert_eq!(ins[1].op, Opcode::Nop);
    }

    #[test]
    fn test_no_hoist_for_external_labels() {
        let unit = optimized("\tba elsewhere\n\tnop\n");
        assert_eq!(opcodes(&unit), vec![Opcode::Ba, Opcode::Nop]);
    }

    #[test]
    fn test_no_hoist_when_target_starts_two_cycle() {
        let unit = optimized(
            "start:\n\tba done\n\tnop\n\tmov 1, %l0\ndone:\n\tset 0xFF, %l3\n\tmov 3, %l4\n",
        );
        let ins = instructions(&unit);
        assert!(!ins[0].annulled);
        assert_eq!(ins[1].op, Opcode::Nop);
    }

    #[test]
    fn test_no_hoist_when_some_branch_is_annulled() {
        let unit = optimized(
            "a:\n\tba,a done\n\tnop\n\tbe done\n\tnop\n\tmov 9, %l7\ndone:\n\tmov 2, %l3\n\tmov 3, %l4\n",
        );
        let ins = instructions(&unit);
        // the pre-annulled branch freezes the label's whole branch set
        let slots: Vec<Opcode> = ins.iter().map(|i| i.op).collect();
        assert_eq!(slots[1], Opcode::Nop);
        assert_eq!(slots[3], Opcode::Nop);
        assert!(!ins[2].annulled);
    }

    #[test]
    fn test_no_hoist_into_adjacent_target() {
        // the branch falls through into its own target; leave it alone
        let unit = optimized(
            "label1:\n\tmov 9, %l0\n\tcmp %l0, %l1\n\tbne label2\n\tnop\nlabel2:\n\tmov 1, %l2\n",
        );
        let ins = instructions(&unit);
        assert!(!ins[2].annulled);
        assert_eq!(ins[3].op, Opcode::Nop);
    }

    #[test]
    fn test_annulled_input_branch_keeps_its_nop() {
        let unit = optimized("a:\n\tmov 1, %l0\n\tba,a done\n\tnop\ndone:\n\tnop\n");
        let ops = opcodes(&unit);
        assert_eq!(ops[0], Opcode::Mov);
        assert_eq!(ops[1], Opcode::Ba);
        assert_eq!(ops[2], Opcode::Nop);
    }

    #[test]
    fn test_optimizer_is_idempotent() {
        let source =
            "label1:\n\tmov 2, %l3\n\tset 0xFFFF, %l1\n\tcmp %l0, %l1\n\tbge label2\n\tnop\n";
        let once = optimized(source);
        let rendered = crate::printer::render(&once);
        let mut again = parse(tokenize(&rendered).unwrap()).unwrap();
        resolve_labels(&mut again);
        optimize(&mut again).unwrap();
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&rendered), strip(&crate::printer::render(&again)));
    }
}
