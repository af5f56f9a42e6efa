//! Peephole optimization over pre-assembly code.
//!
//! Three transforms, applied left-to-right and repeated until a full pass
//! changes nothing:
//!
//! 1. a jump whose target label immediately follows it (labels are
//!    zero-width) is removed;
//! 2. `JUMP_IF_FALSE(Lf); JUMP_IF_TRUE(Ls)` with `Lf` immediately after
//!    the pair fuses to the single conditional `JUMP_IF_TRUE(Ls)` - true
//!    branches to `Ls`, false falls through onto `Lf`;
//! 3. labels never referenced by any jump are deleted.

use super::codegen::{AsmInst, Label};
use std::collections::HashSet;

/// Optimize to fixpoint.
pub fn optimize(mut code: Vec<AsmInst>) -> Vec<AsmInst> {
    loop {
        let mut changed = false;
        code = remove_jumps_to_next(code, &mut changed);
        code = fuse_conditional_pairs(code, &mut changed);
        code = remove_unreferenced_labels(code, &mut changed);
        if !changed {
            return code;
        }
    }
}

/// Does label `target` occur in the run of consecutive labels starting
/// at `code[from]`?
fn label_follows(code: &[AsmInst], from: usize, target: Label) -> bool {
    code[from..]
        .iter()
        .take_while(|inst| matches!(inst, AsmInst::Label(_)))
        .any(|inst| matches!(inst, AsmInst::Label(l) if *l == target))
}

fn remove_jumps_to_next(code: Vec<AsmInst>, changed: &mut bool) -> Vec<AsmInst> {
    let mut out = Vec::with_capacity(code.len());
    for (i, inst) in code.iter().enumerate() {
        match inst.jump_target() {
            Some(target) if label_follows(&code, i + 1, target) => {
                *changed = true;
            }
            _ => out.push(inst.clone()),
        }
    }
    out
}

fn fuse_conditional_pairs(code: Vec<AsmInst>, changed: &mut bool) -> Vec<AsmInst> {
    let mut out = Vec::with_capacity(code.len());
    let mut i = 0;
    while i < code.len() {
        if let AsmInst::JumpIfFalse { target: fail } = code[i] {
            if matches!(code.get(i + 1), Some(AsmInst::JumpIfTrue { .. }))
                && label_follows(&code, i + 2, fail)
            {
                // The false branch is exactly the fall-through; drop it.
                *changed = true;
                i += 1;
                continue;
            }
        }
        out.push(code[i].clone());
        i += 1;
    }
    out
}

fn remove_unreferenced_labels(code: Vec<AsmInst>, changed: &mut bool) -> Vec<AsmInst> {
    let referenced: HashSet<Label> = code.iter().filter_map(AsmInst::jump_target).collect();
    let mut out = Vec::with_capacity(code.len());
    for inst in code {
        match inst {
            AsmInst::Label(label) if !referenced.contains(&label) => {
                *changed = true;
            }
            other => out.push(other),
        }
    }
    out
}
