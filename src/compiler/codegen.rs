//! Code generation: condition trees to linear instruction lists.
//!
//! Lowering is recursive and carries two symbolic labels. The contract:
//! after the generated block runs, control reaches `success` iff the node
//! evaluated true, else `fail`.
//!
//! - `Leaf`: load fact, load constant, compare, `JUMP_IF_FALSE(fail)`,
//!   `JUMP_IF_TRUE(success)`. The peephole pass later removes whichever
//!   jump lands on the next instruction.
//! - `AllOf`: every child shares the outer fail label (first false wins).
//! - `AnyOf`: every child shares the outer success label (first true wins).

use crate::bytecode::{CompareOp, Instruction};
use crate::compiler::normalizer::ConditionNode;
use crate::ruleset::{Action, ActionValue, Operator, Rule};

/// Symbolic jump target, unique within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Pre-assembly instruction: concrete instructions interleaved with
/// zero-width label pseudo-instructions and label-targeted jumps.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmInst {
    Label(Label),
    Jump { target: Label },
    JumpIfTrue { target: Label },
    JumpIfFalse { target: Label },
    Op(Instruction),
}

impl AsmInst {
    /// The label this entry jumps to, if it is a jump.
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            AsmInst::Jump { target }
            | AsmInst::JumpIfTrue { target }
            | AsmInst::JumpIfFalse { target } => Some(*target),
            _ => None,
        }
    }
}

/// Lowers rules to pre-assembly code. Labels are minted from a monotonic
/// counter shared across the whole compilation, so they stay unique when
/// several rules are assembled together.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    next_label: u32,
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator::default()
    }

    fn fresh(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Lower one rule: `RULE_START`, the condition block, the action
    /// sequence behind the success label, then the shared fail label and
    /// `RULE_END`.
    pub fn lower_rule(&mut self, rule: &Rule, tree: &ConditionNode) -> Vec<AsmInst> {
        let mut out = vec![AsmInst::Op(Instruction::RuleStart {
            name: rule.name.clone(),
        })];

        let success = self.fresh();
        let fail = self.fresh();
        self.lower_node(tree, success, fail, &mut out);

        out.push(AsmInst::Label(success));
        for action in &rule.actions {
            emit_action(action, &mut out);
        }
        out.push(AsmInst::Label(fail));
        out.push(AsmInst::Op(Instruction::RuleEnd));
        out
    }

    fn lower_node(
        &mut self,
        node: &ConditionNode,
        success: Label,
        fail: Label,
        out: &mut Vec<AsmInst>,
    ) {
        match node {
            ConditionNode::Leaf(cond) => {
                let ty = cond.value.data_type();
                out.push(AsmInst::Op(Instruction::LoadFact {
                    ty,
                    fact: cond.fact.clone(),
                }));
                out.push(AsmInst::Op(Instruction::LoadConst {
                    value: cond.value.clone(),
                }));
                out.push(AsmInst::Op(Instruction::Compare {
                    ty,
                    op: compare_op(cond.operator),
                }));
                out.push(AsmInst::JumpIfFalse { target: fail });
                out.push(AsmInst::JumpIfTrue { target: success });
            }
            ConditionNode::AllOf(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i + 1 == children.len() {
                        self.lower_node(child, success, fail, out);
                    } else {
                        let next = self.fresh();
                        self.lower_node(child, next, fail, out);
                        out.push(AsmInst::Label(next));
                    }
                }
            }
            ConditionNode::AnyOf(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i + 1 == children.len() {
                        self.lower_node(child, success, fail, out);
                    } else {
                        let next_fail = self.fresh();
                        self.lower_node(child, success, next_fail, out);
                        out.push(AsmInst::Label(next_fail));
                    }
                }
            }
        }
    }
}

fn emit_action(action: &Action, out: &mut Vec<AsmInst>) {
    out.push(AsmInst::Op(Instruction::ActionStart));
    out.push(AsmInst::Op(Instruction::ActionType {
        name: action.action_type.clone(),
    }));
    out.push(AsmInst::Op(Instruction::ActionTarget {
        name: action.target.clone(),
    }));
    match &action.value {
        ActionValue::Literal(value) => out.push(AsmInst::Op(Instruction::ActionValue {
            value: value.clone(),
        })),
        ActionValue::Script(script) => out.push(AsmInst::Op(Instruction::ActionValueScript {
            script: script.script.clone(),
            params: script.params.clone(),
        })),
    }
    out.push(AsmInst::Op(Instruction::ActionEnd));
}

fn compare_op(op: Operator) -> CompareOp {
    match op {
        Operator::Eq => CompareOp::Eq,
        Operator::Neq => CompareOp::Neq,
        Operator::Lt => CompareOp::Lt,
        Operator::Lte => CompareOp::Lte,
        Operator::Gt => CompareOp::Gt,
        Operator::Gte => CompareOp::Gte,
        Operator::Contains => CompareOp::Contains,
        Operator::NotContains => CompareOp::NotContains,
    }
}
