//! # Rule Compiler
//!
//! Lowers a validated ruleset into the binary bytecode artifact.
//!
//! ## Pipeline
//!
//! ```text
//! Ruleset -> [Validator] -> [Normalizer] -> [Code Generator]
//!         -> [Peephole Optimizer] -> [Assembler] -> artifact bytes
//! ```
//!
//! Rules are stable-sorted by ascending priority before emission, so
//! artifact order doubles as evaluation order at runtime.

pub mod assembler;
pub mod codegen;
pub mod normalizer;
pub mod peephole;

pub use assembler::RuleProgram;
pub use codegen::{AsmInst, CodeGenerator, Label};
pub use normalizer::ConditionNode;

use crate::ruleset::{validate, Ruleset, ValidationError};
use thiserror::Error;
use tracing::debug;

/// Compilation errors. Everything except `Validation` indicates an
/// internal bug and is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unresolved label l{label}")]
    UnresolvedLabel { label: u32 },

    #[error("operand overflow: {0}")]
    OperandOverflow(String),

    #[error("rule '{rule}' lowered to a logically empty group")]
    EmptyGroup { rule: String },

    #[error("jump in rule '{rule}' targets offset {target} outside the rule block")]
    JumpOutOfRange { rule: String, target: u32 },
}

/// Compiler options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Rules with a priority below this threshold are not compiled.
    pub priority_threshold: i64,
}

/// Compile a ruleset with default options.
pub fn compile_ruleset(ruleset: &Ruleset) -> Result<Vec<u8>, CompileError> {
    compile_with_options(ruleset, CompileOptions::default())
}

/// Validate, lower, optimize, and assemble a ruleset.
pub fn compile_with_options(
    ruleset: &Ruleset,
    options: CompileOptions,
) -> Result<Vec<u8>, CompileError> {
    validate(ruleset)?;

    let mut rules: Vec<_> = ruleset
        .rules
        .iter()
        .filter(|rule| rule.priority >= options.priority_threshold)
        .collect();
    rules.sort_by_key(|rule| rule.priority);

    let mut generator = CodeGenerator::new();
    let mut programs = Vec::with_capacity(rules.len());
    for rule in rules {
        let tree = normalizer::normalize(&rule.name, &rule.conditions)?;
        let lowered = generator.lower_rule(rule, &tree);
        let lowered_len = lowered.len();
        let optimized = peephole::optimize(lowered);
        debug!(
            rule = %rule.name,
            before = lowered_len,
            after = optimized.len(),
            "lowered rule"
        );
        programs.push(RuleProgram {
            name: rule.name.clone(),
            facts: rule.referenced_facts().into_iter().collect(),
            code: optimized,
        });
    }

    assembler::assemble(&programs)
}
