//! Assembly: label resolution and artifact serialization.
//!
//! Pass 1 walks the concatenated instruction lists computing a byte
//! offset per entry (labels are zero-width) and records every label's
//! offset. Pass 2 serializes, rewriting each jump's placeholder into a
//! signed 32-bit offset relative to the byte after the jump, and strips
//! the label pseudo-instructions. The three indices follow the
//! instruction region; their absolute offsets and the payload CRC are
//! written into the header last.

use super::codegen::{AsmInst, Label};
use super::CompileError;
use crate::bytecode::{push_index_str, Header, Instruction, FORMAT_VERSION, HEADER_SIZE};
use std::collections::{BTreeMap, HashMap};

/// Byte width of an encoded jump: opcode plus i32 offset.
const JUMP_WIDTH: u32 = 5;

/// One rule's optimized program plus its fact dependencies.
#[derive(Debug, Clone)]
pub struct RuleProgram {
    pub name: String,
    /// Sorted, deduplicated fact names referenced by the rule's conditions.
    pub facts: Vec<String>,
    pub code: Vec<AsmInst>,
}

/// Assemble rule programs into the final binary artifact.
pub fn assemble(programs: &[RuleProgram]) -> Result<Vec<u8>, CompileError> {
    // Pass 1: offsets.
    let mut offset = HEADER_SIZE as u32;
    let mut label_offsets: HashMap<Label, u32> = HashMap::new();
    let mut rule_entries: Vec<(String, u32)> = Vec::with_capacity(programs.len());
    let mut rule_ranges: Vec<(u32, u32)> = Vec::with_capacity(programs.len());

    for program in programs {
        let start = offset;
        rule_entries.push((program.name.clone(), start));
        for inst in &program.code {
            match inst {
                AsmInst::Label(label) => {
                    label_offsets.insert(*label, offset);
                }
                AsmInst::Jump { .. } | AsmInst::JumpIfTrue { .. } | AsmInst::JumpIfFalse { .. } => {
                    offset += JUMP_WIDTH;
                }
                AsmInst::Op(op) => {
                    let width = op
                        .encoded_len()
                        .map_err(|e| CompileError::OperandOverflow(e.to_string()))?;
                    offset += width as u32;
                }
            }
        }
        rule_ranges.push((start, offset));
    }

    // Pass 2: serialize with resolved jumps.
    let mut body: Vec<u8> = Vec::with_capacity((offset as usize).saturating_sub(HEADER_SIZE));
    for (program, range) in programs.iter().zip(&rule_ranges) {
        for inst in &program.code {
            match inst {
                AsmInst::Label(_) => {}
                AsmInst::Jump { target }
                | AsmInst::JumpIfTrue { target }
                | AsmInst::JumpIfFalse { target } => {
                    let target_offset = *label_offsets
                        .get(target)
                        .ok_or(CompileError::UnresolvedLabel { label: target.0 })?;
                    if target_offset < range.0 || target_offset > range.1 {
                        return Err(CompileError::JumpOutOfRange {
                            rule: program.name.clone(),
                            target: target_offset,
                        });
                    }
                    let source = HEADER_SIZE as u32 + body.len() as u32;
                    let relative = i64::from(target_offset) - i64::from(source + JUMP_WIDTH);
                    let relative = i32::try_from(relative).map_err(|_| {
                        CompileError::OperandOverflow(format!(
                            "jump displacement {relative} exceeds i32"
                        ))
                    })?;
                    let concrete = match inst {
                        AsmInst::Jump { .. } => Instruction::Jump { offset: relative },
                        AsmInst::JumpIfTrue { .. } => Instruction::JumpIfTrue { offset: relative },
                        _ => Instruction::JumpIfFalse { offset: relative },
                    };
                    concrete
                        .encode(&mut body)
                        .map_err(|e| CompileError::OperandOverflow(e.to_string()))?;
                }
                AsmInst::Op(op) => {
                    op.encode(&mut body)
                        .map_err(|e| CompileError::OperandOverflow(e.to_string()))?;
                }
            }
        }
    }

    // Indices. Fact->rules is keyed in sorted fact order for determinism;
    // rule lists inside it follow artifact order.
    let mut fact_to_rules: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for program in programs {
        for fact in &program.facts {
            fact_to_rules
                .entry(fact.as_str())
                .or_default()
                .push(program.name.as_str());
        }
    }

    let rule_exec_index_offset = HEADER_SIZE as u32 + body.len() as u32;
    for (name, entry) in &rule_entries {
        push_index_str(&mut body, name);
        body.extend_from_slice(&entry.to_le_bytes());
    }

    let fact_rule_index_offset = HEADER_SIZE as u32 + body.len() as u32;
    for (fact, rules) in &fact_to_rules {
        push_index_str(&mut body, fact);
        body.extend_from_slice(&(rules.len() as u32).to_le_bytes());
        for rule in rules {
            push_index_str(&mut body, rule);
        }
    }

    let fact_dep_index_offset = HEADER_SIZE as u32 + body.len() as u32;
    for program in programs {
        push_index_str(&mut body, &program.name);
        body.extend_from_slice(&(program.facts.len() as u32).to_le_bytes());
        for fact in &program.facts {
            push_index_str(&mut body, fact);
        }
    }

    let header = Header {
        version: FORMAT_VERSION,
        checksum: crc32fast::hash(&body),
        const_pool_size: 0,
        num_rules: programs.len() as u32,
        rule_exec_index_offset,
        fact_rule_index_offset,
        fact_dep_index_offset,
    };

    let mut artifact = Vec::with_capacity(HEADER_SIZE + body.len());
    artifact.extend_from_slice(&header.encode());
    artifact.extend_from_slice(&body);
    Ok(artifact)
}
