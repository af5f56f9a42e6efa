//! Bytecode loading and index reconstruction.
//!
//! `load` verifies the header, checksum, and structural invariants, then
//! rebuilds the three indices into in-memory maps. The resulting
//! [`Engine`] is immutable; the VM and dispatcher hold read-only
//! references for its lifetime.

use super::{
    read_index_str, read_index_u32, Header, Instruction, Opcode, FORMAT_VERSION, HEADER_SIZE,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Artifact loading errors. All are fatal to engine startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("not a rule artifact (implausible header)")]
    BadMagic,

    #[error("unsupported artifact version {found} (this build reads version 1)")]
    UnsupportedVersion { found: u32 },

    #[error("truncated artifact: {reason}")]
    TruncatedArtifact { reason: String },

    #[error("artifact checksum mismatch: header says {expected:#010x}, payload hashes to {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("inconsistent index: {reason}")]
    InconsistentIndex { reason: String },
}

/// A loaded, immutable rule engine artifact.
#[derive(Debug)]
pub struct Engine {
    bytes: Vec<u8>,
    header: Header,
    /// `(name, entry offset)` in artifact order (= priority order).
    rule_entries: Vec<(String, u32)>,
    rule_index: HashMap<String, u32>,
    fact_to_rules: HashMap<String, Vec<String>>,
    rule_to_facts: HashMap<String, Vec<String>>,
}

/// Parse and validate a bytecode artifact.
pub fn load(bytes: Vec<u8>) -> Result<Engine, LoadError> {
    let header = Header::decode(&bytes).ok_or_else(|| LoadError::TruncatedArtifact {
        reason: format!("{} bytes is smaller than the {HEADER_SIZE}-byte header", bytes.len()),
    })?;

    // The header has no separate magic field; a version word of zero or
    // far beyond anything ever released is not a plausible header.
    if header.version == 0 || header.version > 0xFFFF {
        return Err(LoadError::BadMagic);
    }
    if header.version != FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            found: header.version,
        });
    }

    if header.checksum != 0 {
        let computed = crc32fast::hash(&bytes[HEADER_SIZE..]);
        if computed != header.checksum {
            return Err(LoadError::ChecksumMismatch {
                expected: header.checksum,
                computed,
            });
        }
    }

    let len = bytes.len() as u32;
    let exec_offset = header.rule_exec_index_offset;
    let fact_rule_offset = header.fact_rule_index_offset;
    let fact_dep_offset = header.fact_dep_index_offset;
    let ordered = HEADER_SIZE as u32 <= exec_offset
        && exec_offset <= fact_rule_offset
        && fact_rule_offset <= fact_dep_offset
        && fact_dep_offset <= len;
    if !ordered {
        return Err(LoadError::TruncatedArtifact {
            reason: format!(
                "index offsets {exec_offset}/{fact_rule_offset}/{fact_dep_offset} overlap or exceed the {len}-byte artifact"
            ),
        });
    }

    let truncated = |e: super::DecodeError| LoadError::TruncatedArtifact {
        reason: e.to_string(),
    };

    // Rule-execution index.
    let mut rule_entries = Vec::with_capacity(header.num_rules as usize);
    let mut rule_index = HashMap::new();
    let mut pos = exec_offset as usize;
    let end = fact_rule_offset as usize;
    for _ in 0..header.num_rules {
        let name = read_index_str(&bytes, &mut pos, end).map_err(truncated)?;
        let entry = read_index_u32(&bytes, &mut pos, end).map_err(truncated)?;
        if entry < HEADER_SIZE as u32 || entry >= exec_offset {
            return Err(LoadError::InconsistentIndex {
                reason: format!("rule '{name}' entry offset {entry} outside the instruction region"),
            });
        }
        if bytes[entry as usize] != Opcode::RuleStart as u8 {
            return Err(LoadError::InconsistentIndex {
                reason: format!("rule '{name}' entry offset {entry} does not point at RULE_START"),
            });
        }
        match Instruction::decode(&bytes, entry as usize) {
            Ok((Instruction::RuleStart { name: encoded }, _)) if encoded == name => {}
            _ => {
                return Err(LoadError::InconsistentIndex {
                    reason: format!("rule '{name}' entry does not decode to its own RULE_START"),
                });
            }
        }
        if rule_index.insert(name.clone(), entry).is_some() {
            return Err(LoadError::InconsistentIndex {
                reason: format!("duplicate rule '{name}' in execution index"),
            });
        }
        rule_entries.push((name, entry));
    }
    // Producers write rules in evaluation order; enforce it regardless.
    rule_entries.sort_by_key(|(_, entry)| *entry);

    // Fact->rules index, bounded by the next index's offset.
    let mut fact_to_rules: HashMap<String, Vec<String>> = HashMap::new();
    let mut pos = fact_rule_offset as usize;
    let end = fact_dep_offset as usize;
    while pos < end {
        let fact = read_index_str(&bytes, &mut pos, end).map_err(truncated)?;
        let count = read_index_u32(&bytes, &mut pos, end).map_err(truncated)?;
        let mut rules = Vec::with_capacity(count as usize);
        for _ in 0..count {
            rules.push(read_index_str(&bytes, &mut pos, end).map_err(truncated)?);
        }
        if fact_to_rules.insert(fact.clone(), rules).is_some() {
            return Err(LoadError::InconsistentIndex {
                reason: format!("duplicate fact '{fact}' in fact->rules index"),
            });
        }
    }

    // Rule->facts index, bounded by artifact end.
    let mut rule_to_facts: HashMap<String, Vec<String>> = HashMap::new();
    let mut pos = fact_dep_offset as usize;
    let end = bytes.len();
    while pos < end {
        let rule = read_index_str(&bytes, &mut pos, end).map_err(truncated)?;
        let count = read_index_u32(&bytes, &mut pos, end).map_err(truncated)?;
        let mut facts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            facts.push(read_index_str(&bytes, &mut pos, end).map_err(truncated)?);
        }
        if rule_to_facts.insert(rule.clone(), facts).is_some() {
            return Err(LoadError::InconsistentIndex {
                reason: format!("duplicate rule '{rule}' in rule->facts index"),
            });
        }
    }

    validate_consistency(&rule_index, &fact_to_rules, &rule_to_facts)?;

    // Deterministic dispatch: rules for a fact evaluate in entry order.
    for rules in fact_to_rules.values_mut() {
        rules.sort_by_key(|name| rule_index.get(name).copied().unwrap_or(u32::MAX));
    }

    let engine = Engine {
        header,
        rule_entries,
        rule_index,
        fact_to_rules,
        rule_to_facts,
        bytes,
    };
    info!(
        rules = engine.rule_entries.len(),
        facts = engine.fact_to_rules.len(),
        bytes = engine.bytes.len(),
        "artifact loaded"
    );
    Ok(engine)
}

fn validate_consistency(
    rule_index: &HashMap<String, u32>,
    fact_to_rules: &HashMap<String, Vec<String>>,
    rule_to_facts: &HashMap<String, Vec<String>>,
) -> Result<(), LoadError> {
    for (fact, rules) in fact_to_rules {
        for rule in rules {
            if !rule_index.contains_key(rule) {
                return Err(LoadError::InconsistentIndex {
                    reason: format!("fact '{fact}' references unknown rule '{rule}'"),
                });
            }
            let covered = rule_to_facts
                .get(rule)
                .is_some_and(|facts| facts.contains(fact));
            if !covered {
                return Err(LoadError::InconsistentIndex {
                    reason: format!("fact '{fact}' maps to rule '{rule}' but not inversely"),
                });
            }
        }
    }
    for (rule, facts) in rule_to_facts {
        if !rule_index.contains_key(rule) {
            return Err(LoadError::InconsistentIndex {
                reason: format!("rule->facts index references unknown rule '{rule}'"),
            });
        }
        for fact in facts {
            let covered = fact_to_rules
                .get(fact)
                .is_some_and(|rules| rules.contains(rule));
            if !covered {
                return Err(LoadError::InconsistentIndex {
                    reason: format!("rule '{rule}' depends on fact '{fact}' but not inversely"),
                });
            }
        }
    }
    Ok(())
}

impl Engine {
    /// The raw artifact bytes the VM interprets.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn num_rules(&self) -> usize {
        self.rule_entries.len()
    }

    /// Rule names in evaluation (entry-offset) order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rule_entries.iter().map(|(name, _)| name.as_str())
    }

    /// Entry offset of a rule's `RULE_START`, absolute to artifact start.
    pub fn rule_offset(&self, name: &str) -> Option<u32> {
        self.rule_index.get(name).copied()
    }

    /// Rules impacted by an update to `fact`, in evaluation order.
    pub fn rules_for_fact(&self, fact: &str) -> &[String] {
        self.fact_to_rules.get(fact).map_or(&[], Vec::as_slice)
    }

    /// The facts a rule's conditions read.
    pub fn facts_for_rule(&self, rule: &str) -> &[String] {
        self.rule_to_facts.get(rule).map_or(&[], Vec::as_slice)
    }
}
