//! Ruleset preprocessing: deduplication and merging.
//!
//! Runs at the JSON level before compilation and is optional and
//! idempotent. Two passes:
//!
//! 1. **Dedup** - rules with an identical canonical key (SHA-256 over the
//!    sorted condition tree plus the action list) collapse to the first.
//! 2. **Merge** - rules sharing an identical action list are combined into
//!    one rule whose condition group is the disjunction of the sources;
//!    duplicate branches of the disjunction are removed by canonical key.
//!
//! Canonical keys must be stable under reordering of authored siblings
//! and safe against delimiter injection. Leaves sort before nested
//! groups, lexicographically on `(fact, operator)` with the encoded
//! value as a final tie-break; group children sort recursively. Every
//! string field is length-prefixed in the serialization, so fact names,
//! targets, or string values containing separator characters cannot
//! make two distinct rules collide. Ordering inside the *authored*
//! groups is never touched here beyond what merging requires; at
//! compile time child ordering is taken as given.

use super::{Action, ActionValue, Condition, ConditionGroup, GroupElement, Rule};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Report of a preprocessing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// `dropped` had the same canonical key as `kept`.
    Duplicate { kept: String, dropped: String },
    /// `absorbed` rules shared `into`'s action list and were merged into it.
    Merged { into: String, absorbed: Vec<String> },
}

/// Deduplicate and merge a rule list. Returns the possibly smaller list
/// and the conflict reports, preserving first-seen rule order.
pub fn preprocess(rules: Vec<Rule>) -> (Vec<Rule>, Vec<Conflict>) {
    let mut conflicts = Vec::new();

    // Pass 1: collapse exact duplicates.
    let mut unique: Vec<Rule> = Vec::with_capacity(rules.len());
    for rule in rules {
        let key = rule_key(&rule);
        match unique.iter().find(|kept| rule_key(kept) == key) {
            Some(kept) => conflicts.push(Conflict::Duplicate {
                kept: kept.name.clone(),
                dropped: rule.name.clone(),
            }),
            None => unique.push(rule),
        }
    }

    // Pass 2: merge rules with identical action lists.
    let mut merged: Vec<Rule> = Vec::with_capacity(unique.len());
    for rule in unique {
        let key = actions_key(&rule.actions);
        match merged.iter_mut().find(|kept| actions_key(&kept.actions) == key) {
            Some(kept) => {
                absorb(kept, &rule);
                match conflicts.iter_mut().find(
                    |c| matches!(c, Conflict::Merged { into, .. } if *into == kept.name),
                ) {
                    Some(Conflict::Merged { absorbed, .. }) => absorbed.push(rule.name.clone()),
                    _ => conflicts.push(Conflict::Merged {
                        into: kept.name.clone(),
                        absorbed: vec![rule.name.clone()],
                    }),
                }
            }
            None => merged.push(rule),
        }
    }

    (merged, conflicts)
}

/// Fold `rule`'s conditions into `kept` as an extra disjunct, then drop
/// duplicate disjuncts by canonical key.
fn absorb(kept: &mut Rule, rule: &Rule) {
    let existing = std::mem::take(&mut kept.conditions);
    let mut branches = vec![
        GroupElement::Group(existing),
        GroupElement::Group(rule.conditions.clone()),
    ];
    branches = dedup_elements(branches);

    kept.conditions = if branches.len() == 1 {
        match branches.pop() {
            Some(GroupElement::Group(group)) => group,
            Some(leaf @ GroupElement::Leaf(_)) => ConditionGroup {
                all: vec![],
                any: vec![leaf],
            },
            None => ConditionGroup::default(),
        }
    } else {
        ConditionGroup {
            all: vec![],
            any: branches,
        }
    };
    kept.priority = kept.priority.min(rule.priority);
}

fn dedup_elements(elements: Vec<GroupElement>) -> Vec<GroupElement> {
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        // Merging an any-of-any nests one level deep; flatten pure-any
        // groups so repeated merges stay idempotent.
        if let GroupElement::Group(group) = &element {
            if group.all.is_empty() && !group.any.is_empty() {
                for inner in group.any.clone() {
                    let key = element_canonical(&inner);
                    if !seen.contains(&key) {
                        seen.push(key);
                        out.push(inner);
                    }
                }
                continue;
            }
        }
        let key = element_canonical(&element);
        if !seen.contains(&key) {
            seen.push(key);
            out.push(element);
        }
    }
    out
}

// ── Canonical serialization ─────────────────────────────────────────────

/// 256-bit canonical key of a rule: sorted conditions plus actions.
pub fn rule_key(rule: &Rule) -> [u8; 32] {
    let mut bytes = group_canonical(&rule.conditions);
    bytes.extend_from_slice(&actions_canonical(&rule.actions));
    Sha256::digest(&bytes).into()
}

/// 256-bit canonical key of an action list (declared order preserved).
fn actions_key(actions: &[Action]) -> [u8; 32] {
    Sha256::digest(&actions_canonical(actions)).into()
}

/// Sort order for siblings: leaves before groups, leaves lexicographic
/// on `(fact, operator)`, the encoded value breaking exact ties; groups
/// ordered by their canonical bytes.
fn compare_elements(a: &GroupElement, b: &GroupElement) -> Ordering {
    match (a, b) {
        (GroupElement::Leaf(x), GroupElement::Leaf(y)) => x
            .fact
            .cmp(&y.fact)
            .then_with(|| x.operator.as_str().cmp(y.operator.as_str()))
            .then_with(|| leaf_canonical(x).cmp(&leaf_canonical(y))),
        (GroupElement::Leaf(_), GroupElement::Group(_)) => Ordering::Less,
        (GroupElement::Group(_), GroupElement::Leaf(_)) => Ordering::Greater,
        (GroupElement::Group(x), GroupElement::Group(y)) => {
            group_canonical(x).cmp(&group_canonical(y))
        }
    }
}

fn group_canonical(group: &ConditionGroup) -> Vec<u8> {
    let mut out = vec![b'G'];
    for (tag, elements) in [(b'&', &group.all), (b'|', &group.any)] {
        let mut sorted: Vec<&GroupElement> = elements.iter().collect();
        sorted.sort_by(|a, b| compare_elements(a, b));

        out.push(tag);
        out.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
        for element in sorted {
            out.extend_from_slice(&element_canonical(element));
        }
    }
    out
}

fn element_canonical(element: &GroupElement) -> Vec<u8> {
    match element {
        GroupElement::Leaf(cond) => leaf_canonical(cond),
        GroupElement::Group(group) => group_canonical(group),
    }
}

fn leaf_canonical(cond: &Condition) -> Vec<u8> {
    let mut out = vec![b'L'];
    push_bytes(&mut out, cond.fact.as_bytes());
    push_bytes(&mut out, cond.operator.as_str().as_bytes());
    value_canonical(&mut out, &cond.value);
    out
}

fn actions_canonical(actions: &[Action]) -> Vec<u8> {
    let mut out = vec![b'A'];
    out.extend_from_slice(&(actions.len() as u32).to_le_bytes());
    for action in actions {
        push_bytes(&mut out, action.action_type.as_bytes());
        push_bytes(&mut out, action.target.as_bytes());
        match &action.value {
            ActionValue::Literal(value) => value_canonical(&mut out, value),
            ActionValue::Script(script) => {
                out.push(b'x');
                push_bytes(&mut out, script.script.as_bytes());
                out.extend_from_slice(&(script.params.len() as u32).to_le_bytes());
                for param in &script.params {
                    push_bytes(&mut out, param.as_bytes());
                }
            }
        }
    }
    out
}

fn value_canonical(out: &mut Vec<u8>, value: &crate::value::Value) {
    use crate::value::Value;
    match value {
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(x) => {
            out.push(b'f');
            out.extend_from_slice(&x.to_le_bytes());
        }
        Value::Bool(b) => {
            out.push(b'b');
            out.push(u8::from(*b));
        }
        Value::String(s) => {
            out.push(b's');
            push_bytes(out, s.as_bytes());
        }
    }
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
