//! Ruleset validation.
//!
//! Fail-fast, per-ruleset: the first violation aborts with an error
//! carrying the offending rule name and a dotted path to the offending
//! node (e.g. `conditions.any.1.all.0.value`).

use super::{Action, ActionValue, ConditionGroup, GroupElement, Ruleset};
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors. Fatal to compilation; never escape to runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid rule '{rule}' at {path}: {reason}")]
    InvalidRule {
        rule: String,
        path: String,
        reason: String,
    },

    #[error("invalid condition in rule '{rule}' at {path}: {reason}")]
    InvalidCondition {
        rule: String,
        path: String,
        reason: String,
    },

    #[error("invalid action in rule '{rule}' at {path}: {reason}")]
    InvalidAction {
        rule: String,
        path: String,
        reason: String,
    },
}

/// Validate a full ruleset.
///
/// Rules must have a non-empty unique name, non-negative priority, at
/// least one action, and a condition group that is not logically empty.
/// Leaf operators must be compatible with their value type. Actions must
/// have non-empty `type` and `target`.
pub fn validate(ruleset: &Ruleset) -> Result<(), ValidationError> {
    let mut seen_names: HashSet<&str> = HashSet::new();

    for rule in &ruleset.rules {
        if rule.name.is_empty() {
            return Err(ValidationError::InvalidRule {
                rule: String::from("<unnamed>"),
                path: String::from("name"),
                reason: String::from("rule name must not be empty"),
            });
        }
        if !seen_names.insert(rule.name.as_str()) {
            return Err(ValidationError::InvalidRule {
                rule: rule.name.clone(),
                path: String::from("name"),
                reason: String::from("duplicate rule name"),
            });
        }
        if rule.priority < 0 {
            return Err(ValidationError::InvalidRule {
                rule: rule.name.clone(),
                path: String::from("priority"),
                reason: format!("priority must be non-negative, got {}", rule.priority),
            });
        }
        if rule.actions.is_empty() {
            return Err(ValidationError::InvalidRule {
                rule: rule.name.clone(),
                path: String::from("actions"),
                reason: String::from("rule must have at least one action"),
            });
        }

        validate_group(&rule.name, &rule.conditions, "conditions")?;

        for (i, action) in rule.actions.iter().enumerate() {
            validate_action(&rule.name, action, &format!("actions.{i}"))?;
        }
    }

    Ok(())
}

fn validate_group(
    rule: &str,
    group: &ConditionGroup,
    path: &str,
) -> Result<(), ValidationError> {
    if group.all.is_empty() && group.any.is_empty() {
        return Err(ValidationError::InvalidCondition {
            rule: rule.to_string(),
            path: path.to_string(),
            reason: String::from("condition group is logically empty"),
        });
    }

    for (i, element) in group.all.iter().enumerate() {
        validate_element(rule, element, &format!("{path}.all.{i}"))?;
    }
    for (i, element) in group.any.iter().enumerate() {
        validate_element(rule, element, &format!("{path}.any.{i}"))?;
    }

    Ok(())
}

fn validate_element(
    rule: &str,
    element: &GroupElement,
    path: &str,
) -> Result<(), ValidationError> {
    match element {
        GroupElement::Group(group) => validate_group(rule, group, path),
        GroupElement::Leaf(cond) => {
            if cond.fact.is_empty() {
                return Err(ValidationError::InvalidCondition {
                    rule: rule.to_string(),
                    path: format!("{path}.fact"),
                    reason: String::from("fact name must not be empty"),
                });
            }
            let ty = cond.value.data_type();
            if !cond.operator.accepts(ty) {
                return Err(ValidationError::InvalidCondition {
                    rule: rule.to_string(),
                    path: format!("{path}.value"),
                    reason: format!(
                        "operator {} is not compatible with {} values",
                        cond.operator, ty
                    ),
                });
            }
            Ok(())
        }
    }
}

fn validate_action(rule: &str, action: &Action, path: &str) -> Result<(), ValidationError> {
    if action.action_type.is_empty() {
        return Err(ValidationError::InvalidAction {
            rule: rule.to_string(),
            path: format!("{path}.type"),
            reason: String::from("action type must not be empty"),
        });
    }
    if action.target.is_empty() {
        return Err(ValidationError::InvalidAction {
            rule: rule.to_string(),
            path: format!("{path}.target"),
            reason: String::from("action target must not be empty"),
        });
    }
    if let ActionValue::Script(script) = &action.value {
        if script.script.is_empty() {
            return Err(ValidationError::InvalidAction {
                rule: rule.to_string(),
                path: format!("{path}.value.script"),
                reason: String::from("script name must not be empty"),
            });
        }
    }
    Ok(())
}
