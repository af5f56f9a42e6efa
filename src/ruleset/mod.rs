//! # Ruleset Model
//!
//! The in-memory representation of an authored ruleset document, with
//! serde derives for the JSON form.
//!
//! ## Document format
//!
//! ```json
//! {
//!   "rules": [
//!     {
//!       "name": "high-temperature",
//!       "priority": 10,
//!       "conditions": {
//!         "any": [
//!           { "fact": "pressure", "operator": "EQ", "value": 1013 },
//!           {
//!             "all": [
//!               { "fact": "temperature", "operator": "GT", "value": 30.1 },
//!               { "fact": "humidity", "operator": "LT", "value": 60 }
//!             ]
//!           }
//!         ]
//!       },
//!       "actions": [
//!         { "type": "updateStore", "target": "temperature_status", "value": true }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! A `conditions` element is either a leaf `{fact, operator, value}` or a
//! nested group; an action value is a scalar literal or a script reference
//! `{"script": "name", "params": ["fact", ...]}`.

pub mod preprocessor;
pub mod validator;

pub use preprocessor::{preprocess, Conflict};
pub use validator::{validate, ValidationError};

use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A complete authored ruleset document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub rules: Vec<Rule>,
}

impl Ruleset {
    /// Parse a ruleset from its JSON document form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize back to the JSON document form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A named rule: one top-level condition group plus an ordered action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Evaluation priority; lower numbers evaluate first. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub conditions: ConditionGroup,
    pub actions: Vec<Action>,
}

impl Rule {
    /// Every fact name referenced anywhere in this rule's conditions,
    /// sorted and deduplicated.
    pub fn referenced_facts(&self) -> BTreeSet<String> {
        let mut facts = BTreeSet::new();
        self.conditions.collect_facts(&mut facts);
        facts
    }
}

/// Nested `all`/`any` grouping of conditions. Either list may be empty but
/// not both.
///
/// Unknown fields are rejected so that a malformed leaf (e.g. a typo'd
/// operator) fails to parse instead of sliding through as an empty group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<GroupElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<GroupElement>,
}

impl ConditionGroup {
    fn collect_facts(&self, out: &mut BTreeSet<String>) {
        for element in self.all.iter().chain(self.any.iter()) {
            match element {
                GroupElement::Leaf(cond) => {
                    out.insert(cond.fact.clone());
                }
                GroupElement::Group(group) => group.collect_facts(out),
            }
        }
    }
}

/// One element of a group: a leaf comparison or a nested group.
///
/// Untagged: an object with `fact`/`operator`/`value` is a leaf, anything
/// else must parse as a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupElement {
    Leaf(Condition),
    Group(ConditionGroup),
}

/// A leaf comparison against a single fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub fact: String,
    pub operator: Operator,
    pub value: Value,
}

/// Comparison operators available in leaf conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
}

impl Operator {
    /// Operator/value type compatibility: equality accepts any scalar,
    /// ordering accepts numeric only, containment accepts string only.
    pub fn accepts(self, ty: DataType) -> bool {
        match self {
            Operator::Eq | Operator::Neq => true,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => ty.is_numeric(),
            Operator::Contains | Operator::NotContains => ty == DataType::String,
        }
    }

    /// The document-form spelling of this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action fired when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action kind: `updateStore` or `sendMessage`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Fact key or message address.
    pub target: String,
    pub value: ActionValue,
}

/// Action value: a literal scalar or a reference to a named script whose
/// result becomes the value at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Literal(Value),
    Script(ScriptRef),
}

/// Reference to a named script; `params` are fact names bound from the
/// evaluation snapshot when the action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub script: String,
    #[serde(default)]
    pub params: Vec<String>,
}
