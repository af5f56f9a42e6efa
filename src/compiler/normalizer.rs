//! Condition tree normalization.
//!
//! Converts the authored `all`/`any` grouping into a canonical tree of
//! conjunctive and disjunctive nodes with leaf comparisons:
//!
//! - a group with both lists present lowers as
//!   `AllOf(all_children ++ [AnyOf(any_children)])`;
//! - a single-child `AllOf`/`AnyOf` collapses to its child;
//! - child ordering is preserved, so authored short-circuit order
//!   survives into the generated code.

use super::CompileError;
use crate::ruleset::{Condition, ConditionGroup, GroupElement};

/// Canonical condition tree, used only during compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    AllOf(Vec<ConditionNode>),
    AnyOf(Vec<ConditionNode>),
    Leaf(Condition),
}

/// Normalize a rule's top-level group into a canonical tree.
pub fn normalize(rule: &str, group: &ConditionGroup) -> Result<ConditionNode, CompileError> {
    let all = normalize_elements(rule, &group.all)?;
    let any = normalize_elements(rule, &group.any)?;

    let node = match (all.is_empty(), any.is_empty()) {
        (true, true) => return Err(CompileError::EmptyGroup { rule: rule.to_string() }),
        (false, true) => ConditionNode::AllOf(all),
        (true, false) => ConditionNode::AnyOf(any),
        (false, false) => {
            let mut children = all;
            children.push(collapse(ConditionNode::AnyOf(any)));
            ConditionNode::AllOf(children)
        }
    };
    Ok(collapse(node))
}

fn normalize_elements(
    rule: &str,
    elements: &[GroupElement],
) -> Result<Vec<ConditionNode>, CompileError> {
    elements
        .iter()
        .map(|element| match element {
            GroupElement::Leaf(cond) => Ok(ConditionNode::Leaf(cond.clone())),
            GroupElement::Group(group) => normalize(rule, group),
        })
        .collect()
}

fn collapse(node: ConditionNode) -> ConditionNode {
    match node {
        ConditionNode::AllOf(mut children) | ConditionNode::AnyOf(mut children)
            if children.len() == 1 =>
        {
            // Children were already normalized recursively; one level of
            // collapse is enough here.
            children.remove(0)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::Operator;
    use crate::value::Value;

    fn leaf(fact: &str) -> GroupElement {
        GroupElement::Leaf(Condition {
            fact: fact.to_string(),
            operator: Operator::Eq,
            value: Value::Int(1),
        })
    }

    fn leaf_node(fact: &str) -> ConditionNode {
        ConditionNode::Leaf(Condition {
            fact: fact.to_string(),
            operator: Operator::Eq,
            value: Value::Int(1),
        })
    }

    #[test]
    fn test_all_only() {
        let group = ConditionGroup {
            all: vec![leaf("a"), leaf("b")],
            any: vec![],
        };
        let node = normalize("r", &group).unwrap();
        assert_eq!(node, ConditionNode::AllOf(vec![leaf_node("a"), leaf_node("b")]));
    }

    #[test]
    fn test_any_only() {
        let group = ConditionGroup {
            all: vec![],
            any: vec![leaf("a"), leaf("b")],
        };
        let node = normalize("r", &group).unwrap();
        assert_eq!(node, ConditionNode::AnyOf(vec![leaf_node("a"), leaf_node("b")]));
    }

    #[test]
    fn test_mixed_appends_anyof() {
        let group = ConditionGroup {
            all: vec![leaf("a"), leaf("b")],
            any: vec![leaf("c"), leaf("d")],
        };
        let node = normalize("r", &group).unwrap();
        assert_eq!(
            node,
            ConditionNode::AllOf(vec![
                leaf_node("a"),
                leaf_node("b"),
                ConditionNode::AnyOf(vec![leaf_node("c"), leaf_node("d")]),
            ])
        );
    }

    #[test]
    fn test_single_child_collapses() {
        let group = ConditionGroup {
            all: vec![leaf("a")],
            any: vec![],
        };
        assert_eq!(normalize("r", &group).unwrap(), leaf_node("a"));

        // A single-element any list inside a mixed group collapses too.
        let group = ConditionGroup {
            all: vec![leaf("a")],
            any: vec![leaf("b")],
        };
        assert_eq!(
            normalize("r", &group).unwrap(),
            ConditionNode::AllOf(vec![leaf_node("a"), leaf_node("b")])
        );
    }

    #[test]
    fn test_nested_group() {
        let group = ConditionGroup {
            all: vec![],
            any: vec![
                leaf("pressure"),
                GroupElement::Group(ConditionGroup {
                    all: vec![leaf("temperature"), leaf("humidity")],
                    any: vec![],
                }),
            ],
        };
        let node = normalize("r", &group).unwrap();
        assert_eq!(
            node,
            ConditionNode::AnyOf(vec![
                leaf_node("pressure"),
                ConditionNode::AllOf(vec![leaf_node("temperature"), leaf_node("humidity")]),
            ])
        );
    }

    #[test]
    fn test_empty_group_fails() {
        let group = ConditionGroup::default();
        assert!(matches!(
            normalize("r", &group),
            Err(CompileError::EmptyGroup { .. })
        ));
    }
}
