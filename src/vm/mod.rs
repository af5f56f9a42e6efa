//! # Virtual Machine
//!
//! Single-threaded interpreter over the compiled instruction stream.
//! Evaluation starts at a rule's recorded entry offset and runs until
//! `RULE_END`, carrying a small per-rule state: the last loaded fact, the
//! last loaded constant, the latest comparison result, and a
//! partially-built action record.
//!
//! Recoverable conditions never fault: a missing fact or a type-mismatched
//! comparison yields `false`, a failed action is recorded and the next
//! action still runs, an unknown opcode is logged and skipped (single
//! byte) for forward compatibility. Only structurally impossible streams
//! (operand overruns, jumps out of the artifact) are fatal.

use crate::bytecode::loader::Engine;
use crate::bytecode::{CompareOp, DecodeError, Instruction, HEADER_SIZE};
use crate::script::{Bindings, ScriptEngine};
use crate::store::FactStore;
use crate::value::{DataType, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default per-call script timeout.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Fatal interpreter errors. Everything recoverable is folded into
/// comparison results or action records instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    #[error("corrupt bytecode at offset {offset}: {reason}")]
    BytecodeCorrupt { offset: usize, reason: String },
}

/// Read-only view of facts during one rule evaluation.
pub trait FactSnapshot {
    fn fact(&self, name: &str) -> Option<Value>;
}

impl FactSnapshot for HashMap<String, Value> {
    fn fact(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Outgoing message delivery for `sendMessage` actions.
pub trait Messenger: Send + Sync {
    fn send(&self, target: &str, value: &Value) -> Result<(), String>;
}

/// Default messenger: logs deliveries and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn send(&self, target: &str, value: &Value) -> Result<(), String> {
        info!(%target, %value, "message delivered");
        Ok(())
    }
}

/// What happened to one action of a matched rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Ok,
    Failed(String),
}

/// Record of one executed (or attempted) action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub action_type: String,
    pub target: String,
    /// The resolved value; `None` when a script value failed to resolve.
    pub value: Option<Value>,
    pub outcome: ActionOutcome,
}

/// Per-rule evaluation report.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule: String,
    pub matched: bool,
    pub actions: Vec<ActionRecord>,
}

/// The interpreter. Holds read-only references to the loaded engine and
/// the runtime collaborators; per-rule state lives on the stack of
/// [`Vm::evaluate_rule`].
pub struct Vm<'a> {
    engine: &'a Engine,
    store: &'a dyn FactStore,
    messenger: &'a dyn Messenger,
    scripts: Option<&'a dyn ScriptEngine>,
    script_timeout: Duration,
}

#[derive(Default)]
struct PendingAction {
    action_type: Option<String>,
    target: Option<String>,
    value: Option<Value>,
    failure: Option<String>,
}

impl<'a> Vm<'a> {
    pub fn new(engine: &'a Engine, store: &'a dyn FactStore, messenger: &'a dyn Messenger) -> Self {
        Vm {
            engine,
            store,
            messenger,
            scripts: None,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Attach a scripting collaborator for `ACTION_VALUE_SCRIPT` operands.
    pub fn with_scripts(mut self, scripts: &'a dyn ScriptEngine) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Override the per-call script timeout.
    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Evaluate one rule against a fact snapshot.
    pub fn evaluate_rule(
        &self,
        rule_name: &str,
        snapshot: &dyn FactSnapshot,
    ) -> Result<RuleReport, RuntimeError> {
        let entry = self
            .engine
            .rule_offset(rule_name)
            .ok_or_else(|| RuntimeError::UnknownRule(rule_name.to_string()))?;
        let bytes = self.engine.bytes();

        let mut ip = entry as usize;
        let mut last_fact: Option<Value> = None;
        let mut last_const: Option<Value> = None;
        let mut cmp = false;
        let mut pending = PendingAction::default();
        let mut report = RuleReport {
            rule: rule_name.to_string(),
            matched: false,
            actions: Vec::new(),
        };

        // A rule block visits each instruction at most once; more steps
        // than bytes in the artifact means the stream loops.
        let mut budget = bytes.len();

        loop {
            if ip >= bytes.len() {
                return Err(RuntimeError::BytecodeCorrupt {
                    offset: ip,
                    reason: String::from("execution ran off the end of the artifact"),
                });
            }
            if budget == 0 {
                return Err(RuntimeError::BytecodeCorrupt {
                    offset: ip,
                    reason: String::from("instruction budget exhausted"),
                });
            }
            budget -= 1;

            let (instruction, width) = match Instruction::decode(bytes, ip) {
                Ok(decoded) => decoded,
                Err(DecodeError::UnknownOpcode { opcode, offset }) => {
                    warn!(opcode, offset, "skipping unknown opcode");
                    ip += 1;
                    continue;
                }
                Err(e) => {
                    return Err(RuntimeError::BytecodeCorrupt {
                        offset: ip,
                        reason: e.to_string(),
                    });
                }
            };
            ip += width;

            match instruction {
                Instruction::RuleStart { name } => {
                    if name != rule_name {
                        warn!(expected = rule_name, found = %name, "RULE_START name mismatch");
                    }
                }
                Instruction::RuleEnd => break,
                Instruction::LoadFact { fact, .. } => {
                    last_fact = snapshot.fact(&fact);
                }
                Instruction::LoadConst { value } => {
                    last_const = Some(value);
                }
                Instruction::Compare { ty, op } => {
                    cmp = compare(ty, op, last_fact.as_ref(), last_const.as_ref());
                }
                Instruction::Jump { offset } => {
                    ip = self.jump(ip, offset)?;
                }
                Instruction::JumpIfTrue { offset } => {
                    if cmp {
                        ip = self.jump(ip, offset)?;
                    }
                }
                Instruction::JumpIfFalse { offset } => {
                    if !cmp {
                        ip = self.jump(ip, offset)?;
                    }
                }
                Instruction::ActionStart => {
                    report.matched = true;
                    pending = PendingAction::default();
                }
                Instruction::ActionType { name } => pending.action_type = Some(name),
                Instruction::ActionTarget { name } => pending.target = Some(name),
                Instruction::ActionValue { value } => pending.value = Some(value),
                Instruction::ActionValueScript { script, params } => {
                    match self.resolve_script_value(&script, &params, snapshot) {
                        Ok(value) => pending.value = Some(value),
                        Err(reason) => {
                            warn!(script = %script, %reason, "script value failed");
                            pending.failure = Some(reason);
                        }
                    }
                }
                Instruction::ActionEnd => {
                    let record = self.execute_action(std::mem::take(&mut pending));
                    report.actions.push(record);
                }
            }
        }

        Ok(report)
    }

    fn jump(&self, after: usize, offset: i32) -> Result<usize, RuntimeError> {
        let target = after as i64 + i64::from(offset);
        let len = self.engine.bytes().len() as i64;
        if target < HEADER_SIZE as i64 || target >= len {
            return Err(RuntimeError::BytecodeCorrupt {
                offset: after,
                reason: format!("jump target {target} outside the artifact"),
            });
        }
        Ok(target as usize)
    }

    fn resolve_script_value(
        &self,
        script: &str,
        params: &[String],
        snapshot: &dyn FactSnapshot,
    ) -> Result<Value, String> {
        let engine = self
            .scripts
            .ok_or_else(|| String::from("no scripting engine configured"))?;
        let mut bindings = Bindings::new();
        for param in params {
            if let Some(value) = snapshot.fact(param) {
                bindings.insert(param.clone(), value);
            }
        }
        engine
            .run_script(script, &bindings, self.script_timeout)
            .map_err(|e| e.to_string())
    }

    fn execute_action(&self, pending: PendingAction) -> ActionRecord {
        let action_type = pending.action_type.unwrap_or_default();
        let target = pending.target.unwrap_or_default();

        let mut record = ActionRecord {
            action_type: action_type.clone(),
            target: target.clone(),
            value: pending.value.clone(),
            outcome: ActionOutcome::Ok,
        };

        if let Some(reason) = pending.failure {
            record.outcome = ActionOutcome::Failed(reason);
            return record;
        }
        let Some(value) = pending.value else {
            record.outcome = ActionOutcome::Failed(String::from("action has no value"));
            return record;
        };

        let result = match action_type.as_str() {
            "updateStore" => self
                .store
                .set_and_publish(&target, value)
                .map_err(|e| e.to_string()),
            "sendMessage" => self.messenger.send(&target, &value),
            other => Err(format!("unknown action type '{other}'")),
        };
        if let Err(reason) = result {
            warn!(action = %action_type, %target, %reason, "action failed");
            record.outcome = ActionOutcome::Failed(reason);
        } else {
            debug!(action = %action_type, %target, "action executed");
        }
        record
    }
}

/// Strict type-tagged comparison. Both operands must be present and carry
/// exactly the opcode's type; anything else is `false`, never a fault.
fn compare(ty: DataType, op: CompareOp, fact: Option<&Value>, constant: Option<&Value>) -> bool {
    let (Some(fact), Some(constant)) = (fact, constant) else {
        return false;
    };
    if fact.data_type() != ty || constant.data_type() != ty {
        return false;
    }
    match (fact, constant) {
        (Value::Int(a), Value::Int(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Lte => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Gte => a >= b,
            CompareOp::Contains | CompareOp::NotContains => false,
        },
        (Value::Float(a), Value::Float(b)) => match op {
            // Every comparison involving NaN is false, NEQ included.
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b && !a.is_nan() && !b.is_nan(),
            CompareOp::Lt => a < b,
            CompareOp::Lte => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Gte => a >= b,
            CompareOp::Contains | CompareOp::NotContains => false,
        },
        (Value::String(a), Value::String(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b,
            CompareOp::Contains => a.contains(b.as_str()),
            CompareOp::NotContains => !a.contains(b.as_str()),
            _ => false,
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::loader::load;
    use crate::bytecode::{push_index_str, Header, Opcode};
    use crate::compiler::compile_ruleset;
    use crate::ruleset::Ruleset;
    use crate::script::ScriptRegistry;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;
    use std::cell::RefCell;

    fn engine_for(doc: &str) -> Engine {
        let ruleset = Ruleset::from_json(doc).unwrap();
        load(compile_ruleset(&ruleset).unwrap()).unwrap()
    }

    fn snapshot(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    const TEMP_RULE: &str = r#"{
        "rules": [{
            "name": "rule-1",
            "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
            "actions": [{ "type": "updateStore", "target": "temperature_status", "value": true }]
        }]
    }"#;

    #[test]
    fn test_match_executes_action() {
        let engine = engine_for(TEMP_RULE);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(30.11))]))
            .unwrap();
        assert!(report.matched);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].outcome, ActionOutcome::Ok);
        assert_eq!(
            store.get("temperature_status"),
            Ok(Some(Value::Bool(true)))
        );
    }

    #[test]
    fn test_no_match_no_action() {
        let engine = engine_for(TEMP_RULE);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(12.0))]))
            .unwrap();
        assert!(!report.matched);
        assert!(report.actions.is_empty());
        assert_eq!(store.get("temperature_status"), Ok(None));
    }

    #[test]
    fn test_missing_fact_is_false() {
        let engine = engine_for(TEMP_RULE);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm.evaluate_rule("rule-1", &snapshot(&[])).unwrap();
        assert!(!report.matched);
    }

    #[test]
    fn test_type_isolation() {
        let engine = engine_for(TEMP_RULE);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        // A string-valued fact against a float comparison: false, no fault.
        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::from("hot"))]))
            .unwrap();
        assert!(!report.matched);

        // Int is never silently widened to Float.
        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Int(100))]))
            .unwrap();
        assert!(!report.matched);
    }

    #[test]
    fn test_unknown_rule() {
        let engine = engine_for(TEMP_RULE);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);
        assert_eq!(
            vm.evaluate_rule("nope", &snapshot(&[])).unwrap_err(),
            RuntimeError::UnknownRule(String::from("nope"))
        );
    }

    #[test]
    fn test_actions_execute_in_order() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
                "actions": [
                    { "type": "updateStore", "target": "temperature_status", "value": true },
                    { "type": "updateStore", "target": "alert", "value": "high temperature" }
                ]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(30.11))]))
            .unwrap();
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.actions[0].target, "temperature_status");
        assert_eq!(report.actions[1].target, "alert");
        assert_eq!(store.get("temperature_status"), Ok(Some(Value::Bool(true))));
        assert_eq!(
            store.get("alert"),
            Ok(Some(Value::from("high temperature")))
        );
    }

    #[test]
    fn test_failed_action_does_not_abort_rest() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
                "actions": [
                    { "type": "noSuchAction", "target": "x", "value": 1 },
                    { "type": "updateStore", "target": "alert", "value": true }
                ]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(31.0))]))
            .unwrap();
        assert!(matches!(report.actions[0].outcome, ActionOutcome::Failed(_)));
        assert_eq!(report.actions[1].outcome, ActionOutcome::Ok);
        assert_eq!(store.get("alert"), Ok(Some(Value::Bool(true))));
    }

    #[test]
    fn test_send_message_action() {
        #[derive(Default)]
        struct CollectingMessenger {
            sent: Mutex<Vec<(String, Value)>>,
        }
        impl Messenger for CollectingMessenger {
            fn send(&self, target: &str, value: &Value) -> Result<(), String> {
                self.sent.lock().push((target.to_string(), value.clone()));
                Ok(())
            }
        }

        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
                "actions": [{ "type": "sendMessage", "target": "ops", "value": "too hot" }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let messenger = CollectingMessenger::default();
        let vm = Vm::new(&engine, &store, &messenger);

        vm.evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(31.0))]))
            .unwrap();
        assert_eq!(
            messenger.sent.lock().as_slice(),
            &[(String::from("ops"), Value::from("too hot"))]
        );
    }

    #[test]
    fn test_script_action_value() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
                "actions": [{
                    "type": "updateStore",
                    "target": "report",
                    "value": { "script": "format_report", "params": ["temperature"] }
                }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let registry = ScriptRegistry::new();
        registry.set_script(
            "format_report",
            vec![String::from("temperature")],
            |bindings, _| {
                let t = bindings
                    .get("temperature")
                    .ok_or("temperature not bound")?;
                Ok(Value::String(format!("temperature at {t}")))
            },
        );
        let vm = Vm::new(&engine, &store, &LogMessenger).with_scripts(&registry);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(30.11))]))
            .unwrap();
        assert_eq!(report.actions[0].outcome, ActionOutcome::Ok);
        assert_eq!(
            store.get("report"),
            Ok(Some(Value::from("temperature at 30.11")))
        );
    }

    #[test]
    fn test_missing_script_is_nonfatal() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "temperature", "operator": "GT", "value": 30.1 }] },
                "actions": [{
                    "type": "updateStore",
                    "target": "report",
                    "value": { "script": "ghost", "params": [] }
                }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let registry = ScriptRegistry::new();
        let vm = Vm::new(&engine, &store, &LogMessenger).with_scripts(&registry);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("temperature", Value::Float(31.0))]))
            .unwrap();
        assert!(report.matched);
        assert_eq!(report.actions.len(), 1);
        assert!(matches!(report.actions[0].outcome, ActionOutcome::Failed(_)));
        assert_eq!(report.actions[0].value, None);
        assert_eq!(store.get("report"), Ok(None));
    }

    // ── Hand-assembled artifacts for corruption paths ───────────────────

    fn hand_artifact(instructions: Vec<u8>) -> Engine {
        let exec_entry_offset = HEADER_SIZE as u32;
        let mut index = Vec::new();
        push_index_str(&mut index, "r");
        index.extend_from_slice(&exec_entry_offset.to_le_bytes());

        let rule_exec_index_offset = HEADER_SIZE as u32 + instructions.len() as u32;
        let fact_rule_index_offset = rule_exec_index_offset + index.len() as u32;
        let header = Header {
            version: 1,
            checksum: 0,
            const_pool_size: 0,
            num_rules: 1,
            rule_exec_index_offset,
            fact_rule_index_offset,
            fact_dep_index_offset: fact_rule_index_offset,
        };
        let mut bytes = header.encode().to_vec();
        bytes.extend(instructions);
        bytes.extend(index);
        load(bytes).unwrap()
    }

    fn rule_start_r() -> Vec<u8> {
        vec![Opcode::RuleStart as u8, 1, b'r']
    }

    #[test]
    fn test_unknown_opcode_is_skipped() {
        let mut instructions = rule_start_r();
        instructions.push(0xFE); // not an opcode
        instructions.push(Opcode::RuleEnd as u8);
        let engine = hand_artifact(instructions);

        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);
        let report = vm.evaluate_rule("r", &snapshot(&[])).unwrap();
        assert!(!report.matched);
    }

    #[test]
    fn test_out_of_artifact_jump_is_fatal() {
        let mut instructions = rule_start_r();
        instructions.push(Opcode::Jump as u8);
        instructions.extend_from_slice(&1000i32.to_le_bytes());
        instructions.push(Opcode::RuleEnd as u8);
        let engine = hand_artifact(instructions);

        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);
        let err = vm.evaluate_rule("r", &snapshot(&[])).unwrap_err();
        assert!(matches!(err, RuntimeError::BytecodeCorrupt { .. }));
    }

    #[test]
    fn test_backward_jump_loop_is_fatal() {
        let mut instructions = rule_start_r();
        // Jump back onto itself: after the 5-byte jump, displace -5.
        instructions.push(Opcode::Jump as u8);
        instructions.extend_from_slice(&(-5i32).to_le_bytes());
        instructions.push(Opcode::RuleEnd as u8);
        let engine = hand_artifact(instructions);

        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);
        let err = vm.evaluate_rule("r", &snapshot(&[])).unwrap_err();
        assert!(
            matches!(err, RuntimeError::BytecodeCorrupt { ref reason, .. } if reason.contains("budget"))
        );
    }

    // ── Short-circuit observability ─────────────────────────────────────

    struct CountingSnapshot {
        inner: HashMap<String, Value>,
        loads: RefCell<Vec<String>>,
    }

    impl CountingSnapshot {
        fn new(pairs: &[(&str, Value)]) -> Self {
            CountingSnapshot {
                inner: snapshot(pairs),
                loads: RefCell::new(Vec::new()),
            }
        }
    }

    impl FactSnapshot for CountingSnapshot {
        fn fact(&self, name: &str) -> Option<Value> {
            self.loads.borrow_mut().push(name.to_string());
            self.inner.fact(name)
        }
    }

    #[test]
    fn test_allof_short_circuits() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [
                    { "fact": "a", "operator": "GT", "value": 10 },
                    { "fact": "b", "operator": "GT", "value": 10 },
                    { "fact": "c", "operator": "GT", "value": 10 }
                ] },
                "actions": [{ "type": "updateStore", "target": "x", "value": true }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let counting = CountingSnapshot::new(&[
            ("a", Value::Int(5)),
            ("b", Value::Int(20)),
            ("c", Value::Int(20)),
        ]);
        let report = vm.evaluate_rule("rule-1", &counting).unwrap();
        assert!(!report.matched);
        // First conjunct is false: b and c are never loaded.
        assert_eq!(counting.loads.borrow().as_slice(), &[String::from("a")]);
    }

    #[test]
    fn test_anyof_short_circuits() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "any": [
                    { "fact": "a", "operator": "GT", "value": 10 },
                    { "fact": "b", "operator": "GT", "value": 10 }
                ] },
                "actions": [{ "type": "updateStore", "target": "x", "value": true }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let counting = CountingSnapshot::new(&[("a", Value::Int(20)), ("b", Value::Int(20))]);
        let report = vm.evaluate_rule("rule-1", &counting).unwrap();
        assert!(report.matched);
        // First disjunct is true: b is never loaded.
        assert_eq!(counting.loads.borrow().as_slice(), &[String::from("a")]);
    }

    #[test]
    fn test_contains_semantics() {
        let doc = r#"{
            "rules": [{
                "name": "rule-1",
                "conditions": { "all": [{ "fact": "status", "operator": "CONTAINS", "value": "temp" }] },
                "actions": [{ "type": "updateStore", "target": "x", "value": true }]
            }]
        }"#;
        let engine = engine_for(doc);
        let store = MemoryStore::new();
        let vm = Vm::new(&engine, &store, &LogMessenger);

        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("status", Value::from("high temperature"))]))
            .unwrap();
        assert!(report.matched);

        // Case-sensitive.
        let report = vm
            .evaluate_rule("rule-1", &snapshot(&[("status", Value::from("high TEMPERATURE"))]))
            .unwrap();
        assert!(!report.matched);
    }

    #[test]
    fn test_compare_unit() {
        use CompareOp::*;
        let int = |v| Some(Value::Int(v));
        let float = |v| Some(Value::Float(v));

        assert!(compare(DataType::Int, Gt, int(31).as_ref(), int(30).as_ref()));
        assert!(!compare(DataType::Int, Gt, int(30).as_ref(), int(30).as_ref()));
        assert!(compare(DataType::Float, Gt, float(30.11).as_ref(), float(30.1).as_ref()));

        // Missing operand.
        assert!(!compare(DataType::Int, Eq, None, int(1).as_ref()));

        // Cross-type is always false, including NOT_CONTAINS.
        assert!(!compare(DataType::Float, Gt, int(31).as_ref(), float(30.0).as_ref()));
        assert!(!compare(
            DataType::String,
            NotContains,
            float(1.0).as_ref(),
            Some(Value::from("x")).as_ref()
        ));

        // NaN never compares true.
        assert!(!compare(DataType::Float, Eq, float(f64::NAN).as_ref(), float(f64::NAN).as_ref()));
        assert!(!compare(DataType::Float, Lt, float(f64::NAN).as_ref(), float(1.0).as_ref()));
    }
}
