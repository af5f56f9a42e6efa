//! # Dispatcher
//!
//! Fans a fact update out to the rules that reference it. On each update:
//! write-through to the store, look up the impacted rules in the
//! fact->rules index, build a per-rule snapshot with a batched `mget` of
//! exactly the facts that rule reads, and invoke the VM once per rule in
//! evaluation order.
//!
//! The run loop is single-threaded: updates arrive over a
//! crossbeam channel, `recv_timeout` doubles as the housekeeping tick,
//! and shutdown is a cooperative flag checked between rules.

use crate::bytecode::loader::Engine;
use crate::script::ScriptEngine;
use crate::store::{FactStore, FactUpdate};
use crate::value::Value;
use crate::vm::{LogMessenger, Messenger, RuleReport, RuntimeError, Vm, DEFAULT_SCRIPT_TIMEOUT};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters accumulated across the dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub updates_processed: u64,
    pub rules_evaluated: u64,
    pub rules_matched: u64,
    pub actions_executed: u64,
}

/// Handle for stopping a running dispatcher from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Request shutdown. The dispatcher finishes the current rule and
    /// returns.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Dispatches fact updates to the VM.
pub struct Dispatcher {
    engine: Arc<Engine>,
    store: Arc<dyn FactStore>,
    messenger: Arc<dyn Messenger>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    script_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    stats: Mutex<DispatchStats>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn FactStore>) -> Self {
        Dispatcher {
            engine,
            store,
            messenger: Arc::new(LogMessenger),
            scripts: None,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    /// Replace the messenger used for `sendMessage` actions.
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    /// Attach a scripting collaborator.
    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        *self.stats.lock()
    }

    /// Handle one fact update. Returns the per-rule reports, in
    /// evaluation order. Fatal VM errors propagate; everything else is
    /// logged and absorbed.
    pub fn on_fact_update(&self, key: &str, value: Value) -> Result<Vec<RuleReport>, RuntimeError> {
        if let Err(e) = self.store.set(key, value.clone()) {
            warn!(%key, error = %e, "write-through failed");
        }
        self.stats.lock().updates_processed += 1;

        let rules = self.engine.rules_for_fact(key);
        if rules.is_empty() {
            debug!(%key, "no rules reference fact");
            return Ok(Vec::new());
        }

        let mut vm = Vm::new(self.engine.as_ref(), self.store.as_ref(), self.messenger.as_ref())
            .with_script_timeout(self.script_timeout);
        if let Some(scripts) = &self.scripts {
            vm = vm.with_scripts(scripts.as_ref());
        }

        let mut reports = Vec::with_capacity(rules.len());
        for rule in rules {
            if self.shutdown.load(Ordering::Relaxed) {
                info!(%rule, "shutdown requested, stopping before rule");
                break;
            }

            let needed = self.engine.facts_for_rule(rule);
            let snapshot = match self.store.mget(needed) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(%rule, error = %e, "snapshot fetch failed, skipping rule");
                    continue;
                }
            };

            let report = vm.evaluate_rule(rule, &snapshot)?;
            debug!(
                rule = %report.rule,
                matched = report.matched,
                actions = report.actions.len(),
                "rule evaluated"
            );

            let mut stats = self.stats.lock();
            stats.rules_evaluated += 1;
            if report.matched {
                stats.rules_matched += 1;
            }
            stats.actions_executed += report.actions.len() as u64;
            drop(stats);

            reports.push(report);
        }

        Ok(reports)
    }

    /// Consume updates until the channel closes or shutdown is requested.
    /// `interval` is the housekeeping cadence: when no update arrives
    /// within it, the dispatcher logs its counters and keeps waiting.
    pub fn run(
        &self,
        updates: &Receiver<FactUpdate>,
        interval: Duration,
    ) -> Result<(), RuntimeError> {
        info!(rules = self.engine.num_rules(), "dispatcher started");
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            match updates.recv_timeout(interval) {
                Ok(update) => {
                    debug!(key = %update.key, channel = %update.channel, "update received");
                    self.on_fact_update(&update.key, update.value)?;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let stats = self.stats();
                    debug!(
                        updates = stats.updates_processed,
                        evaluated = stats.rules_evaluated,
                        matched = stats.rules_matched,
                        actions = stats.actions_executed,
                        "housekeeping tick"
                    );
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("dispatcher stopped");
        Ok(())
    }
}
