//! # Scripting Interface
//!
//! Contract for computed action values. A rule action may reference a
//! named script; at execution time the VM binds the declared parameter
//! facts from the evaluation snapshot, invokes the engine with a per-call
//! timeout, and uses the result as the action's literal value.
//!
//! The VM's correctness does not depend on any particular scripting
//! runtime: everything goes through the [`ScriptEngine`] trait. The
//! [`ScriptRegistry`] reference implementation hosts native Rust
//! functions. Timeout enforcement is two-sided: the registry runs each
//! body on a worker thread and waits on the result channel for at most
//! the allowed duration, and the body receives a [`Deadline`] it can poll
//! to stop doing work once the caller has given up on it.

use crate::value::Value;
use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Scripting errors. A timeout is a non-fatal action failure from the
/// VM's point of view: logged, and the action skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script not found: {0}")]
    NotFound(String),

    #[error("script '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("script '{name}' failed: {reason}")]
    Runtime { name: String, reason: String },
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Bindings passed to a script invocation: fact name to current value.
pub type Bindings = HashMap<String, Value>;

/// The scripting collaborator contract.
pub trait ScriptEngine: Send + Sync {
    /// Run a named script against `bindings`, bounded by `timeout`.
    ///
    /// Must produce a finite numeric, string, or boolean value; `Inf` and
    /// `NaN` are runtime errors.
    fn run_script(&self, name: &str, bindings: &Bindings, timeout: Duration)
        -> ScriptResult<Value>;
}

/// The time budget handed to a running script body.
///
/// `expired` turns true once the wall-clock cutoff passes, or earlier if
/// the registry stopped waiting for the result. Bodies that loop or block
/// should poll it and bail out; the registry reports the timeout to the
/// caller either way, so a body that ignores its deadline only wastes its
/// own worker thread.
#[derive(Clone)]
pub struct Deadline {
    cutoff: Instant,
    abandoned: Arc<AtomicBool>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            cutoff: Instant::now() + timeout,
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Has the budget run out (or the caller stopped waiting)?
    pub fn expired(&self) -> bool {
        self.abandoned.load(Ordering::Relaxed) || Instant::now() >= self.cutoff
    }

    /// Time left before the cutoff; zero once expired.
    pub fn remaining(&self) -> Duration {
        if self.abandoned.load(Ordering::Relaxed) {
            return Duration::ZERO;
        }
        self.cutoff.saturating_duration_since(Instant::now())
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::Relaxed);
    }
}

/// Native script body. Receives the bindings and its time budget;
/// long-running bodies should poll `deadline.expired()`.
pub type ScriptFn =
    Arc<dyn Fn(&Bindings, &Deadline) -> Result<Value, String> + Send + Sync>;

struct RegisteredScript {
    params: Vec<String>,
    body: ScriptFn,
}

/// Reference `ScriptEngine` hosting native functions.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: RwLock<HashMap<String, RegisteredScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        ScriptRegistry::default()
    }

    /// Register (or replace) a script under `name`. `params` declares the
    /// fact names the script expects bound.
    pub fn set_script<F>(&self, name: impl Into<String>, params: Vec<String>, body: F)
    where
        F: Fn(&Bindings, &Deadline) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.scripts.write().insert(
            name.into(),
            RegisteredScript {
                params,
                body: Arc::new(body),
            },
        );
    }

    /// Declared parameters of a registered script.
    pub fn params(&self, name: &str) -> Option<Vec<String>> {
        self.scripts.read().get(name).map(|s| s.params.clone())
    }
}

impl ScriptEngine for ScriptRegistry {
    fn run_script(
        &self,
        name: &str,
        bindings: &Bindings,
        timeout: Duration,
    ) -> ScriptResult<Value> {
        let body = {
            let scripts = self.scripts.read();
            let script = scripts
                .get(name)
                .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;
            Arc::clone(&script.body)
        };

        let deadline = Deadline::after(timeout);
        let (tx, rx) = bounded(1);
        let worker = {
            let deadline = deadline.clone();
            let bindings = bindings.clone();
            move || {
                let _ = tx.send(body(&bindings, &deadline));
            }
        };
        thread::spawn(worker);

        match rx.recv_timeout(timeout) {
            Ok(Ok(Value::Float(x))) if !x.is_finite() => Err(ScriptError::Runtime {
                name: name.to_string(),
                reason: format!("non-finite result {x}"),
            }),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(ScriptError::Runtime {
                name: name.to_string(),
                reason,
            }),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                // Tell the (possibly still spinning) body nobody is
                // listening anymore.
                deadline.abandon();
                Err(ScriptError::Timeout {
                    name: name.to_string(),
                    timeout,
                })
            }
        }
    }
}
