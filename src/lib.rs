//! # Reflex Rule Engine
//!
//! A rule engine for reactive, fact-driven automation. Declarative rules
//! (conditions over named facts plus a list of actions) compile into a
//! compact binary bytecode; at runtime the engine re-evaluates exactly
//! the rules a fact update touches and executes their actions, which may
//! update further facts.
//!
//! ## Pipeline Architecture
//!
//! ### Compile time
//! ```text
//! Ruleset JSON
//!     ↓
//! [Model + Validator]      → validated Ruleset
//!     ↓
//! [Preprocessor]           → deduplicated/merged rules (optional)
//!     ↓
//! [Normalizer]             → canonical AllOf/AnyOf/Leaf tree
//!     ↓
//! [Code Generator]         → label-carrying instruction list
//!     ↓
//! [Peephole Optimizer]     → short-circuit jumps, no redundancies
//!     ↓
//! [Assembler]              → binary artifact (header + code + 3 indices)
//! ```
//!
//! ### Run time
//! ```text
//! artifact → [Loader] → Engine
//!                          ↓
//! fact update → [Dispatcher] → fact->rules index → [VM] per rule
//!                                                     ↓
//!                                     actions → store writes / messages
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reflex::{compile_ruleset, load, Dispatcher, MemoryStore, Ruleset, Value};
//! use std::sync::Arc;
//!
//! let ruleset = Ruleset::from_json(document)?;
//! let artifact = compile_ruleset(&ruleset)?;
//!
//! let engine = Arc::new(load(artifact)?);
//! let store = Arc::new(MemoryStore::new());
//! let dispatcher = Dispatcher::new(engine, store);
//!
//! let reports = dispatcher.on_fact_update("temperature", Value::Float(30.11))?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Typed scalar values and literal parsing |
//! | `ruleset` | Authored rule model, validation, preprocessing |
//! | `compiler` | Normalize → lower → peephole → assemble |
//! | `bytecode` | Opcodes, operand codecs, artifact loading |
//! | `vm` | Bytecode interpreter and action execution |
//! | `dispatcher` | Fact-update fan-out and the run loop |
//! | `store` | External store contract + in-memory reference |
//! | `script` | Scripting collaborator contract |
//! | `config` | Hierarchical configuration |

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod dispatcher;
pub mod ruleset;
pub mod script;
pub mod store;
pub mod value;
pub mod vm;

// Re-export the public surface
pub use bytecode::loader::{load, Engine, LoadError};
pub use compiler::{compile_ruleset, compile_with_options, CompileError, CompileOptions};
pub use config::Config;
pub use dispatcher::{DispatchStats, Dispatcher, ShutdownHandle};
pub use ruleset::{preprocess, validate, Ruleset, ValidationError};
pub use script::{ScriptEngine, ScriptError, ScriptRegistry};
pub use store::{FactStore, FactUpdate, MemoryStore, StoreError};
pub use value::{DataType, Value};
pub use vm::{ActionOutcome, ActionRecord, RuleReport, RuntimeError, Vm};
