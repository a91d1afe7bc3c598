#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]
#![allow(clippy::module_name_repetitions)]

//! # Agent Safety Controller
//!
//! A governance layer that sits between an LLM coding agent's planner and
//! the tools it invokes: it watches the execution history for loops,
//! degrades what the agent is allowed to do under sustained trouble,
//! attempts automatic recovery before bothering a human, and packages
//! enough context to escalate well when automatic recovery isn't enough.
//!
//! The controller never executes a tool itself and never decides *what*
//! the agent should do next in task terms — it only decides whether the
//! agent may proceed, and how cautiously.
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`facade`]: [`facade::AgentSafetyController`], the single entry point
//!   a host embeds around every tool call
//! - [`safety_state`]: [`safety_state::SafetyState`], the per-run state the
//!   facade operates on
//! - [`config`]: [`config::AscConfig`] and its presets
//!
//! ### Analysis components
//! - [`history`]: bounded execution log
//! - [`similarity`]: structural similarity over argument trees
//! - [`cycle_detector`]: the five loop-detection layers
//! - [`degradation`]: the five-level safety state machine
//! - [`self_healing`]: recovery strategy registry and health scoring
//! - [`escalation`]: human-in-the-loop triggers and packaging
//! - [`proactive`]: pre-execution risk checks and learned error patterns
//! - [`checkpoint`]: hash-sealed state snapshots, diffing, rollback plans
//! - [`decomposer`]: task complexity scoring and subtask decomposition
//!
//! ### Support modules
//! - [`value`]: the canonical value tree every comparison and hash operates on
//! - [`error`]: the controller's error taxonomy
//! - [`constants`]: centralized defaults and magic numbers
//! - [`retry`]: generic exponential-backoff retry policy
//! - [`telemetry`]: lightweight metric primitives
//! - [`tracing`]: structured logging setup
//!
//! ## Quick Start
//!
//! ```no_run
//! use agent_safety_controller::config::AscConfig;
//! use agent_safety_controller::facade::AgentSafetyController;
//! use agent_safety_controller::history::ExecutionOutcome;
//! use agent_safety_controller::safety_state::SafetyState;
//! use agent_safety_controller::value::Value;
//!
//! let controller = AgentSafetyController::new();
//! let mut state = SafetyState::new();
//! let config = AscConfig::balanced();
//!
//! let args = Value::object([("path".to_string(), Value::String("src/lib.rs".into()))]);
//! let before = controller.before_tool(0, &state, "read_file", &args, &config);
//! if before.can_proceed {
//!     // host invokes the tool here
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod cycle_detector;
pub mod decomposer;
pub mod degradation;
pub mod error;
pub mod escalation;
pub mod facade;
pub mod history;
pub mod proactive;
pub mod retry;
pub mod safety_state;
pub mod self_healing;
pub mod similarity;
pub mod telemetry;
pub mod tracing;
pub mod value;

pub use config::AscConfig;
pub use error::{Error, ExecutionFailure, Result};
pub use facade::AgentSafetyController;
pub use safety_state::SafetyState;
pub use value::Value;
