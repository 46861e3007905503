//! culvert-state — persistence for the Culvert control plane.
//!
//! A single redb database holds every table the control plane needs:
//! the relational-style rows (users, lambdas, executions, sinks, tasks,
//! task results) and the compiler's object tables (compile requests,
//! WASM artifacts, function metadata). All access goes through
//! [`StateStore`]; no component sees another's raw collections.

mod error;
mod store;
mod tables;
mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
