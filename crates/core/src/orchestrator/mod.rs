//! Run orchestrator.
//!
//! The orchestrator owns the session for the length of a run and drives it
//! through `Init → Authenticating → Cataloging → Selecting → Executing →
//! Finalizing → Done`, or to `Aborted` on a fatal error:
//! - **Execution**: sequential, one listing at a time, in catalog order
//! - **Cancellation**: cooperative; deadline and operator abort are checked
//!   at listing boundaries

mod runner;
mod types;

pub use runner::{record_setup_failure, RunOrchestrator};
pub use types::{
    Checkpoint, RunAbortHandle, RunCounts, RunState, RunSummary, StateTransition,
};
