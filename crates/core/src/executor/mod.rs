//! Dispatching renew/repost actions with retries and verification.

mod action;
mod types;
mod verifier;

pub use action::ActionExecutor;
pub use types::{ActionError, Execution, ExecutionContext};
pub use verifier::{ActionVerifier, AffordanceVerifier, StatusVerifier};
