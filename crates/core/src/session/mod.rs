//! Authentication and session liveness.

mod manager;
mod types;

pub use manager::SessionManager;
pub use types::{AuthError, Credentials, Session};
