//! Structured run events.
//!
//! Components emit `RunEvent`s through a cloneable `EventHandle`; a
//! background `EventWriter` appends them to an `EventStore` and reports
//! which runs were persisted through to `run_finished`.

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
