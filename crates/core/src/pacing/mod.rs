//! Time sources and human-like pacing.
//!
//! Everything that sleeps or reads the time in the run goes through these
//! traits so tests can substitute a recording pacer and a manual clock.

mod clock;
mod pacer;

pub use clock::{Clock, Deadline, SystemClock};
pub use pacer::{jitter, HumanPacer, Pacer};
