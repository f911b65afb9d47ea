//! Verification artifacts: screenshots and page snapshots.

mod capture;
mod types;

pub use capture::{ArtifactCapture, CapturePlan};
pub use types::{ArtifactError, ArtifactKind, ArtifactRef, ArtifactRefs};
