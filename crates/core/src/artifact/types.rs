use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverError;
use crate::output::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Screenshot before acting.
    Before,
    /// Screenshot after a verified action.
    After,
    /// Page source, kept for debugging failures.
    HtmlSnapshot,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Before => "before",
            ArtifactKind::After => "after",
            ArtifactKind::HtmlSnapshot => "html-snapshot",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Before | ArtifactKind::After => "png",
            ArtifactKind::HtmlSnapshot => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Before | ArtifactKind::After => "image/png",
            ArtifactKind::HtmlSnapshot => "text/html; charset=utf-8",
        }
    }
}

/// Where a captured blob was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub key: String,
    pub kind: ArtifactKind,
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the blob.
    pub sha256: String,
}

/// Artifacts attached to one listing (or to the run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<ArtifactRef>,
}

impl ArtifactRefs {
    pub fn set(&mut self, artifact: ArtifactRef) {
        match artifact.kind {
            ArtifactKind::Before => self.before = Some(artifact),
            ArtifactKind::After => self.after = Some(artifact),
            ArtifactKind::HtmlSnapshot => self.html = Some(artifact),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.after.is_none() && self.html.is_none()
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Capture failed: {0}")]
    Driver(#[from] DriverError),

    #[error("Storing artifact failed: {0}")]
    Store(#[from] StoreError),
}
