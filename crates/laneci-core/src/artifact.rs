//! Build artifacts.

use serde::{Deserialize, Serialize};

/// A file produced by a lane run, e.g. `{"type": "ipa", "path": "build/App.ipa"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
        }
    }
}
