//! Project files: the targets to create and the scripts to load.
//!
//! ```json
//! {
//!   "targets": [{ "id": "stage", "name": "Stage", "isStage": true },
//!               { "id": "cat", "name": "Cat", "x": 10 }],
//!   "scripts": { "cat": { "event_whenflagclicked": ["motion_movesteps STEPS=10"] } }
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::linker::ScriptBatch;
use crate::runtime::ids::TargetId;
use crate::runtime::stage::TargetSpec;

/// Project loading errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed project: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate target id {0}")]
    DuplicateTarget(TargetId),
    #[error("A project has at most one stage")]
    MultipleStages,
}

/// A parsed project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub scripts: ScriptBatch,
}

impl Project {
    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        let project: Project = serde_json::from_str(text)?;
        project.validate()?;
        Ok(project)
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ProjectError> {
        let mut seen = HashSet::new();
        for spec in &self.targets {
            if !seen.insert(&spec.id) {
                return Err(ProjectError::DuplicateTarget(spec.id.clone()));
            }
        }
        if self.targets.iter().filter(|t| t.is_stage).count() > 1 {
            return Err(ProjectError::MultipleStages);
        }
        Ok(())
    }
}
