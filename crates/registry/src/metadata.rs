// SPDX-License-Identifier: MIT

//! Per-project metadata persisted inside the project directory, per spec
//! §3/§6 — `last_port` biases future port selection for the same project.

use chrono::{DateTime, Utc};
use fleet_core::FleetError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const METADATA_FILENAME: &str = ".studio-metadata.json";

/// `{ project_name, project_path, created_port, last_port, last_launched }`
/// at `<project>/.studio-metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_name: String,
    pub project_path: String,
    pub created_port: u16,
    pub last_port: u16,
    pub last_launched: DateTime<Utc>,
}

pub fn metadata_path(project_path: &Path) -> PathBuf {
    project_path.join(METADATA_FILENAME)
}

/// Missing or unparseable metadata is treated as "no metadata", matching
/// the registry document's "missing file -> empty" tolerance in spec §6.
pub fn load(project_path: &Path) -> Option<ProjectMetadata> {
    let contents = std::fs::read_to_string(metadata_path(project_path)).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Writes `last_port`/`last_launched` after a successful launch, per spec
/// §4.4 — on a metadata miss, creates the file with the actually-assigned
/// port as both `created_port` and `last_port`, per invariant 6 ("only
/// ever overwritten by a successful launch of that project").
pub fn record_launch(project_path: &Path, project_name: &str, port: u16) -> Result<(), FleetError> {
    let path = metadata_path(project_path);
    let mut meta = load(project_path).unwrap_or_else(|| ProjectMetadata {
        project_name: project_name.to_string(),
        project_path: project_path.display().to_string(),
        created_port: port,
        last_port: port,
        last_launched: Utc::now(),
    });
    meta.last_port = port;
    meta.last_launched = Utc::now();

    let json = serde_json::to_string_pretty(&meta)
        .map_err(|e| FleetError::persistence(path.display().to_string(), e))?;
    std::fs::write(&path, json).map_err(|e| FleetError::persistence(path.display().to_string(), e))
}
