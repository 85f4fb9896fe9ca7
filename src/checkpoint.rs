//! Incremental sync state.
//!
//! After a clean run the highest Zotero library version seen is stored per
//! library. The next run passes it as `since` so only items modified after
//! it are fetched. A checkpoint is tied to a scope hash of the sync
//! selection (kinds and color filter); widening the selection invalidates it
//! because the newly selected items may be older than the stored version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::SyncResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u64,
    pub scope: String,
    pub updated_at: DateTime<Utc>,
}

/// Contents of the state file: one checkpoint per library label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub libraries: BTreeMap<String, Checkpoint>,
}

impl SyncState {
    /// Read the state file; a missing file is an empty state.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Stored version for `library`, if it was recorded with the same scope.
    pub fn since(&self, library: &str, scope: &str) -> Option<u64> {
        self.libraries
            .get(library)
            .filter(|c| c.scope == scope)
            .map(|c| c.version)
    }

    pub fn advance(&mut self, library: &str, scope: &str, version: u64) {
        self.libraries.insert(
            library.to_string(),
            Checkpoint {
                version,
                scope: scope.to_string(),
                updated_at: Utc::now(),
            },
        );
    }
}

/// Hash of everything that decides which items a run selects.
pub fn scope_hash(include_annotations: bool, include_notes: bool, filter_colors: &[String]) -> String {
    let mut colors: Vec<String> = filter_colors
        .iter()
        .map(|c| crate::normalize::color_name(c))
        .collect();
    colors.sort();
    colors.dedup();

    let mut hasher = Sha256::new();
    hasher.update([include_annotations as u8, include_notes as u8]);
    for color in &colors {
        hasher.update(color.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}
