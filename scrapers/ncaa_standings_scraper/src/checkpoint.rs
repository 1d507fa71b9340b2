use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::types::PendingWrite;

/// Progress through one standings page, so an interrupted session
/// resumes where it left off.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StandingsProgress {
    pub next_index: usize,
    pub completed_conferences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Epoch seconds of every sheet write inside the rolling window.
    pub write_timestamps: Vec<f64>,
    /// Row groups deferred by the write limit, flushed on the next run.
    pub pending_writes: Vec<PendingWrite>,
    /// Keyed by standings page ("d1_men", "d1_women", ...).
    pub standings: HashMap<String, StandingsProgress>,
    pub last_saved: DateTime<Utc>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            write_timestamps: Vec::new(),
            pending_writes: Vec::new(),
            standings: HashMap::new(),
            last_saved: Utc::now(),
        }
    }
}

pub struct CheckpointFile {
    path: PathBuf,
    pub state: Checkpoint,
}

impl CheckpointFile {
    /// Load checkpoint from file or create new. A file that fails to parse
    /// is treated as absent rather than aborting the run.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let state_json = fs::read_to_string(&path)?;
            serde_json::from_str(&state_json).unwrap_or_default()
        } else {
            Checkpoint::default()
        };
        Ok(Self { path, state })
    }

    pub fn save(&mut self) -> Result<()> {
        self.state.last_saved = Utc::now();
        let state_json = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, state_json)?;
        Ok(())
    }

    pub fn progress_mut(&mut self, page: &str) -> &mut StandingsProgress {
        self.state.standings.entry(page.to_string()).or_default()
    }
}
