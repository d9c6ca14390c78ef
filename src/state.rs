use std::{path::PathBuf, sync::Arc};

use crate::checkpoints::CheckpointingManager;

/// Shared handler state: the manager is built once at startup, injected
/// here, and never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
  pub manager: Arc<CheckpointingManager>,
}

impl AppState {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      manager: Arc::new(CheckpointingManager::new(root)),
    }
  }
}
