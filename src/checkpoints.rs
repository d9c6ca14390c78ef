use std::{io, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
  contents::{
    ContentsError, ContentsOps, FsContentsManager, GetOptions, Saved, atomic_write,
  },
  model::{Checkpoint, ContentsEntry, CreateModel, SaveModel},
  path::{self, RootDir},
};

const CHECKPOINT_DIR: &str = ".ipynb_checkpoints";
const CHECKPOINT_ID: &str = "checkpoint";

/// One-slot snapshot store kept in a hidden directory beside each file.
///
/// The snapshot for `parent/name.ext` lives at
/// `parent/.ipynb_checkpoints/name-checkpoint.ext`, so it survives server
/// restarts, never shows up in listings, and moves with its directory.
pub struct FileCheckpoints {
  root: RootDir,
}

impl FileCheckpoints {
  pub fn new(root: RootDir) -> Self {
    Self { root }
  }

  fn snapshot_path(&self, api_path: &str, id: &str) -> Result<PathBuf, ContentsError> {
    let api_path = path::normalize(api_path)?;
    let (parent, name) = path::split(&api_path);
    let (stem, ext) = path::split_ext(name);
    Ok(
      self
        .root
        .resolve(parent)?
        .join(CHECKPOINT_DIR)
        .join(format!("{stem}-{id}{ext}")),
    )
  }

  /// Snapshot the file's current bytes, replacing any previous snapshot
  /// under the same id.
  pub async fn create(&self, api_path: &str) -> Result<Checkpoint, ContentsError> {
    let normalized = path::normalize(api_path)?;
    if path::is_hidden(&normalized) {
      return Err(ContentsError::NotFound(normalized));
    }
    let source = self.root.resolve(&normalized)?;
    match tokio::fs::metadata(&source).await {
      Ok(meta) if meta.is_dir() => {
        return Err(ContentsError::BadRequest(format!(
          "checkpoints are only kept for files: {normalized}"
        )));
      }
      Ok(_) => {}
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        return Err(ContentsError::NotFound(normalized));
      }
      Err(err) => return Err(err.into()),
    }
    let bytes = tokio::fs::read(&source).await?;

    let snapshot = self.snapshot_path(&normalized, CHECKPOINT_ID)?;
    if let Some(dir) = snapshot.parent() {
      tokio::fs::create_dir_all(dir).await?;
    }
    atomic_write(&snapshot, &bytes).await?;
    debug!(path = %normalized, id = CHECKPOINT_ID, "checkpoint created");
    self.checkpoint_info(&snapshot).await
  }

  /// Snapshots currently held for the file. At most one with this store.
  pub async fn list(&self, api_path: &str) -> Result<Vec<Checkpoint>, ContentsError> {
    let snapshot = self.snapshot_path(api_path, CHECKPOINT_ID)?;
    match self.checkpoint_info(&snapshot).await {
      Ok(checkpoint) => Ok(vec![checkpoint]),
      Err(ContentsError::NotFound(_)) => Ok(Vec::new()),
      Err(err) => Err(err),
    }
  }

  /// Overwrite the file's bytes with the snapshot's bytes.
  pub async fn restore(&self, api_path: &str, id: &str) -> Result<(), ContentsError> {
    let snapshot = self.snapshot_path(api_path, id)?;
    let bytes = match tokio::fs::read(&snapshot).await {
      Ok(bytes) => bytes,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        return Err(checkpoint_missing(api_path, id));
      }
      Err(err) => return Err(err.into()),
    };
    let dest = self.root.resolve(&path::normalize(api_path)?)?;
    atomic_write(&dest, &bytes).await?;
    debug!(path = %api_path, id = %id, "checkpoint restored");
    Ok(())
  }

  /// Drop one snapshot.
  pub async fn delete(&self, api_path: &str, id: &str) -> Result<(), ContentsError> {
    let snapshot = self.snapshot_path(api_path, id)?;
    match tokio::fs::remove_file(&snapshot).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == io::ErrorKind::NotFound => Err(checkpoint_missing(api_path, id)),
      Err(err) => Err(err.into()),
    }
  }

  /// Re-bind the file's snapshots to its new path after a rename.
  pub async fn rename_all(&self, old_path: &str, new_path: &str) -> Result<(), ContentsError> {
    let old_snapshot = self.snapshot_path(old_path, CHECKPOINT_ID)?;
    if tokio::fs::metadata(&old_snapshot).await.is_err() {
      return Ok(());
    }
    let new_snapshot = self.snapshot_path(new_path, CHECKPOINT_ID)?;
    if let Some(dir) = new_snapshot.parent() {
      tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::rename(&old_snapshot, &new_snapshot).await?;
    debug!(from = %old_path, to = %new_path, "checkpoints follow rename");
    Ok(())
  }

  /// Drop every snapshot held for the file (used when the file is deleted).
  pub async fn delete_all(&self, api_path: &str) -> Result<(), ContentsError> {
    let snapshot = self.snapshot_path(api_path, CHECKPOINT_ID)?;
    match tokio::fs::remove_file(&snapshot).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }

  async fn checkpoint_info(&self, snapshot: &std::path::Path) -> Result<Checkpoint, ContentsError> {
    let meta = match tokio::fs::metadata(snapshot).await {
      Ok(meta) => meta,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        return Err(ContentsError::NotFound(snapshot.display().to_string()));
      }
      Err(err) => return Err(err.into()),
    };
    let last_modified = meta
      .modified()
      .map(DateTime::<Utc>::from)
      .unwrap_or_else(|_| Utc::now());
    Ok(Checkpoint {
      id: CHECKPOINT_ID.to_string(),
      last_modified,
    })
  }
}

fn checkpoint_missing(api_path: &str, id: &str) -> ContentsError {
  ContentsError::NotFound(format!("checkpoint {id} for {api_path}"))
}

/// The checkpoint-aware contents manager: delegates the capability set to
/// the filesystem manager and keeps the snapshot store consistent across
/// renames and deletes.
pub struct CheckpointingManager {
  contents: FsContentsManager,
  checkpoints: FileCheckpoints,
}

impl CheckpointingManager {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let contents = FsContentsManager::new(root);
    let checkpoints = FileCheckpoints::new(contents.root().clone());
    Self {
      contents,
      checkpoints,
    }
  }

  pub async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, ContentsError> {
    self.checkpoints.create(path).await
  }

  pub async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, ContentsError> {
    self.checkpoints.list(path).await
  }

  pub async fn restore_checkpoint(&self, path: &str, id: &str) -> Result<(), ContentsError> {
    self.checkpoints.restore(path, id).await
  }

  pub async fn delete_checkpoint(&self, path: &str, id: &str) -> Result<(), ContentsError> {
    self.checkpoints.delete(path, id).await
  }
}

#[async_trait]
impl ContentsOps for CheckpointingManager {
  async fn get(&self, path: &str, opts: GetOptions) -> Result<ContentsEntry, ContentsError> {
    self.contents.get(path, opts).await
  }

  async fn new_untitled(
    &self,
    parent: &str,
    model: &CreateModel,
  ) -> Result<ContentsEntry, ContentsError> {
    self.contents.new_untitled(parent, model).await
  }

  async fn copy(&self, from: &str, into: &str) -> Result<ContentsEntry, ContentsError> {
    self.contents.copy(from, into).await
  }

  async fn save(&self, path: &str, model: &SaveModel) -> Result<Saved, ContentsError> {
    self.contents.save(path, model).await
  }

  async fn rename(&self, path: &str, new_path: &str) -> Result<ContentsEntry, ContentsError> {
    let entry = self.contents.rename(path, new_path).await?;
    self.checkpoints.rename_all(path, new_path).await?;
    Ok(entry)
  }

  async fn delete(&self, path: &str) -> Result<(), ContentsError> {
    self.contents.delete(path).await?;
    self.checkpoints.delete_all(path).await
  }
}
