use std::{
  collections::HashMap,
  io,
  path::{Path, PathBuf},
  sync::Arc,
  time::SystemTime,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  model::{
    ContentFormat, ContentPayload, ContentsEntry, CreateModel, EntryType, SaveModel,
    guess_mimetype,
  },
  notebook,
  path::{self, NOTEBOOK_EXT, PathError, RootDir},
};

const UNTITLED_DIRECTORY: &str = "Untitled Folder";
const UNTITLED_NOTEBOOK: &str = "Untitled";
const UNTITLED_FILE: &str = "untitled";

#[derive(Debug, Error)]
pub enum ContentsError {
  #[error("file or directory does not exist: {0}")]
  NotFound(String),
  #[error("{0} is a directory, not a {1}")]
  TypeMismatch(String, EntryType),
  #[error("{0} is not a directory")]
  NotADirectory(String),
  #[error("{0}")]
  BadFormat(String),
  #[error("{0}")]
  BadRequest(String),
  #[error("file or directory already exists: {0}")]
  Conflict(String),
  #[error("i/o failure: {0}")]
  Io(#[from] io::Error),
}

impl From<PathError> for ContentsError {
  // Escaping or malformed paths name nothing inside the root.
  fn from(err: PathError) -> Self {
    ContentsError::NotFound(err.to_string())
  }
}

/// How much of an entry `get` materializes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
  pub content: bool,
  pub entry_type: Option<EntryType>,
  pub format: Option<ContentFormat>,
  pub hash: bool,
}

impl GetOptions {
  pub fn with_content() -> Self {
    Self {
      content: true,
      ..Self::default()
    }
  }
}

/// Outcome of a save, distinguishing created from overwritten targets.
#[derive(Debug, Clone)]
pub struct Saved {
  pub entry: ContentsEntry,
  pub created: bool,
}

/// The capability set shared by the plain filesystem manager and the
/// checkpoint-aware wrapper around it.
#[async_trait]
pub trait ContentsOps: Send + Sync {
  /// Fetch one entry, optionally with its content and hash.
  async fn get(&self, path: &str, opts: GetOptions) -> Result<ContentsEntry, ContentsError>;

  /// Create an auto-named entry (untitled file, notebook, or folder) inside
  /// `parent`.
  async fn new_untitled(
    &self,
    parent: &str,
    model: &CreateModel,
  ) -> Result<ContentsEntry, ContentsError>;

  /// Copy a file into a directory under a derived `-CopyN` name.
  async fn copy(&self, from: &str, into: &str) -> Result<ContentsEntry, ContentsError>;

  /// Write an uploaded entry (file, notebook, or directory) at `path`.
  async fn save(&self, path: &str, model: &SaveModel) -> Result<Saved, ContentsError>;

  /// Move an entry to a new path.
  async fn rename(&self, path: &str, new_path: &str) -> Result<ContentsEntry, ContentsError>;

  /// Remove an entry; directories are removed with their descendants.
  async fn delete(&self, path: &str) -> Result<(), ContentsError>;
}

/// Contents manager backed directly by a directory tree.
pub struct FsContentsManager {
  root: RootDir,
  locks: PathLocks,
}

impl FsContentsManager {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: RootDir::new(root),
      locks: PathLocks::default(),
    }
  }

  pub fn root(&self) -> &RootDir {
    &self.root
  }

  async fn metadata_for(
    &self,
    api_path: &str,
    fs_path: &Path,
  ) -> Result<std::fs::Metadata, ContentsError> {
    match tokio::fs::metadata(fs_path).await {
      Ok(meta) => Ok(meta),
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        Err(ContentsError::NotFound(api_path.to_string()))
      }
      Err(err) => Err(err.into()),
    }
  }

  async fn require_directory(&self, api_path: &str) -> Result<PathBuf, ContentsError> {
    let fs_path = self.root.resolve(api_path)?;
    let meta = self.metadata_for(api_path, &fs_path).await?;
    if !meta.is_dir() {
      return Err(ContentsError::NotADirectory(api_path.to_string()));
    }
    Ok(fs_path)
  }

  async fn dir_entry(
    &self,
    api_path: &str,
    fs_path: &Path,
    meta: &std::fs::Metadata,
    with_content: bool,
  ) -> Result<ContentsEntry, ContentsError> {
    let mut entry = base_entry(api_path, EntryType::Directory, meta);
    if !with_content {
      return Ok(entry);
    }

    let mut children = Vec::new();
    let mut read_dir = tokio::fs::read_dir(fs_path).await?;
    while let Some(item) = read_dir.next_entry().await? {
      let name = item.file_name().to_string_lossy().into_owned();
      if name.starts_with('.') {
        continue;
      }
      let child_meta = match item.metadata().await {
        Ok(meta) => meta,
        Err(err) => {
          debug!(name = %name, error = %err, "skipping unreadable directory entry");
          continue;
        }
      };
      let child_type = if child_meta.is_dir() {
        EntryType::Directory
      } else if name.ends_with(NOTEBOOK_EXT) {
        EntryType::Notebook
      } else {
        EntryType::File
      };
      let child_path = match self.root.to_api(&item.path()) {
        Some(child_path) => child_path,
        None => path::join(api_path, &name),
      };
      let mut child = base_entry(&child_path, child_type, &child_meta);
      if child_type == EntryType::File {
        child.mimetype = guess_mimetype(&name);
      }
      children.push(child);
    }
    // Case-insensitive order, tie-broken by exact name so listings are
    // stable across calls.
    children.sort_by(|a, b| {
      a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
    });
    entry.content = Some(ContentPayload::Listing(children));
    entry.format = Some(ContentFormat::Json);
    Ok(entry)
  }

  async fn notebook_entry(
    &self,
    api_path: &str,
    fs_path: &Path,
    meta: &std::fs::Metadata,
    opts: GetOptions,
  ) -> Result<ContentsEntry, ContentsError> {
    let mut entry = base_entry(api_path, EntryType::Notebook, meta);
    if !opts.content && !opts.hash {
      return Ok(entry);
    }
    let bytes = tokio::fs::read(fs_path).await?;
    if opts.hash {
      set_hash(&mut entry, &bytes);
    }
    if opts.content {
      let doc = notebook::from_bytes(&bytes).map_err(|err| {
        ContentsError::BadFormat(format!("unreadable notebook {api_path}: {err}"))
      })?;
      entry.message = notebook::validation_message(&doc);
      entry.content = Some(ContentPayload::Notebook(doc));
      entry.format = Some(ContentFormat::Json);
    }
    Ok(entry)
  }

  async fn file_entry(
    &self,
    api_path: &str,
    fs_path: &Path,
    meta: &std::fs::Metadata,
    opts: GetOptions,
  ) -> Result<ContentsEntry, ContentsError> {
    let mut entry = base_entry(api_path, EntryType::File, meta);
    entry.mimetype = guess_mimetype(&entry.name);
    if !opts.content && !opts.hash {
      return Ok(entry);
    }
    let bytes = tokio::fs::read(fs_path).await?;
    if opts.hash {
      set_hash(&mut entry, &bytes);
    }
    if opts.content {
      let (format, text) = decode_for_wire(api_path, bytes, opts.format)?;
      if entry.mimetype.is_none() {
        entry.mimetype = Some(
          match format {
            ContentFormat::Base64 => "application/octet-stream",
            _ => "text/plain",
          }
          .to_string(),
        );
      }
      entry.format = Some(format);
      entry.content = Some(ContentPayload::Text(text));
    }
    Ok(entry)
  }
}

#[async_trait]
impl ContentsOps for FsContentsManager {
  async fn get(&self, path: &str, opts: GetOptions) -> Result<ContentsEntry, ContentsError> {
    let api_path = path::normalize(path)?;
    if path::is_hidden(&api_path) {
      return Err(ContentsError::NotFound(api_path));
    }
    let fs_path = self.root.resolve(&api_path)?;
    let meta = self.metadata_for(&api_path, &fs_path).await?;

    if meta.is_dir() {
      if let Some(requested) = opts.entry_type
        && requested != EntryType::Directory
      {
        return Err(ContentsError::TypeMismatch(api_path, requested));
      }
      return self.dir_entry(&api_path, &fs_path, &meta, opts.content).await;
    }
    if opts.entry_type == Some(EntryType::Directory) {
      return Err(ContentsError::NotADirectory(api_path));
    }

    let as_notebook = opts.entry_type == Some(EntryType::Notebook)
      || (opts.entry_type.is_none() && api_path.ends_with(NOTEBOOK_EXT));
    if as_notebook {
      self.notebook_entry(&api_path, &fs_path, &meta, opts).await
    } else {
      self.file_entry(&api_path, &fs_path, &meta, opts).await
    }
  }

  async fn new_untitled(
    &self,
    parent: &str,
    model: &CreateModel,
  ) -> Result<ContentsEntry, ContentsError> {
    let parent_api = path::normalize(parent)?;
    let parent_fs = self.root.resolve(&parent_api)?;

    // The name search and the create run under one parent lock so two
    // concurrent requests never pick the same candidate.
    let lock = self.locks.lock_for(&parent_fs);
    let _guard = lock.lock().await;

    let parent_is_dir = tokio::fs::metadata(&parent_fs)
      .await
      .map(|meta| meta.is_dir())
      .unwrap_or(false);
    if !parent_is_dir {
      return Err(ContentsError::NotFound(parent_api));
    }

    let make_directory = model.entry_type == Some(EntryType::Directory);
    let name = if make_directory {
      next_untitled_directory(&parent_fs).await?
    } else {
      let (stem, ext) = match model.ext.as_deref() {
        Some(".txt") => (UNTITLED_FILE, ".txt"),
        Some(ext) => (UNTITLED_NOTEBOOK, ext),
        None if model.entry_type == Some(EntryType::File) => (UNTITLED_FILE, ""),
        None => (UNTITLED_NOTEBOOK, NOTEBOOK_EXT),
      };
      next_untitled_file(&parent_fs, stem, ext).await?
    };

    let api_path = path::join(&parent_api, &name);
    let fs_path = parent_fs.join(&name);
    if make_directory {
      tokio::fs::create_dir(&fs_path).await?;
    } else if name.ends_with(NOTEBOOK_EXT) {
      atomic_write(&fs_path, &notebook::to_canonical_bytes(&notebook::empty_notebook())).await?;
    } else {
      atomic_write(&fs_path, b"").await?;
    }
    debug!(path = %api_path, "created untitled entry");
    self.get(&api_path, GetOptions::default()).await
  }

  async fn copy(&self, from: &str, into: &str) -> Result<ContentsEntry, ContentsError> {
    let from_api = path::normalize(from)?;
    if path::is_hidden(&from_api) {
      return Err(ContentsError::NotFound(from_api));
    }
    let from_fs = self.root.resolve(&from_api)?;
    let from_meta = self.metadata_for(&from_api, &from_fs).await?;
    if from_meta.is_dir() {
      return Err(ContentsError::BadRequest(format!(
        "cannot copy a directory: {from_api}"
      )));
    }

    let dest_api = path::normalize(into)?;
    let dest_fs = self.require_directory(&dest_api).await?;

    let lock = self.locks.lock_for(&dest_fs);
    let _guard = lock.lock().await;

    let (_, source_name) = path::split(&from_api);
    let name = next_copy_name(&dest_fs, source_name).await?;
    let bytes = tokio::fs::read(&from_fs).await?;
    atomic_write(&dest_fs.join(&name), &bytes).await?;

    let api_path = path::join(&dest_api, &name);
    debug!(from = %from_api, to = %api_path, "copied entry");
    self.get(&api_path, GetOptions::default()).await
  }

  async fn save(&self, path: &str, model: &SaveModel) -> Result<Saved, ContentsError> {
    let api_path = path::normalize(path)?;
    if model.copy_from.is_some() {
      return Err(ContentsError::BadRequest(
        "copy_from is only valid on POST requests".into(),
      ));
    }
    if api_path.is_empty() {
      return Err(ContentsError::BadRequest(
        "cannot save over the root directory".into(),
      ));
    }
    if path::is_hidden(&api_path) {
      return Err(ContentsError::BadRequest(format!(
        "cannot create hidden file or directory: {api_path}"
      )));
    }

    let (parent_api, name) = path::split(&api_path);
    let parent_fs = self.require_directory(parent_api).await?;
    let fs_path = parent_fs.join(name);

    let lock = self.locks.lock_for(&fs_path);
    let _guard = lock.lock().await;

    let existing = tokio::fs::metadata(&fs_path).await.ok();
    let existed = existing.is_some();
    if let Some(meta) = &existing
      && meta.is_dir()
      && model.entry_type != Some(EntryType::Directory)
    {
      let requested = model.entry_type.unwrap_or(EntryType::File);
      return Err(ContentsError::TypeMismatch(api_path, requested));
    }
    let mut message = None;

    match model.entry_type {
      Some(EntryType::Directory) => match existing {
        None => tokio::fs::create_dir(&fs_path).await?,
        Some(meta) if !meta.is_dir() => {
          return Err(ContentsError::NotADirectory(api_path));
        }
        Some(_) => {}
      },
      Some(EntryType::Notebook) => {
        let mut doc = match model.content.clone() {
          Some(doc @ Value::Object(_)) => doc,
          Some(_) => {
            return Err(ContentsError::BadRequest(format!(
              "notebook content for {api_path} must be a JSON object"
            )));
          }
          None => {
            return Err(ContentsError::BadRequest(format!(
              "no content provided to save {api_path}"
            )));
          }
        };
        notebook::normalize(&mut doc);
        message = notebook::validation_message(&doc);
        atomic_write(&fs_path, &notebook::to_canonical_bytes(&doc)).await?;
      }
      Some(EntryType::File) => {
        let content = model
          .content
          .as_ref()
          .and_then(Value::as_str)
          .ok_or_else(|| {
            ContentsError::BadRequest(format!("no content provided to save {api_path}"))
          })?;
        let bytes = decode_upload(&api_path, content, model.format)?;
        atomic_write(&fs_path, &bytes).await?;
      }
      None => {
        return Err(ContentsError::BadRequest(format!(
          "no entry type provided to save {api_path}"
        )));
      }
    }
    info!(path = %api_path, created = !existed, "saved entry");

    let opts = GetOptions {
      entry_type: model.entry_type,
      ..GetOptions::default()
    };
    let mut entry = self.get(&api_path, opts).await?;
    if message.is_some() {
      entry.message = message;
    }
    Ok(Saved {
      entry,
      created: !existed,
    })
  }

  async fn rename(&self, path: &str, new_path: &str) -> Result<ContentsEntry, ContentsError> {
    let old_api = path::normalize(path)?;
    let new_api = path::normalize(new_path)?;
    if old_api.is_empty() {
      return Err(ContentsError::BadRequest(
        "cannot rename the root directory".into(),
      ));
    }
    if path::is_hidden(&old_api) {
      return Err(ContentsError::NotFound(old_api));
    }
    if path::is_hidden(&new_api) {
      return Err(ContentsError::BadRequest(format!(
        "cannot rename to a hidden name: {new_api}"
      )));
    }
    if old_api == new_api {
      return self.get(&old_api, GetOptions::default()).await;
    }

    let old_fs = self.root.resolve(&old_api)?;
    self.metadata_for(&old_api, &old_fs).await?;

    let (new_parent, _) = path::split(&new_api);
    self.require_directory(new_parent).await?;
    let new_fs = self.root.resolve(&new_api)?;

    let lock = self.locks.lock_for(&new_fs);
    let _guard = lock.lock().await;

    if tokio::fs::metadata(&new_fs).await.is_ok() {
      return Err(ContentsError::Conflict(new_api));
    }
    tokio::fs::rename(&old_fs, &new_fs).await?;
    info!(from = %old_api, to = %new_api, "renamed entry");
    self.get(&new_api, GetOptions::default()).await
  }

  async fn delete(&self, path: &str) -> Result<(), ContentsError> {
    let api_path = path::normalize(path)?;
    if api_path.is_empty() {
      return Err(ContentsError::BadRequest(
        "cannot delete the root directory".into(),
      ));
    }
    if path::is_hidden(&api_path) {
      return Err(ContentsError::NotFound(api_path));
    }
    let fs_path = self.root.resolve(&api_path)?;
    let meta = self.metadata_for(&api_path, &fs_path).await?;
    if meta.is_dir() {
      tokio::fs::remove_dir_all(&fs_path).await?;
    } else {
      tokio::fs::remove_file(&fs_path).await?;
    }
    info!(path = %api_path, "deleted entry");
    Ok(())
  }
}

fn base_entry(api_path: &str, entry_type: EntryType, meta: &std::fs::Metadata) -> ContentsEntry {
  let (_, name) = path::split(api_path);
  ContentsEntry {
    name: name.to_string(),
    path: api_path.to_string(),
    entry_type,
    writable: !meta.permissions().readonly(),
    created: timestamp(meta.created().or_else(|_| meta.modified())),
    last_modified: timestamp(meta.modified()),
    size: (entry_type != EntryType::Directory).then(|| meta.len()),
    mimetype: None,
    format: None,
    content: None,
    message: None,
    hash: None,
    hash_algorithm: None,
  }
}

fn timestamp(result: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
  result.ok().map(DateTime::<Utc>::from)
}

fn set_hash(entry: &mut ContentsEntry, bytes: &[u8]) {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  entry.hash = Some(format!("{:x}", hasher.finalize()));
  entry.hash_algorithm = Some("sha256".into());
}

/// Pick the wire format for file bytes. With no requested format, valid
/// UTF-8 goes out as text and everything else as base64.
fn decode_for_wire(
  api_path: &str,
  bytes: Vec<u8>,
  requested: Option<ContentFormat>,
) -> Result<(ContentFormat, String), ContentsError> {
  match requested {
    Some(ContentFormat::Text) => match String::from_utf8(bytes) {
      Ok(text) => Ok((ContentFormat::Text, text)),
      Err(_) => Err(ContentsError::BadFormat(format!(
        "{api_path} is not UTF-8 encoded"
      ))),
    },
    Some(ContentFormat::Base64) => Ok((ContentFormat::Base64, STANDARD.encode(bytes))),
    Some(ContentFormat::Json) => Err(ContentsError::BadFormat(format!(
      "json is not a valid format for {api_path}"
    ))),
    None => match String::from_utf8(bytes) {
      Ok(text) => Ok((ContentFormat::Text, text)),
      Err(not_text) => Ok((ContentFormat::Base64, STANDARD.encode(not_text.into_bytes()))),
    },
  }
}

/// Decode an uploaded file body to raw bytes. Base64 payloads may carry
/// embedded whitespace (MIME-wrapped encoders emit it).
fn decode_upload(
  api_path: &str,
  content: &str,
  format: Option<ContentFormat>,
) -> Result<Vec<u8>, ContentsError> {
  match format {
    Some(ContentFormat::Text) => Ok(content.as_bytes().to_vec()),
    Some(ContentFormat::Base64) => {
      let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
      STANDARD.decode(compact.as_bytes()).map_err(|err| {
        ContentsError::BadFormat(format!("encoding error saving {api_path}: {err}"))
      })
    }
    _ => Err(ContentsError::BadFormat(format!(
      "file content format for {api_path} must be 'text' or 'base64'"
    ))),
  }
}

async fn name_exists(parent_fs: &Path, name: &str) -> bool {
  tokio::fs::symlink_metadata(parent_fs.join(name)).await.is_ok()
}

/// First unused name in "Untitled Folder", "Untitled Folder 1", ...
async fn next_untitled_directory(parent_fs: &Path) -> Result<String, ContentsError> {
  for index in 0u64.. {
    let candidate = if index == 0 {
      UNTITLED_DIRECTORY.to_string()
    } else {
      format!("{UNTITLED_DIRECTORY} {index}")
    };
    if !name_exists(parent_fs, &candidate).await {
      return Ok(candidate);
    }
  }
  unreachable!()
}

/// First unused name in "{stem}{ext}", "{stem}1{ext}", "{stem}2{ext}", ...
async fn next_untitled_file(
  parent_fs: &Path,
  stem: &str,
  ext: &str,
) -> Result<String, ContentsError> {
  for index in 0u64.. {
    let candidate = if index == 0 {
      format!("{stem}{ext}")
    } else {
      format!("{stem}{index}{ext}")
    };
    if !name_exists(parent_fs, &candidate).await {
      return Ok(candidate);
    }
  }
  unreachable!()
}

/// Destination name for a copy: the bare stripped name if free, then
/// "{stem}-Copy1{ext}", "{stem}-Copy2{ext}", ... A source already carrying
/// a "-CopyN" suffix is stripped to its base first, so copying a copy
/// continues the sequence.
async fn next_copy_name(dest_fs: &Path, source_name: &str) -> Result<String, ContentsError> {
  let (stem, ext) = path::split_ext(source_name);
  let stem = strip_copy_suffix(stem);
  for index in 0u64.. {
    let candidate = if index == 0 {
      format!("{stem}{ext}")
    } else {
      format!("{stem}-Copy{index}{ext}")
    };
    if !name_exists(dest_fs, &candidate).await {
      return Ok(candidate);
    }
  }
  unreachable!()
}

fn strip_copy_suffix(stem: &str) -> &str {
  if let Some(idx) = stem.rfind("-Copy") {
    let digits = &stem[idx + "-Copy".len()..];
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
      return &stem[..idx];
    }
  }
  stem
}

/// Write-to-temp-then-rename: readers of `dest` observe the old bytes or
/// the new bytes, never a torn stream. The hidden temp file is removed if
/// the task is cancelled before the rename.
pub(crate) async fn atomic_write(dest: &Path, bytes: &[u8]) -> io::Result<()> {
  let name = dest
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let tmp = dest.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
  let cleanup = TempFileGuard(Some(tmp.clone()));
  tokio::fs::write(&tmp, bytes).await?;
  tokio::fs::rename(&tmp, dest).await?;
  cleanup.disarm();
  Ok(())
}

struct TempFileGuard(Option<PathBuf>);

impl TempFileGuard {
  fn disarm(mut self) {
    self.0 = None;
  }
}

impl Drop for TempFileGuard {
  fn drop(&mut self) {
    if let Some(tmp) = self.0.take() {
      let _ = std::fs::remove_file(tmp);
    }
  }
}

/// Async mutexes keyed by filesystem path, so name searches and writes for
/// one location serialize without blocking unrelated paths.
#[derive(Default)]
struct PathLocks {
  inner: parking_lot::Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
  fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let mut map = self.inner.lock();
    map.entry(path.to_path_buf()).or_default().clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  fn manager() -> (TempDir, FsContentsManager) {
    let dir = tempfile::tempdir().unwrap();
    let manager = FsContentsManager::new(dir.path());
    (dir, manager)
  }

  fn save_text(content: &str) -> SaveModel {
    SaveModel {
      entry_type: Some(EntryType::File),
      format: Some(ContentFormat::Text),
      content: Some(Value::from(content)),
      ..SaveModel::default()
    }
  }

  #[test]
  fn copy_suffix_stripping() {
    assert_eq!(strip_copy_suffix("ç d"), "ç d");
    assert_eq!(strip_copy_suffix("ç d-Copy2"), "ç d");
    // A bare "-Copy" with no digits never came from the copy namer.
    assert_eq!(strip_copy_suffix("ç d-Copy"), "ç d-Copy");
    assert_eq!(strip_copy_suffix("a-Copy1-final"), "a-Copy1-final");
  }

  #[test]
  fn upload_decoding() {
    assert_eq!(
      decode_upload("p", "hej", Some(ContentFormat::Text)).unwrap(),
      b"hej"
    );
    // Wrapped base64 with embedded newlines still decodes.
    assert_eq!(
      decode_upload("p", "aGVs\nbG8=\n", Some(ContentFormat::Base64)).unwrap(),
      b"hello"
    );
    assert!(matches!(
      decode_upload("p", "not base64!", Some(ContentFormat::Base64)),
      Err(ContentsError::BadFormat(_))
    ));
    assert!(matches!(
      decode_upload("p", "x", None),
      Err(ContentsError::BadFormat(_))
    ));
  }

  #[tokio::test]
  async fn untitled_notebooks_count_up_without_gaps() {
    let (_dir, manager) = manager();
    let model = CreateModel {
      ext: Some(".ipynb".into()),
      ..CreateModel::default()
    };
    let first = manager.new_untitled("", &model).await.unwrap();
    let second = manager.new_untitled("", &model).await.unwrap();
    let third = manager.new_untitled("", &model).await.unwrap();
    assert_eq!(first.name, "Untitled.ipynb");
    assert_eq!(second.name, "Untitled1.ipynb");
    assert_eq!(third.name, "Untitled2.ipynb");
    assert_eq!(first.entry_type, EntryType::Notebook);
  }

  #[tokio::test]
  async fn untitled_text_files_use_the_lowercase_stem() {
    let (_dir, manager) = manager();
    let model = CreateModel {
      ext: Some(".txt".into()),
      ..CreateModel::default()
    };
    let first = manager.new_untitled("", &model).await.unwrap();
    let second = manager.new_untitled("", &model).await.unwrap();
    assert_eq!(first.name, "untitled.txt");
    assert_eq!(second.name, "untitled1.txt");
    assert_eq!(first.entry_type, EntryType::File);

    let fetched = manager.get("untitled.txt", GetOptions::with_content()).await.unwrap();
    assert_eq!(fetched.format, Some(ContentFormat::Text));
    assert_eq!(fetched.content, Some(ContentPayload::Text(String::new())));
  }

  #[tokio::test]
  async fn untitled_folders_use_a_spaced_counter() {
    let (_dir, manager) = manager();
    let model = CreateModel {
      entry_type: Some(EntryType::Directory),
      ..CreateModel::default()
    };
    let first = manager.new_untitled("", &model).await.unwrap();
    let second = manager.new_untitled("", &model).await.unwrap();
    assert_eq!(first.name, "Untitled Folder");
    assert_eq!(second.name, "Untitled Folder 1");
    assert_eq!(first.entry_type, EntryType::Directory);
  }

  #[tokio::test]
  async fn untitled_in_a_missing_parent_is_not_found() {
    let (_dir, manager) = manager();
    let err = manager
      .new_untitled("nowhere", &CreateModel::default())
      .await
      .unwrap_err();
    assert!(matches!(err, ContentsError::NotFound(_)));
  }

  #[tokio::test]
  async fn text_round_trip_preserves_unicode() {
    let (_dir, manager) = manager();
    manager
      .save("å b", &SaveModel { entry_type: Some(EntryType::Directory), ..SaveModel::default() })
      .await
      .unwrap();
    let body = "ünicode téxt";
    let saved = manager.save("å b/Upload tést.txt", &save_text(body)).await.unwrap();
    assert!(saved.created);

    let fetched = manager
      .get("å b/Upload tést.txt", GetOptions::with_content())
      .await
      .unwrap();
    assert_eq!(fetched.content, Some(ContentPayload::Text(body.into())));
    assert_eq!(fetched.format, Some(ContentFormat::Text));

    let again = manager.save("å b/Upload tést.txt", &save_text("v2")).await.unwrap();
    assert!(!again.created);
  }

  #[tokio::test]
  async fn binary_round_trip_uses_base64() {
    let (_dir, manager) = manager();
    let raw = b"\xFFblob";
    let model = SaveModel {
      entry_type: Some(EntryType::File),
      format: Some(ContentFormat::Base64),
      content: Some(Value::from(STANDARD.encode(raw))),
      ..SaveModel::default()
    };
    manager.save("payload.blob", &model).await.unwrap();

    let fetched = manager.get("payload.blob", GetOptions::with_content()).await.unwrap();
    assert_eq!(fetched.format, Some(ContentFormat::Base64));
    let Some(ContentPayload::Text(encoded)) = fetched.content else {
      panic!("expected encoded file content");
    };
    assert_eq!(STANDARD.decode(encoded).unwrap(), raw);
  }

  #[tokio::test]
  async fn text_format_on_binary_bytes_is_rejected() {
    let (dir, manager) = manager();
    std::fs::write(dir.path().join("raw.blob"), b"\xFF\xFE").unwrap();
    let err = manager
      .get(
        "raw.blob",
        GetOptions {
          content: true,
          format: Some(ContentFormat::Text),
          ..GetOptions::default()
        },
      )
      .await
      .unwrap_err();
    assert!(matches!(err, ContentsError::BadFormat(_)));
  }

  #[tokio::test]
  async fn notebook_round_trip_and_validation_message() {
    let (_dir, manager) = manager();
    let doc = json!({
      "cells": [{ "cell_type": "markdown", "metadata": {}, "source": "hi" }],
      "metadata": {},
      "nbformat": 4,
      "nbformat_minor": 5,
    });
    let model = SaveModel {
      entry_type: Some(EntryType::Notebook),
      content: Some(doc.clone()),
      ..SaveModel::default()
    };
    let saved = manager.save("a.ipynb", &model).await.unwrap();
    assert!(saved.entry.message.is_none());

    let fetched = manager.get("a.ipynb", GetOptions::with_content()).await.unwrap();
    assert_eq!(fetched.entry_type, EntryType::Notebook);
    assert_eq!(fetched.content, Some(ContentPayload::Notebook(doc)));

    let broken = SaveModel {
      entry_type: Some(EntryType::Notebook),
      content: Some(json!({
        "nbformat": 4,
        "metadata": {},
        "cells": [{ "cell_type": "wrong", "metadata": {} }],
      })),
      ..SaveModel::default()
    };
    let saved = manager.save("b.ipynb", &broken).await.unwrap();
    assert!(saved.entry.message.unwrap().to_lowercase().contains("validation failed"));

    let fetched = manager.get("b.ipynb", GetOptions::with_content()).await.unwrap();
    assert_eq!(fetched.entry_type, EntryType::Notebook);
    assert!(fetched.message.unwrap().to_lowercase().contains("validation failed"));
  }

  #[tokio::test]
  async fn requested_type_must_match_the_entry() {
    let (dir, manager) = manager();
    std::fs::create_dir(dir.path().join("unicodé")).unwrap();
    std::fs::write(dir.path().join("plain.txt"), "x").unwrap();

    let err = manager
      .get(
        "unicodé",
        GetOptions { entry_type: Some(EntryType::File), ..GetOptions::default() },
      )
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "unicodé is a directory, not a file");

    let err = manager
      .get(
        "plain.txt",
        GetOptions { entry_type: Some(EntryType::Directory), ..GetOptions::default() },
      )
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "plain.txt is not a directory");
  }

  #[tokio::test]
  async fn listings_are_sorted_and_skip_hidden_names() {
    let (dir, manager) = manager();
    std::fs::create_dir(dir.path().join("b")).unwrap();
    std::fs::write(dir.path().join("A.txt"), "a").unwrap();
    std::fs::write(dir.path().join("c.txt"), "c").unwrap();
    std::fs::write(dir.path().join(".hidden"), "h").unwrap();

    let listing = manager.get("", GetOptions::with_content()).await.unwrap();
    let Some(ContentPayload::Listing(children)) = listing.content else {
      panic!("expected a directory listing");
    };
    let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["A.txt", "b", "c.txt"]);
  }

  #[tokio::test]
  async fn copies_count_up_within_one_directory() {
    let (_dir, manager) = manager();
    manager.save("ç d.txt", &save_text("original")).await.unwrap();

    let first = manager.copy("ç d.txt", "").await.unwrap();
    let second = manager.copy("ç d.txt", "").await.unwrap();
    let third = manager.copy(&second.path, "").await.unwrap();
    assert_eq!(first.name, "ç d-Copy1.txt");
    assert_eq!(second.name, "ç d-Copy2.txt");
    assert_eq!(third.name, "ç d-Copy3.txt");
  }

  #[tokio::test]
  async fn copy_into_another_directory_keeps_a_free_name() {
    let (_dir, manager) = manager();
    manager
      .save("dest", &SaveModel { entry_type: Some(EntryType::Directory), ..SaveModel::default() })
      .await
      .unwrap();
    manager.save("a.txt", &save_text("original")).await.unwrap();

    let first = manager.copy("a.txt", "dest").await.unwrap();
    let second = manager.copy("a.txt", "dest").await.unwrap();
    assert_eq!(first.path, "dest/a.txt");
    assert_eq!(second.path, "dest/a-Copy1.txt");
  }

  #[tokio::test]
  async fn copying_a_directory_is_rejected() {
    let (dir, manager) = manager();
    std::fs::create_dir(dir.path().join("folder")).unwrap();
    let err = manager.copy("folder", "").await.unwrap_err();
    assert!(matches!(err, ContentsError::BadRequest(_)));
  }

  #[tokio::test]
  async fn save_rejects_copy_from_and_hidden_names() {
    let (_dir, manager) = manager();
    let model = SaveModel {
      copy_from: Some("somewhere.txt".into()),
      ..SaveModel::default()
    };
    assert!(matches!(
      manager.save("target.txt", &model).await.unwrap_err(),
      ContentsError::BadRequest(_)
    ));
    assert!(matches!(
      manager
        .save(".hidden", &SaveModel { entry_type: Some(EntryType::Directory), ..SaveModel::default() })
        .await
        .unwrap_err(),
      ContentsError::BadRequest(_)
    ));
  }

  #[tokio::test]
  async fn save_into_a_missing_parent_is_not_found() {
    let (_dir, manager) = manager();
    let err = manager.save("missing/f.txt", &save_text("x")).await.unwrap_err();
    assert!(matches!(err, ContentsError::NotFound(_)));
  }

  #[tokio::test]
  async fn rename_moves_and_conflicts() {
    let (_dir, manager) = manager();
    manager.save("a.txt", &save_text("a")).await.unwrap();
    manager.save("b.txt", &save_text("b")).await.unwrap();

    let renamed = manager.rename("a.txt", "z.txt").await.unwrap();
    assert_eq!(renamed.name, "z.txt");
    assert!(matches!(
      manager.get("a.txt", GetOptions::default()).await.unwrap_err(),
      ContentsError::NotFound(_)
    ));

    let err = manager.rename("z.txt", "b.txt").await.unwrap_err();
    assert!(matches!(err, ContentsError::Conflict(_)));
  }

  #[tokio::test]
  async fn delete_removes_directories_recursively() {
    let (dir, manager) = manager();
    std::fs::create_dir_all(dir.path().join("top/nested")).unwrap();
    std::fs::write(dir.path().join("top/nested/f.txt"), "x").unwrap();

    manager.delete("top").await.unwrap();
    assert!(matches!(
      manager.get("top", GetOptions::default()).await.unwrap_err(),
      ContentsError::NotFound(_)
    ));
    assert!(matches!(
      manager.delete("top").await.unwrap_err(),
      ContentsError::NotFound(_)
    ));
  }

  #[tokio::test]
  async fn traversal_resolves_to_nothing() {
    let (_dir, manager) = manager();
    assert!(matches!(
      manager.get("../outside", GetOptions::default()).await.unwrap_err(),
      ContentsError::NotFound(_)
    ));
  }

  #[tokio::test]
  async fn hash_is_reported_on_request() {
    let (_dir, manager) = manager();
    manager.save("h.txt", &save_text("hello")).await.unwrap();
    let entry = manager
      .get("h.txt", GetOptions { hash: true, ..GetOptions::default() })
      .await
      .unwrap();
    assert_eq!(
      entry.hash.as_deref(),
      Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
    assert_eq!(entry.hash_algorithm.as_deref(), Some("sha256"));
    assert_eq!(entry.content, None);
  }

  #[tokio::test]
  async fn atomic_write_replaces_content_in_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.txt");
    atomic_write(&dest, b"one").await.unwrap();
    atomic_write(&dest, b"two").await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"two");
    // No temp droppings left behind.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
  }
}
