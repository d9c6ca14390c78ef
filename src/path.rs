use std::path::{Component, Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;

/// Extension that marks an entry as a notebook.
pub const NOTEBOOK_EXT: &str = ".ipynb";

/// Characters left bare when escaping API paths for `Location` headers:
/// unreserved characters plus the segment separator. `%20` is used for
/// spaces, never `+`.
const LOCATION_KEEP: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'/')
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
  #[error("path escapes the served root: {0}")]
  Traversal(String),
  #[error("path is not relative: {0}")]
  NotRelative(String),
  #[error("path contains an invalid segment: {0}")]
  InvalidSegment(String),
}

/// Normalize a wire path to its stored form: `/`-separated segments with no
/// leading or trailing slash, no empty or `.` segments. The empty string is
/// the root directory.
///
/// `..` segments, NUL bytes, backslashes, and drive- or UNC-style prefixes
/// are rejected rather than resolved.
pub fn normalize(raw: &str) -> Result<String, PathError> {
  if raw.contains('\0') {
    return Err(PathError::InvalidSegment(raw.replace('\0', "\\0")));
  }
  if raw.starts_with("\\\\") {
    return Err(PathError::NotRelative(raw.to_string()));
  }
  let mut segments = Vec::new();
  for segment in raw.split('/') {
    match segment {
      "" | "." => continue,
      ".." => return Err(PathError::Traversal(raw.to_string())),
      _ => {
        if segment.contains('\\') {
          return Err(PathError::InvalidSegment(raw.to_string()));
        }
        segments.push(segment);
      }
    }
  }
  if let Some(first) = segments.first()
    && first.len() >= 2
    && first.as_bytes()[1] == b':'
    && first.as_bytes()[0].is_ascii_alphabetic()
  {
    return Err(PathError::NotRelative(raw.to_string()));
  }
  Ok(segments.join("/"))
}

/// True when any segment of the (normalized) path starts with a dot.
pub fn is_hidden(api_path: &str) -> bool {
  api_path.split('/').any(|segment| segment.starts_with('.'))
}

/// Split a normalized path into `(parent, name)`. The root splits into two
/// empty strings.
pub fn split(api_path: &str) -> (&str, &str) {
  match api_path.rsplit_once('/') {
    Some((parent, name)) => (parent, name),
    None => ("", api_path),
  }
}

/// Join a parent path and a child name back into a normalized path.
pub fn join(parent: &str, name: &str) -> String {
  if parent.is_empty() {
    name.to_string()
  } else {
    format!("{parent}/{name}")
  }
}

/// Split a name into `(stem, extension)` where the extension keeps its dot.
/// Names without a dot, and dotfiles, have an empty extension.
pub fn split_ext(name: &str) -> (&str, &str) {
  match name.rfind('.') {
    Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
    _ => (name, ""),
  }
}

/// Percent-escape a path for use in a `Location` header.
pub fn url_escape(api_path: &str) -> String {
  utf8_percent_encode(api_path, LOCATION_KEEP).to_string()
}

/// The filesystem location every API path is resolved beneath.
#[derive(Debug, Clone)]
pub struct RootDir {
  root: PathBuf,
}

impl RootDir {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn as_path(&self) -> &Path {
    &self.root
  }

  /// Map an API path to its on-disk location, strictly beneath the root.
  pub fn resolve(&self, api_path: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize(api_path)?;
    let mut full = self.root.clone();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
      full.push(segment);
    }
    Ok(full)
  }

  /// Map an on-disk location under the root back to its API path.
  pub fn to_api(&self, fs_path: &Path) -> Option<String> {
    let relative = fs_path.strip_prefix(&self.root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
      match component {
        Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
        Component::CurDir => {}
        _ => return None,
      }
    }
    Some(segments.join("/"))
  }
}
