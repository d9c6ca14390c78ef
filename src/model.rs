use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry kinds exposed by the contents API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
  Directory,
  Notebook,
  File,
}

impl fmt::Display for EntryType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntryType::Directory => write!(f, "directory"),
      EntryType::Notebook => write!(f, "notebook"),
      EntryType::File => write!(f, "file"),
    }
  }
}

/// Supported content formats for payloads handled by the contents API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
  Json,
  Text,
  Base64,
}

/// The `content` field of an entry: file text or base64, a directory
/// listing, or a notebook document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ContentPayload {
  Text(String),
  Listing(Vec<ContentsEntry>),
  Notebook(Value),
}

/// A single entry in the contents namespace.
///
/// `content`, `format`, `mimetype`, `size` and the timestamps are always on
/// the wire (null when unset); `message`, `hash` and `hash_algorithm` only
/// appear when populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentsEntry {
  pub name: String,
  pub path: String,
  #[serde(rename = "type")]
  pub entry_type: EntryType,
  pub writable: bool,
  pub created: Option<DateTime<Utc>>,
  pub last_modified: Option<DateTime<Utc>>,
  pub size: Option<u64>,
  pub mimetype: Option<String>,
  pub format: Option<ContentFormat>,
  pub content: Option<ContentPayload>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hash: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hash_algorithm: Option<String>,
}

/// A stored snapshot of one file, addressed by an opaque id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
  pub id: String,
  pub last_modified: DateTime<Utc>,
}

/// Query parameters accepted by `GET /api/contents/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GetParams {
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub entry_type: Option<EntryType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<ContentFormat>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "opt_bool_as_int"
  )]
  pub content: Option<bool>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "opt_bool_as_int"
  )]
  pub hash: Option<bool>,
}

/// Body accepted by `POST /api/contents/{path}`: auto-named creation or copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CreateModel {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub copy_from: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ext: Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub entry_type: Option<EntryType>,
}

/// Body accepted by `PATCH /api/contents/{path}` to rename an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameModel {
  pub path: String,
}

/// Body accepted by `PUT /api/contents/{path}` for uploads and mkdir.
///
/// `copy_from` is carried only so the façade can reject it: copying is a
/// POST-only verb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SaveModel {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub entry_type: Option<EntryType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<ContentFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub copy_from: Option<String>,
}

/// Advisory mimetype for file entries; directories and notebooks carry none.
pub fn guess_mimetype(name: &str) -> Option<String> {
  mime_guess::from_path(name).first_raw().map(str::to_string)
}

mod opt_bool_as_int {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    match value {
      Some(flag) => {
        let encoded: u8 = if *flag { 1 } else { 0 };
        serializer.serialize_some(&encoded)
      }
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = Option::<u8>::deserialize(deserializer)?;
    Ok(raw.map(|value| value != 0))
  }
}
