use std::sync::OnceLock;

use jsonschema::Validator;
use serde_json::{Map, Value, json};

static SCHEMA: &str = include_str!("../schemas/nbformat.v4.schema.json");

fn validator() -> &'static Validator {
  static VALIDATOR: OnceLock<Validator> = OnceLock::new();
  VALIDATOR.get_or_init(|| {
    let schema: Value =
      serde_json::from_str(SCHEMA).expect("embedded notebook schema is valid JSON");
    jsonschema::validator_for(&schema).expect("embedded notebook schema compiles")
  })
}

/// Check a notebook document against the format schema, returning one
/// message per violation.
pub fn validate(doc: &Value) -> Vec<String> {
  validator().iter_errors(doc).map(|err| err.to_string()).collect()
}

/// Human-readable summary attached to entries whose document fails
/// validation; `None` for a clean document. Reads never fail on this.
pub fn validation_message(doc: &Value) -> Option<String> {
  let errors = validate(doc);
  if errors.is_empty() {
    None
  } else {
    Some(format!("Notebook validation failed: {}", errors.join("; ")))
  }
}

/// Parsed documents always expose a `metadata` mapping, even invalid ones.
pub fn normalize(doc: &mut Value) {
  if let Value::Object(map) = doc {
    map
      .entry("metadata")
      .or_insert_with(|| Value::Object(Map::new()));
  }
}

/// Parse notebook bytes from disk.
pub fn from_bytes(bytes: &[u8]) -> Result<Value, serde_json::Error> {
  let mut doc: Value = serde_json::from_slice(bytes)?;
  normalize(&mut doc);
  Ok(doc)
}

/// Canonical serialized form written to disk.
pub fn to_canonical_bytes(doc: &Value) -> Vec<u8> {
  let mut out = serde_json::to_vec_pretty(doc).expect("a JSON value always serializes");
  out.push(b'\n');
  out
}

/// The document written for a freshly created untitled notebook.
pub fn empty_notebook() -> Value {
  json!({
    "cells": [],
    "metadata": {},
    "nbformat": 4,
    "nbformat_minor": 5,
  })
}
