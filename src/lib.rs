#[macro_use]
extern crate tracing;

pub mod api;
pub mod checkpoints;
pub mod contents;
pub mod model;
pub mod notebook;
pub mod path;
pub mod state;
