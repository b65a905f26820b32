//! Data models for modelkit.
//!
//! Defines the core types exchanged between the HTTP layer and the
//! export package builder: bundle types, export requests, archive entries
//! and the per-export lifecycle phases.

mod bundle;
mod entry;

pub use bundle::*;
pub use entry::*;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
