//! Host-facing records.
//!
//! Everything here derives `serde::Serialize` + `serde::Deserialize` with
//! camelCase field names so hosts can log or forward results as JSON.

pub mod events;
