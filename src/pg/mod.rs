//! PostgreSQL wire client layer.
//!
//! A self-contained v3-protocol client tailored to pipelined operation:
//! every query is one Parse+Bind+Describe+Execute+Sync batch on the unnamed
//! statement, results come back in text format, and a connection carries up
//! to its pipeline depth of unacknowledged batches at a time.
//!
//! Architecture:
//! - `protocol`: wire message encoding/decoding and frame splitting
//! - `connection`: configuration, startup/authentication, pipelined sends
//!   and result draining
//! - `types`: type OIDs and textual parameters
//! - `scram`: SCRAM-SHA-256 authentication
//! - `error`: wire-level error type

pub mod connection;
pub mod error;
pub mod protocol;
pub mod scram;
pub mod types;

#[cfg(test)]
mod tests;

pub use connection::{PgConfig, PipelineConnection};
pub use error::{PgError, PgResult};
pub use types::{Oid, Param};
