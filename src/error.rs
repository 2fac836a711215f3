//! Crate-level error type.
//!
//! Construction and configuration failures surface here. Per-query failures
//! never do: those are reported through the `ResultSet` handed to the
//! query's callback.

use thiserror::Error;

use crate::pg::PgError;

#[derive(Error, Debug)]
pub enum Error {
    /// Connecting or authenticating a pool connection failed, or the
    /// connection string was invalid.
    #[error("connection setup failed: {0}")]
    Setup(#[from] PgError),

    /// Creating or registering with the readiness poll failed, or a thread
    /// could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine's I/O thread terminated before reporting its startup
    /// outcome.
    #[error("engine startup failed: {0}")]
    Startup(String),
}
