//! pgpipe: a pipelined PostgreSQL query engine for high-fanout workloads.
//!
//! Application code pushes parameterized SQL with a completion callback;
//! queries execute concurrently across a fixed pool of long-lived
//! connections, with multiple queries in flight per connection. The engine
//! targets workloads of many small point queries where latency is dominated
//! by protocol round-trips, not server-side compute.
//!
//! ```no_run
//! use pgpipe::{Param, ProcessorConfig, Query, QueryProcessor};
//!
//! let config = ProcessorConfig::new("host=/var/run/postgresql dbname=app user=app")
//!     .connections(8)
//!     .pipeline_depth(8);
//! let mut processor = QueryProcessor::create(config).expect("connect");
//!
//! processor.push(
//!     Query::new("select email from user_account where user_account_id=$1")
//!         .bind(Param::varchar("f8fe3c30-c3ee-43e3-b0f9-6829553aba64")),
//!     |result| {
//!         if let Some(err) = result.error() {
//!             eprintln!("query failed: {}", err);
//!         } else if let Some(row) = result.rows.first() {
//!             println!("email = {}", row.get_or("email", "<none>"));
//!         }
//!     },
//! );
//!
//! // Waits for in-flight queries; queued-but-unsent ones are discarded
//! processor.shutdown();
//! ```
//!
//! Guarantees:
//! - every callback runs exactly once, on a worker thread, or not at all if
//!   its request was still queued when shutdown began
//! - callbacks of queries sent on the same connection run in push order;
//!   across connections order is unspecified
//! - a full request queue blocks `push`; this is the engine's only
//!   back-pressure mechanism
//!
//! Per-query failures are values: a `ResultSet` with a non-empty error text.
//! The engine itself only errors at construction.

pub mod pg;

mod error;
mod pool;
mod processor;
mod query;
mod results;
mod state;
mod workers;

pub use error::Error;
pub use pg::{Oid, Param, PgConfig, PgError};
pub use processor::{ProcessorConfig, QueryProcessor};
pub use query::{Callback, Query};
pub use results::{ResultSet, Row};
