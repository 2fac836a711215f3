//! The public façade: processor configuration, the push API, the response
//! dispatcher, and the shutdown protocol.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::error::Error;
use crate::pg::connection::PgConfig;
use crate::pool::ConnectionPool;
use crate::query::{Callback, Query, QueryRequest, QueryResponse};
use crate::results::ResultSet;
use crate::state::ProcessingState;
use crate::workers::{CallbackPool, Task};

// ============================================================================
// Configuration
// ============================================================================

/// Engine configuration.
///
/// The defaults carry most applications; raise `connections` first when more
/// throughput is needed (but keep it under the server's connection limit),
/// then `pipeline_depth`.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Connection string: `key=value` pairs or a `postgres://` URL. A
    /// Unix-domain socket (`host=/var/run/postgresql`) avoids TCP overhead.
    pub conn_string: String,
    /// Number of pooled connections (default 4)
    pub connections: usize,
    /// Queries concurrently in flight per connection (default 4)
    pub pipeline_depth: usize,
    /// Capacity of the request and response queues (default 128); producers
    /// block while the request queue is full
    pub queue_capacity: usize,
    /// Threads in the callback worker pool (default 4)
    pub worker_threads: usize,
}

impl ProcessorConfig {
    pub fn new(conn_string: impl Into<String>) -> Self {
        Self {
            conn_string: conn_string.into(),
            connections: 4,
            pipeline_depth: 4,
            queue_capacity: 128,
            worker_threads: 4,
        }
    }

    /// Set the number of pooled connections.
    pub fn connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    /// Set the per-connection pipeline depth.
    pub fn pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth;
        self
    }

    /// Set the request/response queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the callback worker pool size.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

// ============================================================================
// Query Processor
// ============================================================================

/// A pipelined query engine over a fixed pool of connections.
///
/// Queries pushed here execute concurrently across the pool; each query's
/// callback is invoked exactly once with its result, on a worker thread.
/// Callbacks for queries sent on the same connection run in push order;
/// across connections there is no ordering guarantee.
///
/// Dropping the processor (or calling [`shutdown`](Self::shutdown)) waits
/// for queries already handed to a connection and invokes their callbacks;
/// requests still queued are discarded without invoking theirs.
pub struct QueryProcessor {
    state: Arc<ProcessingState>,
    pool: ConnectionPool,
    dispatcher: Option<JoinHandle<()>>,
    workers: CallbackPool,
}

impl QueryProcessor {
    /// Connect the pool and start the engine's threads. Returns once every
    /// connection is established; any connect or authentication failure
    /// surfaces as an error here.
    pub fn create(config: ProcessorConfig) -> Result<Self, Error> {
        let pg_config = PgConfig::parse(&config.conn_string)?;

        let state = Arc::new(ProcessingState::new(config.queue_capacity));
        let pool = ConnectionPool::spawn(
            pg_config,
            config.connections,
            config.pipeline_depth,
            Arc::clone(&state),
        )?;

        let workers = CallbackPool::new(config.worker_threads, config.queue_capacity)?;
        let tasks = workers.sender();
        let dispatcher = {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("pgpipe-dispatch".to_string())
                .spawn(move || dispatch_loop(state, tasks))?
        };

        Ok(Self {
            state,
            pool,
            dispatcher: Some(dispatcher),
            workers,
        })
    }

    /// Queue a query; `callback` receives the result exactly once. Blocks
    /// while the request queue is full. A no-op after shutdown has begun.
    pub fn push(
        &self,
        query: impl Into<Query>,
        callback: impl FnOnce(ResultSet) + Send + 'static,
    ) {
        self.push_request(query.into(), Some(Box::new(callback)));
    }

    /// Queue a query whose result is read and discarded (fire-and-forget).
    /// The query still occupies a pipeline slot until acknowledged.
    pub fn push_detached(&self, query: impl Into<Query>) {
        self.push_request(query.into(), None);
    }

    fn push_request(&self, query: Query, callback: Option<Callback>) {
        if !self.state.is_running() {
            return;
        }
        self.state.push_request(QueryRequest::new(query, callback));
    }

    /// Stop the engine: discard queued requests, wait for in-flight queries
    /// and their callbacks, then tear down every thread. Idempotent; also
    /// runs on drop. No callback runs after this returns.
    pub fn shutdown(&mut self) {
        if self.dispatcher.is_none() {
            return;
        }

        self.state.shutdown();
        self.pool.join();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        self.workers.shutdown();
        debug!("processor shut down");
    }
}

impl Drop for QueryProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Drain the response queue and post one worker task per callback-carrying
/// response. Runs until shutdown has begun, the I/O thread has exited, and
/// every remaining response has been dispatched.
fn dispatch_loop(state: Arc<ProcessingState>, tasks: Sender<Task>) {
    loop {
        state.response_flag.wait();
        drain_responses(&state, &tasks);
        state.response_flag.clear();
        // A response pushed between the drain and the clear must not sit
        // until the next wake
        drain_responses(&state, &tasks);

        if !state.is_running() && state.pool_exited() && state.responses_empty() {
            break;
        }
    }
    debug!("dispatcher exiting");
}

fn drain_responses(state: &ProcessingState, tasks: &Sender<Task>) {
    while let Some(response) = state.try_pop_response() {
        let QueryResponse {
            result_set,
            callback,
        } = response;

        if let Some(callback) = callback {
            let _ = tasks.send(Box::new(move || callback(result_set)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_builders() {
        let config = ProcessorConfig::new("host=localhost dbname=t");
        assert_eq!(config.connections, 4);
        assert_eq!(config.pipeline_depth, 4);
        assert_eq!(config.queue_capacity, 128);
        assert_eq!(config.worker_threads, 4);

        let config = config
            .connections(32)
            .pipeline_depth(32)
            .queue_capacity(178_000)
            .worker_threads(2);
        assert_eq!(config.connections, 32);
        assert_eq!(config.pipeline_depth, 32);
        assert_eq!(config.queue_capacity, 178_000);
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn test_create_fails_on_bad_conn_string() {
        let err = QueryProcessor::create(ProcessorConfig::new("definitely not valid"));
        assert!(err.is_err());
    }
}
