//! Connection pool: owns every connection and the single I/O thread that
//! drives them.
//!
//! The I/O thread sleeps on the request flag while the pool is idle. Each
//! wake runs the drive loop: submit queued requests to ready connections,
//! then block on socket readiness until every in-flight query has been
//! answered, re-draining the request queue after every readiness wake so
//! requests that arrived while blocked are picked up before sleeping again.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use mio::{Events, Poll, Token};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::pg::connection::{PgConfig, PipelineConnection};
use crate::query::{QueryRequest, QueryResponse};
use crate::results::ResultSet;
use crate::state::ProcessingState;

const CONNECTION_LOST: &str = "connection to server was lost";
const NO_CONNECTIONS: &str = "no database connections available";

/// Handle to the I/O thread.
pub(crate) struct ConnectionPool {
    thread: Option<JoinHandle<()>>,
}

impl ConnectionPool {
    /// Spawn the I/O thread and wait for it to establish every connection.
    /// A connect or registration failure surfaces here and the thread is
    /// reaped before returning.
    pub(crate) fn spawn(
        config: PgConfig,
        connections: usize,
        pipeline_depth: usize,
        state: Arc<ProcessingState>,
    ) -> Result<Self, Error> {
        let (startup_tx, startup_rx) = bounded::<Result<(), Error>>(1);

        let thread = thread::Builder::new()
            .name("pgpipe-io".to_string())
            .spawn(move || {
                match PoolDriver::connect_all(&config, connections, pipeline_depth, state) {
                    Ok(mut driver) => {
                        let _ = startup_tx.send(Ok(()));
                        driver.run();
                    }
                    Err(e) => {
                        let _ = startup_tx.send(Err(e));
                    }
                }
            })?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::Startup(
                    "I/O thread terminated during startup".to_string(),
                ))
            }
        }
    }

    /// Wait for the I/O thread to finish (it exits once shutdown has begun
    /// and every in-flight query has been answered).
    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The I/O thread's working state: the readiness poll and every connection,
/// keyed by registration token. Touched by exactly one thread for the
/// lifetime of the pool.
struct PoolDriver {
    poll: Poll,
    events: Events,
    connections: HashMap<Token, PipelineConnection>,
    state: Arc<ProcessingState>,
}

impl PoolDriver {
    fn connect_all(
        config: &PgConfig,
        connections: usize,
        pipeline_depth: usize,
        state: Arc<ProcessingState>,
    ) -> Result<Self, Error> {
        let poll = Poll::new()?;
        let count = connections.max(1);
        let mut map = HashMap::with_capacity(count);

        for index in 0..count {
            let mut conn = PipelineConnection::connect(config, pipeline_depth)?;
            let token = Token(index);
            conn.register(poll.registry(), token)?;
            map.insert(token, conn);
        }

        info!(connections = map.len(), "connection pool established");

        Ok(Self {
            poll,
            events: Events::with_capacity((count * 2).max(8)),
            connections: map,
            state,
        })
    }

    fn run(&mut self) {
        while self.state.is_running() {
            self.state.request_flag.wait();
            self.drive();
        }

        // After this point no response will ever be produced again; the
        // final raise lets the dispatcher drain what is left and exit.
        self.state.mark_pool_exited();
        self.state.response_flag.raise();
        debug!("I/O thread exiting");
    }

    /// One wake of the I/O thread: alternate between submitting queued
    /// requests and waiting on readiness until the pool is idle and the
    /// queue is empty.
    fn drive(&mut self) {
        loop {
            self.submit_available();

            if self.connections.is_empty() {
                self.fail_queued_requests();
            }

            if self.all_done() && self.state.requests_empty() {
                self.state.request_flag.clear();
                // A push can race the clear; re-check before sleeping
                if self.state.requests_empty() {
                    return;
                }
                continue;
            }

            self.wait_for_readiness();
        }
    }

    /// First-ready-wins: hand queued requests to connections with pipeline
    /// room until the queue is empty or every connection is saturated.
    fn submit_available(&mut self) {
        while self.has_ready_connection() {
            match self.state.try_pop_request() {
                Some(request) => self.submit(request),
                None => return,
            }
        }
    }

    fn has_ready_connection(&self) -> bool {
        self.connections.values().any(|c| c.is_ready())
    }

    fn all_done(&self) -> bool {
        self.connections.values().all(|c| c.is_done())
    }

    fn submit(&mut self, request: QueryRequest) {
        let mut request = Some(request);
        let mut accepted: Option<Token> = None;

        for (&token, conn) in self.connections.iter_mut() {
            match conn.send_if_ready(request.take().expect("request present")) {
                Ok(()) => {
                    accepted = Some(token);
                    break;
                }
                Err(returned) => request = Some(returned),
            }
        }

        match accepted {
            Some(token) => {
                if self.connections[&token].is_broken() {
                    self.teardown(token, CONNECTION_LOST);
                }
            }
            None => {
                // Only reachable if every connection broke since the
                // readiness check; answer the request instead of losing it
                if let Some(request) = request {
                    self.respond_with_error(request, NO_CONNECTIONS);
                }
            }
        }
    }

    /// With no connections left there is nothing to wait on: answer every
    /// queued request with an error so producers and callers are not
    /// stranded.
    fn fail_queued_requests(&mut self) {
        let mut failed = 0usize;
        while let Some(request) = self.state.try_pop_request() {
            self.respond_with_error(request, NO_CONNECTIONS);
            failed += 1;
        }
        if failed > 0 {
            warn!(failed, "failed queued requests: no connections");
        }
    }

    fn respond_with_error(&self, request: QueryRequest, reason: &str) {
        let response = QueryResponse {
            result_set: ResultSet::from_error(reason),
            callback: request.callback,
        };
        if self.state.response_sink().send(response).is_ok() {
            self.state.response_flag.raise();
        }
    }

    fn wait_for_readiness(&mut self) {
        if let Err(e) = self.poll.poll(&mut self.events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                return;
            }
            warn!(error = %e, "readiness wait failed; tearing down pool");
            let tokens: Vec<Token> = self.connections.keys().copied().collect();
            for token in tokens {
                self.teardown(token, CONNECTION_LOST);
            }
            return;
        }

        let mut pushed = 0usize;
        let mut broken: Vec<Token> = Vec::new();

        for event in self.events.iter() {
            let token = event.token();
            let Some(conn) = self.connections.get_mut(&token) else {
                continue;
            };

            if event.is_writable() {
                conn.flush_output();
            }
            if event.is_readable() {
                pushed += conn.drain_results(self.state.response_sink());
            }
            if conn.is_broken() {
                broken.push(token);
            }
        }

        if pushed > 0 {
            self.state.response_flag.raise();
        }
        for token in broken {
            self.teardown(token, CONNECTION_LOST);
        }
    }

    fn teardown(&mut self, token: Token, reason: &str) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = conn.deregister(self.poll.registry());
            let pushed = conn.fail_all(reason, self.state.response_sink());
            if pushed > 0 {
                self.state.response_flag.raise();
            }
            warn!(token = token.0, reason, "connection removed from pool");
        }
    }
}
