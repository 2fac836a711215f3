//! Fixed-size worker pool for user-callback dispatch.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::error;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of threads consuming a bounded task queue.
///
/// Each task is exactly one user-callback invocation. A panicking callback
/// is contained and logged; the worker keeps serving. On shutdown the queue
/// is disconnected, so every task already posted still runs before the
/// workers exit.
pub(crate) struct CallbackPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl CallbackPool {
    pub(crate) fn new(worker_count: usize, queue_capacity: usize) -> io::Result<Self> {
        let (sender, receiver): (Sender<Task>, Receiver<Task>) =
            bounded(queue_capacity.max(1));

        let workers = (0..worker_count.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("pgpipe-worker-{}", index))
                    .spawn(move || worker_loop(receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// A clone of the task queue's sending end. Sends block while the task
    /// queue is full.
    pub(crate) fn sender(&self) -> Sender<Task> {
        self.sender
            .as_ref()
            .expect("worker pool already shut down")
            .clone()
    }

    /// Disconnect the queue and join every worker. Tasks already posted run
    /// to completion first.
    pub(crate) fn shutdown(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for CallbackPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Task>) {
    // recv fails only once the queue is disconnected and empty
    while let Ok(task) = receiver.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("query callback panicked; continuing");
        }
    }
}
