// Copyright (C) 2026 mom-client-core contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A single-threaded ordered task runner bound to one connection. Provider callbacks submit
//! tasks here instead of running user code directly on a provider thread; the worker thread
//! drains them strictly in submission order and never runs two concurrently.
//!
//! The connection keeps this thread's `JoinHandle` for as long as it is open -- the Rust
//! translation of "non-daemon thread keeps the host alive": losing the handle (or the process
//! exiting uncleanly) is the only way pending work is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Executor {
    sender: flume::Sender<Task>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Executor {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = flume::unbounded::<Task>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                // Drain everything queued before honoring shutdown, so a close() that races a
                // just-submitted task still lets that task run.
                while let Ok(task) = receiver.recv() {
                    task();
                    if worker_shutdown.load(Ordering::Acquire) && receiver.is_empty() {
                        break;
                    }
                }
                debug!("executor thread exiting");
            })
            .expect("failed to spawn executor thread");

        Self {
            sender,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Submits a task for ordered, single-threaded execution. Silently dropped if the executor
    /// has already shut down -- a double shutdown is tolerated rather than escalated.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(task)).is_err() {
            warn!("executor task submitted after shutdown; dropping");
        }
    }

    /// Initiates shutdown: no new tasks are accepted after this returns, but everything already
    /// queued is allowed to finish first. Only the connection's own `close()` calls this.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Wake the worker in case the queue is currently empty and it's blocked in recv().
        let _ = self.sender.send(Box::new(|| {}));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}
