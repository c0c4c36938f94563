//! The fixed-size worker pool (§3 WorkerThread, §4.C).
//!
//! Grounded on the reference server's `WorkerThread.run`: poll the shared
//! queue forever, and exit on the shutdown sentinel. Each worker owns the
//! connections it pulls off the queue for as long as they stay alive
//! (possibly many pipelined requests), matching the reference server's
//! one-thread-per-active-connection model rather than a per-request
//! handoff. `mpsc::Receiver` has only one consumer end, so the pool
//! shares it across threads behind a `Mutex`, the standard fan-out shape
//! for a blocking channel-backed pool.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::debug;

use crate::config::Config;
use crate::mount::MountTable;
use crate::queue::{Message, QueueReceiver};
use crate::driver;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` worker threads sharing `receiver`.
    pub fn spawn(
        count: usize,
        receiver: QueueReceiver,
        mounts: Arc<MountTable>,
        config: Arc<Config>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(count);
        for idx in 0..count {
            let receiver = Arc::clone(&receiver);
            let mounts = Arc::clone(&mounts);
            let config = Arc::clone(&config);
            let handle = thread::Builder::new()
                .name(format!("gateway-worker-{}", idx))
                .spawn(move || worker_loop(idx, &receiver, &mounts, &config))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        WorkerPool { handles }
    }

    /// Blocks until every worker thread has exited (after the queue has
    /// been sent its shutdown sentinels).
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(idx: usize, receiver: &Mutex<QueueReceiver>, mounts: &MountTable, config: &Config) {
    debug!("worker {} ready", idx);
    loop {
        let message = receiver.lock().unwrap_or_else(|e| e.into_inner()).recv();
        match message {
            Some(Message::Accepted(mut conn)) => {
                driver::communicate(&mut conn, mounts, config);
            }
            Some(Message::Shutdown) | None => {
                debug!("worker {} stopping", idx);
                return;
            }
        }
    }
}
