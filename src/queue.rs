//! The bounded connection queue between the acceptor and the worker pool
//! (§3 RequestQueue, §4.B).
//!
//! The reference server hands accepted connections to a `Queue.Queue`
//! that workers block on; here `std::sync::mpsc::sync_channel` plays the
//! same role, with a `Shutdown` message replacing the reference server's
//! `None`-as-poison-pill convention so every worker wakes and exits once
//! the server stops, instead of relying on a sentinel value workers must
//! remember to re-enqueue for their siblings.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use crate::connection::Connection;

pub enum Message {
    Accepted(Connection),
    Shutdown,
}

#[derive(Clone)]
pub struct QueueSender(SyncSender<Message>);

pub struct QueueReceiver(Receiver<Message>);

/// Builds a bounded queue. `capacity` mirrors the reference server's
/// `request_queue_size`; `None` falls back to a generous default so a
/// burst of accepted connections never blocks the acceptor thread for
/// long stretches.
pub fn bounded(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = sync_channel(capacity.unwrap_or(64));
    (QueueSender(tx), QueueReceiver(rx))
}

impl QueueSender {
    pub fn send(&self, conn: Connection) -> Result<(), Connection> {
        match self.0.send(Message::Accepted(conn)) {
            Ok(()) => Ok(()),
            Err(e) => match e.0 {
                Message::Accepted(conn) => Err(conn),
                Message::Shutdown => unreachable!(),
            },
        }
    }

    pub fn try_send(&self, conn: Connection) -> Result<(), TrySendError<Connection>> {
        match self.0.try_send(Message::Accepted(conn)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(Message::Accepted(conn))) => Err(TrySendError::Full(conn)),
            Err(TrySendError::Disconnected(Message::Accepted(conn))) => {
                Err(TrySendError::Disconnected(conn))
            }
            _ => unreachable!(),
        }
    }

    /// Broadcasts one shutdown sentinel per worker so every worker thread
    /// observes it and exits.
    pub fn shutdown_all(&self, worker_count: usize) {
        for _ in 0..worker_count {
            let _ = self.0.send(Message::Shutdown);
        }
    }
}

impl QueueReceiver {
    pub fn recv(&self) -> Option<Message> {
        self.0.recv().ok()
    }
}
