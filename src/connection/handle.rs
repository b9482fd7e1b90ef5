//! Public connection handle exported by the crate.

use std::{thread, time::Duration};

use crossbeam_channel::Sender;
use log::warn;
use parking_lot::Mutex;

use super::{
    backoff::BackoffPolicy,
    config::ConnectionConfig,
    listener::ConnectionListener,
    payload::Payload,
    transport::Transport,
    worker::{ConnectionCommand, spawn_worker},
};

/// A persistent duplex connection.
///
/// Construction immediately starts connecting. The connection reconnects
/// after failures until [`stop`](Self::stop) or [`destroy`](Self::destroy) is
/// called. None of the methods report failure: outcomes reach the
/// [`ConnectionListener`] supplied at construction.
pub struct Connection {
    tx: Mutex<Option<Sender<ConnectionCommand>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    shutdown_timeout: Duration,
    address: String,
}

impl Connection {
    pub(crate) fn spawn<T, L>(
        config: ConnectionConfig,
        transport: T,
        listener: L,
        backoff: Box<dyn BackoffPolicy>,
    ) -> std::io::Result<Self>
    where
        T: Transport,
        L: ConnectionListener,
    {
        let shutdown_timeout = config.shutdown_timeout;
        let address = config.address.to_string();
        let (tx, handle) = spawn_worker(config, transport, listener, backoff)?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            shutdown_timeout,
            address,
        })
    }

    /// Address this connection targets.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Clear a previous operator close and connect if disconnected.
    pub fn start(&self) {
        self.command(ConnectionCommand::Start);
    }

    /// Transmit `payload`, or queue it until the connection next opens.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.command(ConnectionCommand::Send(payload.into()));
    }

    /// Close the connection and suppress reconnection until [`start`](Self::start).
    pub fn stop(&self) {
        self.command(ConnectionCommand::Stop);
    }

    /// Tear the connection down for good. Safe to call more than once.
    pub fn destroy(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if tx.send(ConnectionCommand::Destroy(ack_tx)).is_ok()
            && ack_rx.recv_timeout(self.shutdown_timeout).is_err()
        {
            warn!(
                "connection to {} did not acknowledge destroy within {:?}",
                self.address, self.shutdown_timeout
            );
            return;
        }
        self.join_worker();
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.tx.lock().is_none()
    }

    fn command(&self, command: ConnectionCommand) {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            warn!("connection to {} destroyed; ignoring {command:?}", self.address);
            return;
        };
        if tx.send(command).is_err() {
            warn!("connection worker for {} exited unexpectedly", self.address);
        }
    }

    fn join_worker(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("connection worker for {} panicked", self.address);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
