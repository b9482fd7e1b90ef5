//! Worker thread that owns the connection state machine.
//!
//! The worker multiplexes three inputs with `crossbeam_channel::select!`:
//! commands from the [`Connection`](super::Connection) handle, events from the
//! active transport handle, and the next timer deadline (reconnect or
//! heartbeat). Every mutation of connection state happens here, one input at
//! a time, so listener callbacks never run concurrently.

use std::{thread, time::Instant};

use crossbeam_channel::{Receiver, Sender, at, never, select, unbounded};
use log::warn;

use super::{
    backoff::BackoffPolicy,
    config::ConnectionConfig,
    listener::ConnectionListener,
    payload::Payload,
    state::ConnectionCore,
    transport::{TaggedEvent, Transport},
};

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum ConnectionCommand {
    Start,
    Send(Payload),
    Stop,
    Destroy(Sender<()>),
}

pub fn spawn_worker<T, L>(
    config: ConnectionConfig,
    transport: T,
    listener: L,
    backoff: Box<dyn BackoffPolicy>,
) -> std::io::Result<(Sender<ConnectionCommand>, thread::JoinHandle<()>)>
where
    T: Transport,
    L: ConnectionListener,
{
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let name = format!("tyme-link-{}", config.address.host_str().unwrap_or("worker"));
    let handle = thread::Builder::new().name(name).spawn(move || {
        let core = ConnectionCore::new(config, transport, listener, backoff, event_tx);
        worker_loop(core, command_rx, event_rx);
    })?;
    Ok((command_tx, handle))
}

fn worker_loop<T, L>(
    mut core: ConnectionCore<T, L>,
    commands: Receiver<ConnectionCommand>,
    events: Receiver<TaggedEvent>,
) where
    T: Transport,
    L: ConnectionListener,
{
    core.connect(Instant::now());
    loop {
        let timer = match core.next_deadline() {
            Some(deadline) => at(deadline),
            None => never(),
        };
        select! {
            recv(commands) -> command => match command {
                Ok(ConnectionCommand::Start) => core.start(Instant::now()),
                Ok(ConnectionCommand::Send(payload)) => core.send(payload),
                Ok(ConnectionCommand::Stop) => core.stop(),
                Ok(ConnectionCommand::Destroy(ack)) => {
                    core.destroy();
                    let _ = ack.send(());
                    return;
                }
                Err(_) => {
                    warn!("connection handle dropped without destroy; tearing down");
                    core.destroy();
                    return;
                }
            },
            recv(events) -> tagged => {
                if let Ok(TaggedEvent { generation, event }) = tagged {
                    core.handle_event(generation, event, Instant::now());
                }
            },
            recv(timer) -> _ => core.on_timer(Instant::now()),
        }
    }
}
