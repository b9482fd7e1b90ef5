//! Transport seam between the state machine and the wire.
//!
//! A [`Transport`] opens one handle per connection attempt. The handle
//! carries outbound payloads; everything the wire reports back (open,
//! inbound messages, errors, close) travels through an [`EventSink`] tagged
//! with the attempt's generation so late events from a superseded handle can
//! be recognised and dropped.

use std::{io, time::Duration};

use crossbeam_channel::Sender;
use thiserror::Error;
use url::Url;

use super::{
    config::{ConnectionConfig, FrameMode, TlsOptions},
    payload::Payload,
};

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed before it opened")]
    ClosedDuringHandshake,
    /// The handle can no longer accept outbound payloads.
    #[error("transport is closed")]
    Closed,
}

/// What a transport needs to know to open a connection.
#[derive(Clone, Debug)]
pub struct OpenTarget {
    pub address: Url,
    pub mode: FrameMode,
    pub connect_timeout: Duration,
    pub tls: TlsOptions,
}

impl From<&ConnectionConfig> for OpenTarget {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            address: config.address.clone(),
            mode: config.mode,
            connect_timeout: config.connect_timeout,
            tls: config.tls.clone(),
        }
    }
}

/// Events reported by a transport handle.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Message(Payload),
    Error(TransportError),
    Closed { code: Option<u16>, reason: String },
    /// Payloads the handle accepted but never wrote, oldest first. Emitted
    /// before the `Error` or `Closed` event that ends the handle.
    Unsent(Vec<Payload>),
}

/// An event stamped with the generation of the handle that produced it.
#[derive(Debug)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Delivery end handed to a transport for one connection attempt.
#[derive(Clone, Debug)]
pub struct EventSink {
    generation: u64,
    tx: Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the owning connection is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn message(&self, payload: Payload) -> bool {
        self.emit(TransportEvent::Message(payload))
    }

    pub fn error(&self, error: TransportError) -> bool {
        self.emit(TransportEvent::Error(error))
    }

    pub fn unsent(&self, payloads: Vec<Payload>) -> bool {
        self.emit(TransportEvent::Unsent(payloads))
    }

    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }
}

/// A live connection attempt owned exclusively by the state machine.
pub trait TransportHandle: Send {
    /// Transmit a payload without blocking on the network.
    fn send(&mut self, payload: Payload) -> Result<(), TransportError>;

    /// Begin closing. Events emitted afterwards are ignored by the owner.
    fn close(&mut self);
}

/// Factory for transport handles.
pub trait Transport: Send + 'static {
    /// Start opening a connection. Success means the attempt is underway;
    /// the handle reports [`TransportEvent::Opened`] once established.
    fn open(
        &mut self,
        target: &OpenTarget,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}
