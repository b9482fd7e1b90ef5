//! Connection state machine.
//!
//! [`ConnectionCore`] owns the transport handle, the outbound buffer, the
//! heartbeat monitor and the reconnection deadline. It is driven entirely by
//! method calls carrying the current [`Instant`], so the worker thread and
//! the unit tests exercise the same transitions.

use std::time::Instant;

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use crate::rate_limited_warner::RateLimitedWarner;

use super::{
    backoff::BackoffPolicy,
    buffer::OutboundBuffer,
    config::ConnectionConfig,
    heartbeat::HeartbeatMonitor,
    listener::{CloseReason, ConnectionError, ConnectionListener},
    payload::Payload,
    transport::{
        EventSink, OpenTarget, TaggedEvent, Transport, TransportError, TransportEvent,
        TransportHandle,
    },
};

/// Lifecycle state of the single logical connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

macro_rules! lifecycle {
    ($core:expr, $($arg:tt)+) => {
        if $core.config.debug {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

pub struct ConnectionCore<T: Transport, L: ConnectionListener> {
    config: ConnectionConfig,
    target: OpenTarget,
    transport: T,
    listener: L,
    backoff: Box<dyn BackoffPolicy>,
    events: Sender<TaggedEvent>,
    state: ConnectionState,
    handle: Option<Box<dyn TransportHandle>>,
    generation: u64,
    buffer: OutboundBuffer,
    attempts: u32,
    manual_close: bool,
    reconnect_at: Option<Instant>,
    heartbeat: HeartbeatMonitor,
    warner: RateLimitedWarner,
    destroyed: bool,
}

impl<T: Transport, L: ConnectionListener> ConnectionCore<T, L> {
    /// Build a core in the disconnected state. Call [`connect`](Self::connect)
    /// to begin the first attempt.
    pub fn new(
        config: ConnectionConfig,
        transport: T,
        listener: L,
        backoff: Box<dyn BackoffPolicy>,
        events: Sender<TaggedEvent>,
    ) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat.clone());
        let warner = RateLimitedWarner::new(config.warn_interval);
        Self {
            target: OpenTarget::from(&config),
            config,
            transport,
            listener,
            backoff,
            events,
            state: ConnectionState::Disconnected,
            handle: None,
            generation: 0,
            buffer: OutboundBuffer::new(),
            attempts: 0,
            manual_close: false,
            reconnect_at: None,
            heartbeat,
            warner,
            destroyed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn buffered(&self) -> &OutboundBuffer {
        &self.buffer
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat.is_active()
    }

    pub fn is_manually_closed(&self) -> bool {
        self.manual_close
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.reconnect_at, self.heartbeat.next_tick()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Disconnected → Connecting.
    pub fn connect(&mut self, now: Instant) {
        if self.destroyed || self.state != ConnectionState::Disconnected {
            return;
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        lifecycle!(
            self,
            "connecting to {} in {} mode (attempt {})",
            self.config.address,
            self.config.mode.as_str(),
            self.attempts
        );
        let sink = EventSink::new(self.generation, self.events.clone());
        match self.transport.open(&self.target, sink) {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => self.establishment_failed(err, now),
        }
    }

    /// Clear the manual-close flag and connect if currently disconnected.
    pub fn start(&mut self, now: Instant) {
        if self.destroyed {
            warn!("start ignored: connection to {} destroyed", self.config.address);
            return;
        }
        self.manual_close = false;
        if self.state == ConnectionState::Disconnected {
            self.reconnect_at = None;
            self.connect(now);
        }
    }

    /// Transmit when open, otherwise queue. Never fails observably.
    pub fn send(&mut self, payload: Payload) {
        if self.destroyed {
            warn!(
                "message dropped: connection to {} destroyed",
                self.config.address
            );
            return;
        }
        if self.state == ConnectionState::Open
            && let Some(handle) = self.handle.as_mut()
        {
            match handle.send(payload.clone()) {
                Ok(()) => return,
                Err(err) => debug!("send failed, buffering message: {err}"),
            }
        }
        self.buffer.push(payload);
        self.warner.record();
        let address = &self.config.address;
        self.warner.warn_if_due(|count| {
            warn!("{count} messages queued while {address} is unavailable");
        });
    }

    /// Operator close: suppress reconnection and close the transport.
    pub fn stop(&mut self) {
        self.manual_close = true;
        self.reconnect_at = None;
        self.heartbeat.disarm();
        let Some(mut handle) = self.handle.take() else {
            self.state = ConnectionState::Disconnected;
            return;
        };
        self.state = ConnectionState::Closing;
        handle.close();
        drop(handle);
        self.state = ConnectionState::Disconnected;
        lifecycle!(self, "connection to {} closed by operator", self.config.address);
        self.listener.on_close(&CloseReason::Operator);
    }

    /// Terminal teardown. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        if !self.buffer.is_empty() {
            debug!("discarding {} queued messages", self.buffer.len());
        }
        self.buffer.clear();
        self.destroyed = true;
        lifecycle!(self, "connection to {} destroyed", self.config.address);
    }

    /// Service due timers.
    pub fn on_timer(&mut self, now: Instant) {
        if let Some(due) = self.reconnect_at
            && due <= now
        {
            self.reconnect_at = None;
            if !self.manual_close {
                self.connect(now);
            }
        }
        if self.state == ConnectionState::Open && self.heartbeat.poll(now) {
            if let Some(message) = self.heartbeat.message().cloned() {
                self.send(message);
            }
        }
    }

    /// Apply an event reported by a transport handle.
    pub fn handle_event(&mut self, generation: u64, event: TransportEvent, now: Instant) {
        if let TransportEvent::Unsent(payloads) = event {
            self.reclaim(generation, payloads);
            return;
        }
        if generation != self.generation || self.handle.is_none() {
            debug!("ignoring {event:?} from superseded transport {generation}");
            return;
        }
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Opened) => self.opened(now),
            (ConnectionState::Connecting, TransportEvent::Error(err)) => {
                self.handle = None;
                self.establishment_failed(err, now);
            }
            (ConnectionState::Connecting, TransportEvent::Closed { .. }) => {
                self.handle = None;
                self.establishment_failed(TransportError::ClosedDuringHandshake, now);
            }
            (ConnectionState::Open, TransportEvent::Message(payload)) => {
                self.listener.on_message(payload);
            }
            (ConnectionState::Open, TransportEvent::Error(err)) => {
                self.drop_connection();
                warn!("transport error on {}: {err}", self.config.address);
                self.listener.on_error(&ConnectionError::Transport(err));
                self.schedule_reconnect(now);
            }
            (ConnectionState::Open, TransportEvent::Closed { code, reason }) => {
                self.drop_connection();
                lifecycle!(
                    self,
                    "connection to {} closed by peer (code {code:?})",
                    self.config.address
                );
                self.listener
                    .on_close(&CloseReason::Abnormal { code, reason });
                self.schedule_reconnect(now);
            }
            (state, event) => {
                debug!("ignoring {event:?} while {}", state.as_str());
            }
        }
    }

    /// Put payloads a failed handle never wrote back at the head of the queue.
    fn reclaim(&mut self, generation: u64, payloads: Vec<Payload>) {
        if payloads.is_empty() {
            return;
        }
        if self.destroyed {
            debug!("discarding {} unsent messages", payloads.len());
            return;
        }
        lifecycle!(
            self,
            "requeueing {} unsent messages for {}",
            payloads.len(),
            self.config.address
        );
        self.buffer.requeue_front(payloads);
        // A newer handle is already open, so nothing else will flush these.
        if generation != self.generation && self.state == ConnectionState::Open {
            self.flush_buffer();
        }
    }

    fn opened(&mut self, now: Instant) {
        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.flush_buffer();
        self.heartbeat.arm(now);
        lifecycle!(self, "connection to {} open", self.config.address);
        self.listener.on_open();
    }

    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        let mut pending = self.buffer.drain();
        let mut sent = 0usize;
        while let Some(payload) = pending.next() {
            if let Err(err) = handle.send(payload.clone()) {
                warn!("flush interrupted after {sent} messages: {err}");
                self.buffer
                    .requeue_front(std::iter::once(payload).chain(pending));
                return;
            }
            sent += 1;
        }
        lifecycle!(self, "flushed {sent} queued messages");
    }

    fn drop_connection(&mut self) {
        self.heartbeat.disarm();
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    fn establishment_failed(&mut self, err: TransportError, now: Instant) {
        self.state = ConnectionState::Disconnected;
        warn!("failed to connect to {}: {err}", self.config.address);
        self.listener.on_error(&ConnectionError::Establishment {
            address: self.config.address.to_string(),
            source: err,
        });
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.manual_close || self.destroyed || !self.config.reconnect {
            return;
        }
        if self.reconnect_at.is_some() {
            debug!("reconnect already pending for {}", self.config.address);
            return;
        }
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.backoff.next_delay(self.attempts);
        self.reconnect_at = Some(now + delay);
        lifecycle!(
            self,
            "reconnecting to {} in {delay:?} (attempt {})",
            self.config.address,
            self.attempts
        );
    }
}
