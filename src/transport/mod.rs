//! # Transport Boundary
//!
//! The session object that carries audio to and from the remote speech
//! service. The controller only relies on this contract:
//! - `connect(config, events)` → a live `SessionHandle` (may fail)
//! - `SessionHandle::send_realtime_input(chunk)` and `close()`
//! - callbacks delivered as `TransportEvent`s: opened, message, error, closed
//!
//! Each connect gets a fresh `TransportEvents` tagged with the controller's
//! session generation, so callbacks that straggle in after a disconnect are
//! recognised and dropped.

use async_trait::async_trait;

use crate::audio::codec::EncodedChunk;
use crate::config::{ChannelConfig, TransportConfig};
use crate::error::RadioResult;
use crate::radio::events::{ControllerEvent, EventSender};

pub mod live;

/// Parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub channel: ChannelConfig,
    pub input_sample_rate: u32,
}

/// One inbound server message, reduced to what the radio uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerPayload {
    /// Base64 16-bit PCM response audio
    pub audio: Option<String>,
    /// Fragment of the spoken response's transcript
    pub transcript: Option<String>,
    /// The model finished its turn
    pub turn_complete: bool,
    /// The model's turn was cut off; queued playback should stop
    pub interrupted: bool,
}

/// Transport lifecycle callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(ServerPayload),
    Error(String),
    Closed,
}

/// Generation-tagged sender handed to a transport for one session.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    sender: EventSender,
}

impl TransportEvents {
    pub fn new(generation: u64, sender: EventSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a callback. Returns false once the controller is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.sender
            .send(ControllerEvent::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Live connection owned by the controller.
pub trait SessionHandle: Send {
    fn send_realtime_input(&mut self, chunk: &EncodedChunk) -> RadioResult<()>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        config: SessionConfig,
        events: TransportEvents,
    ) -> RadioResult<Box<dyn SessionHandle>>;
}
