//! # Radio Status
//!
//! Read-only snapshot of everything a front panel shows, republished by the
//! controller after every event that changes it.
//!
//! ## Status Text:
//! - `OFFLINE`: no link (initial state, after a clean disconnect)
//! - `PERM CHECK` → `NET SYNC` → `LINK EST`: connect progress
//! - `ERR: …`: the last failure, see `RadioError::status_code`

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use crate::config::ChannelConfig;

pub const STATUS_OFFLINE: &str = "OFFLINE";
pub const STATUS_PERM_CHECK: &str = "PERM CHECK";
pub const STATUS_NET_SYNC: &str = "NET SYNC";
pub const STATUS_LINK_EST: &str = "LINK EST";

/// Newest transcript entries kept in the log.
pub const TRANSCRIPT_CAPACITY: usize = 50;

/// Single-glyph activity indicator.
///
/// ## Priority:
/// Transmitting beats receiving, receiving beats a squelch tail; otherwise
/// standby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indicator {
    Tx,
    Rx,
    Sq,
    Stby,
}

impl Indicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Indicator::Tx => "TX",
            Indicator::Rx => "RX",
            Indicator::Sq => "SQ",
            Indicator::Stby => "STBY",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioStatus {
    /// Id of the live (or connecting) session
    pub session_id: Option<Uuid>,
    pub status_text: String,
    pub connecting: bool,
    pub connected: bool,
    /// Push-to-talk held and the gate is open
    pub transmitting: bool,
    /// Response audio is scheduled or playing
    pub model_talking: bool,
    /// A static burst is audible
    pub squelching: bool,
    pub active_speaker: Option<String>,
    pub volume: u8,
    pub channel: ChannelConfig,
    /// Response chunks dropped because they failed to decode
    pub decode_failures: u64,
}

impl RadioStatus {
    pub fn new(channel: ChannelConfig, volume: u8) -> Self {
        Self {
            session_id: None,
            status_text: STATUS_OFFLINE.to_string(),
            connecting: false,
            connected: false,
            transmitting: false,
            model_talking: false,
            squelching: false,
            active_speaker: None,
            volume,
            channel,
            decode_failures: 0,
        }
    }

    pub fn indicator(&self) -> Indicator {
        if self.transmitting {
            Indicator::Tx
        } else if self.model_talking {
            Indicator::Rx
        } else if self.squelching {
            Indicator::Sq
        } else {
            Indicator::Stby
        }
    }
}

impl fmt::Display for RadioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} MHz | {} | vol {}",
            self.indicator(),
            self.channel.name,
            self.channel.frequency,
            self.status_text,
            self.volume
        )?;
        if let Some(speaker) = &self.active_speaker {
            write!(f, " | {}", speaker)?;
        }
        Ok(())
    }
}

/// One received transcript fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Bounded transcript history, oldest first.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: VecDeque<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: &str, text: &str) {
        if self.entries.len() == TRANSCRIPT_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(TranscriptEntry {
            speaker: speaker.to_string(),
            text: text.to_string(),
            received_at: Utc::now(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn status() -> RadioStatus {
        RadioStatus::new(AppConfig::default().channels[0].clone(), 70)
    }

    #[test]
    fn test_indicator_priority() {
        let mut status = status();
        assert_eq!(status.indicator(), Indicator::Stby);

        status.squelching = true;
        assert_eq!(status.indicator(), Indicator::Sq);

        status.model_talking = true;
        assert_eq!(status.indicator(), Indicator::Rx);

        status.transmitting = true;
        assert_eq!(status.indicator(), Indicator::Tx);
    }

    #[test]
    fn test_initial_status_is_offline() {
        let status = status();
        assert_eq!(status.status_text, STATUS_OFFLINE);
        assert!(!status.connected && !status.connecting);
        assert!(status.to_string().contains("CH 01"));
    }

    #[test]
    fn test_transcript_log_keeps_newest() {
        let mut log = TranscriptLog::new();
        for i in 0..(TRANSCRIPT_CAPACITY + 5) {
            log.push("DISPATCH", &format!("message {}", i));
        }
        assert_eq!(log.len(), TRANSCRIPT_CAPACITY);
        assert_eq!(log.entries().next().unwrap().text, "message 5");
    }
}
