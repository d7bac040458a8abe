//! # Transmission Gate
//!
//! Push-to-talk state machine deciding whether a captured frame reaches the
//! transport.
//!
//! ## State Transitions:
//! ```text
//!   Idle ──link opened──▶ Connected ──talk pressed──▶ Transmitting
//!    ▲                      │  ▲                         │
//!    └──────disconnect──────┘  └──────talk released──────┘
//!    ▲                                                   │
//!    └──────────────────disconnect───────────────────────┘
//! ```
//! Pressing talk while Idle is a no-op. Each accepted transition returns the
//! cue the controller should play; rejected ones return `None`.

use std::fmt;

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Idle,
    Connected,
    Transmitting,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Connected => "connected",
            GateState::Transmitting => "transmitting",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCue {
    /// Upward sweep (link up, talk pressed)
    Chirp,
    /// Short static burst (talk released)
    StaticBurst,
    /// Link dropped from Connected or Transmitting (release burst)
    Release,
}

#[derive(Debug, Default)]
pub struct TransmissionGate {
    state: GateState,
}

impl TransmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Idle → Connected once the session is established.
    pub fn link_established(&mut self) -> Option<GateCue> {
        match self.state {
            GateState::Idle => {
                self.state = GateState::Connected;
                Some(GateCue::Chirp)
            }
            _ => None,
        }
    }

    /// Any state → Idle. Returns `None` when already Idle.
    pub fn disconnect(&mut self) -> Option<GateCue> {
        match self.state {
            GateState::Idle => None,
            GateState::Connected | GateState::Transmitting => {
                self.state = GateState::Idle;
                Some(GateCue::Release)
            }
        }
    }

    /// Connected → Transmitting. Ignored in every other state.
    pub fn press_talk(&mut self) -> Option<GateCue> {
        match self.state {
            GateState::Connected => {
                self.state = GateState::Transmitting;
                Some(GateCue::Chirp)
            }
            GateState::Idle | GateState::Transmitting => None,
        }
    }

    /// Transmitting → Connected.
    pub fn release_talk(&mut self) -> Option<GateCue> {
        match self.state {
            GateState::Transmitting => {
                self.state = GateState::Connected;
                Some(GateCue::StaticBurst)
            }
            GateState::Idle | GateState::Connected => None,
        }
    }

    /// Per-frame gating: forward iff Transmitting.
    pub fn should_forward(&self) -> bool {
        self.state == GateState::Transmitting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarding_only_while_transmitting() {
        let mut gate = TransmissionGate::new();
        assert!(!gate.should_forward());

        gate.link_established();
        assert!(!gate.should_forward());

        gate.press_talk();
        assert!(gate.should_forward());

        gate.release_talk();
        assert!(!gate.should_forward());
    }

    #[test]
    fn test_press_while_idle_is_noop() {
        let mut gate = TransmissionGate::new();
        assert_eq!(gate.press_talk(), None);
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!gate.should_forward());
    }

    #[test]
    fn test_transition_cues() {
        let mut gate = TransmissionGate::new();
        assert_eq!(gate.link_established(), Some(GateCue::Chirp));
        assert_eq!(gate.link_established(), None);
        assert_eq!(gate.press_talk(), Some(GateCue::Chirp));
        assert_eq!(gate.press_talk(), None);
        assert_eq!(gate.release_talk(), Some(GateCue::StaticBurst));
        assert_eq!(gate.release_talk(), None);
        assert_eq!(gate.disconnect(), Some(GateCue::Release));
        assert_eq!(gate.disconnect(), None);
    }

    #[test]
    fn test_disconnect_from_transmitting() {
        let mut gate = TransmissionGate::new();
        gate.link_established();
        gate.press_talk();
        assert_eq!(gate.disconnect(), Some(GateCue::Release));
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!gate.should_forward());
    }
}
