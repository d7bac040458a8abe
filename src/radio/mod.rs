//! # Radio Control
//!
//! Push-to-talk gating, speaker attribution, status reporting, and the
//! session controller that ties the audio path to the transport.
//!
//! ## Event Flow:
//! ```text
//!   console / capture / output / transport / timers
//!                       │
//!                       ▼
//!              ControllerEvent queue (single consumer)
//!                       │
//!                       ▼
//!   SessionController ──▶ gate, scheduler, pipeline, devices, session
//!                       │
//!                       ▼
//!              watch::Receiver<RadioStatus>
//! ```

pub mod controller;  // Connect/disconnect and event dispatch
pub mod events;      // Controller queue
pub mod gate;        // Push-to-talk state machine
pub mod speaker;     // Keyword table for the active speaker
pub mod status;      // Front-panel snapshot and transcript log
