//! # Error Handling
//!
//! This module defines the error type shared by every part of the radio client
//! and how each error is reduced to the short status code shown on the radio's
//! display.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **Purpose**: Forces callers to handle both success and failure cases
//! - **No exceptions**: A failed connect attempt is a value, not a throw
//!
//! ### Enums for Error Types
//! - **Variants**: Each variant is one failure family from the error taxonomy
//! - **Data**: Variants carry a message describing the underlying cause
//! - **Pattern matching**: `status_code()` uses `match` to pick the display code
//!
//! ### Traits for Error Conversion
//! - **From trait**: Lets `?` turn base64/JSON/config/WebSocket errors into `RadioError`
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Why status codes:
//! Errors never cross the UI boundary as structured values. The controller
//! logs the full error and shows only the short code (e.g. `ERR: MIC`).

use std::fmt;  // For implementing Display trait

/// Custom error types for the radio client.
///
/// ## Error Categories:
/// - **InsecureContext**: Endpoint is not TLS and insecure links were not allowed (fatal to connect)
/// - **MicrophoneAccess**: Capture device denied or unavailable (fatal to connect, retryable)
/// - **Transport**: Session failed to open or broke (triggers full disconnect)
/// - **Decode**: One response chunk was malformed (chunk dropped, session kept)
/// - **Device**: Output device could not be opened or driven
/// - **Config**: Configuration file or environment variable problems
///
/// ## Usage Example:
/// ```rust
/// use tactical_radio::error::RadioError;
/// let err = RadioError::Decode("odd byte count".to_string());
/// assert_eq!(err.status_code(), "ERR: RX");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RadioError {
    /// The link would travel over an unencrypted channel
    InsecureContext,

    /// Microphone permission denied, missing device, or hardware failure
    MicrophoneAccess(String),

    /// Transport connect failure, socket error, or protocol violation
    Transport(String),

    /// Malformed encoded audio (bad base64, odd byte count, bad channel layout)
    Decode(String),

    /// Output device failure
    Device(String),

    /// Configuration failed to load or validate
    Config(String),
}

impl RadioError {
    /// Short human-readable status code for the radio display.
    ///
    /// ## Mapping:
    /// - InsecureContext → `ERR: INSECURE`
    /// - MicrophoneAccess → `ERR: MIC`
    /// - Transport → `ERR: LINK`
    /// - Decode → `ERR: RX`
    /// - Device → `ERR: AUDIO`
    /// - Config → `ERR: CFG`
    pub fn status_code(&self) -> &'static str {
        match self {
            RadioError::InsecureContext => "ERR: INSECURE",
            RadioError::MicrophoneAccess(_) => "ERR: MIC",
            RadioError::Transport(_) => "ERR: LINK",
            RadioError::Decode(_) => "ERR: RX",
            RadioError::Device(_) => "ERR: AUDIO",
            RadioError::Config(_) => "ERR: CFG",
        }
    }

    /// Whether this error should tear down the active session.
    ///
    /// Decode failures only cost the offending chunk.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, RadioError::Decode(_))
    }
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::InsecureContext => write!(f, "Insecure context: endpoint is not using TLS"),
            RadioError::MicrophoneAccess(msg) => write!(f, "Microphone access error: {}", msg),
            RadioError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RadioError::Decode(msg) => write!(f, "Decode error: {}", msg),
            RadioError::Device(msg) => write!(f, "Audio device error: {}", msg),
            RadioError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

/// Malformed base64 text in an inbound audio chunk.
impl From<base64::DecodeError> for RadioError {
    fn from(err: base64::DecodeError) -> Self {
        RadioError::Decode(format!("invalid base64 audio: {}", err))
    }
}

/// JSON errors only come from the transport wire format.
impl From<serde_json::Error> for RadioError {
    fn from(err: serde_json::Error) -> Self {
        RadioError::Transport(format!("JSON error: {}", err))
    }
}

/// Automatic conversion from WebSocket errors.
impl From<tokio_tungstenite::tungstenite::Error> for RadioError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RadioError::Transport(format!("WebSocket error: {}", err))
    }
}

/// Automatic conversion from configuration errors.
///
/// ## When this happens:
/// - radio.toml has invalid syntax
/// - An environment override cannot be parsed into the expected type
impl From<config::ConfigError> for RadioError {
    fn from(err: config::ConfigError) -> Self {
        RadioError::Config(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type RadioResult<T> = Result<T, RadioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let errors = [
            RadioError::InsecureContext,
            RadioError::MicrophoneAccess("denied".into()),
            RadioError::Transport("closed".into()),
            RadioError::Decode("bad".into()),
            RadioError::Device("gone".into()),
            RadioError::Config("missing".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.status_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_decode_errors_are_not_fatal() {
        assert!(!RadioError::Decode("x".into()).is_session_fatal());
        assert!(RadioError::Transport("x".into()).is_session_fatal());
        assert!(RadioError::InsecureContext.is_session_fatal());
    }

    #[test]
    fn test_base64_error_conversion() {
        use base64::Engine;
        let err: RadioError = base64::engine::general_purpose::STANDARD
            .decode("not base64!!")
            .unwrap_err()
            .into();
        assert!(matches!(err, RadioError::Decode(_)));
    }
}
