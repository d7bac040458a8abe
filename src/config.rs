//! # Configuration Management
//!
//! This module handles loading and managing the radio client's configuration
//! from multiple sources:
//! - TOML configuration files (radio.toml)
//! - Environment variables (with RADIO_ prefix)
//! - The service credential (GEMINI_API_KEY or API_KEY), supplied out-of-band
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Credential variables (GEMINI_API_KEY, then API_KEY)
//! 2. Environment variables (RADIO_AUDIO__VOLUME, RADIO_TRANSPORT__ENDPOINT, etc.)
//! 3. Configuration file (radio.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::radio::speaker::{SpeakerRule, SpeakerTable};

/// Main configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (audio, transport, effects,
/// channels, speakers) keeps each component's knobs next to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub transport: TransportConfig,
    pub effects: EffectsConfig,
    pub channels: Vec<ChannelConfig>,
    pub speakers: SpeakerTable,
}

/// Capture and playback format settings.
///
/// ## Fields:
/// - `input_sample_rate`: microphone capture rate (16 kHz for the speech service)
/// - `output_sample_rate`: rate of synthesized response audio (24 kHz)
/// - `output_channels`: channel count of response audio (mono today)
/// - `frame_size`: samples per captured frame handed to the gate
/// - `volume`: output volume in percent (0-100)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    pub frame_size: usize,
    pub volume: u8,
}

/// Settings for the live speech service link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// WebSocket endpoint (must be wss:// unless `allow_insecure` is set)
    pub endpoint: String,
    /// Model identifier sent in the setup message
    pub model: String,
    /// Prebuilt voice used for responses
    pub voice: String,
    /// Persona prompt; the selected channel is appended when connecting
    pub system_instruction: String,
    /// Service credential, normally injected from the environment
    #[serde(default)]
    pub api_key: String,
    /// Permit plain ws:// endpoints (local testing only)
    #[serde(default)]
    pub allow_insecure: bool,
}

/// Procedural sound effect parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsConfig {
    /// Burst played when the talk control is released
    pub release_burst_secs: f32,
    pub release_burst_amplitude: f32,
    /// Shorter, quieter burst played when response playback goes idle
    pub idle_burst_secs: f32,
    pub idle_burst_amplitude: f32,
    pub chirp_start_hz: f32,
    pub chirp_end_hz: f32,
    pub chirp_secs: f32,
    pub chirp_gain_start: f32,
    pub chirp_gain_end: f32,
}

/// One selectable radio channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Display frequency in MHz
    pub frequency: String,
    pub description: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                input_sample_rate: 16000,   // Speech service input rate
                output_sample_rate: 24000,  // Speech service output rate
                output_channels: 1,
                frame_size: 4096,
                volume: 70,
            },
            transport: TransportConfig {
                endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
                model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
                voice: "Charon".to_string(),
                system_instruction: "You are a tactical squad member. User is Alpha 1. \
                    You are Dispatch and Unit 7. Be gritty and professional. \
                    Prefix names. Short transmissions only."
                    .to_string(),
                api_key: String::new(),
                allow_insecure: false,
            },
            effects: EffectsConfig {
                release_burst_secs: 0.15,
                release_burst_amplitude: 0.05,
                idle_burst_secs: 0.1,
                idle_burst_amplitude: 0.02,
                chirp_start_hz: 880.0,
                chirp_end_hz: 1760.0,
                chirp_secs: 0.05,
                chirp_gain_start: 0.1,
                chirp_gain_end: 0.01,
            },
            channels: vec![
                ChannelConfig {
                    name: "CH 01".to_string(),
                    frequency: "462.5625".to_string(),
                    description: "Base Dispatch".to_string(),
                },
                ChannelConfig {
                    name: "CH 02".to_string(),
                    frequency: "462.6125".to_string(),
                    description: "Search & Rescue".to_string(),
                },
                ChannelConfig {
                    name: "CH 03".to_string(),
                    frequency: "462.6625".to_string(),
                    description: "Field Tactical".to_string(),
                },
            ],
            speakers: SpeakerTable::new(
                vec![
                    SpeakerRule::new("dispatch", "DISPATCH"),
                    SpeakerRule::new("unit 7", "UNIT 7"),
                ],
                "RX UNIT",
            ),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Overrides:
    /// - `RADIO_AUDIO__VOLUME=40`: Override output volume
    /// - `RADIO_TRANSPORT__ENDPOINT=wss://...`: Point at another service
    /// - `GEMINI_API_KEY=...`: Service credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. radio.toml (optional)
            .add_source(config::File::with_name("radio").required(false))
            // 3. RADIO_ prefixed environment, nested keys split on "__"
            .add_source(
                config::Environment::with_prefix("RADIO")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // The credential is conventionally provided without the prefix
        if let Some(key) = credential_from_env() {
            settings = settings.set_override("transport.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be greater than 0"));
        }

        if self.audio.output_channels == 0 {
            return Err(anyhow::anyhow!("Output channel count must be greater than 0"));
        }

        if self.audio.frame_size == 0 {
            return Err(anyhow::anyhow!("Frame size must be greater than 0"));
        }

        if self.audio.volume > 100 {
            return Err(anyhow::anyhow!("Volume must be between 0 and 100"));
        }

        if self.transport.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Transport endpoint cannot be empty"));
        }

        if self.channels.is_empty() {
            return Err(anyhow::anyhow!("At least one channel must be configured"));
        }

        Ok(())
    }
}

fn credential_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.input_sample_rate, 16000);
        assert_eq!(config.audio.output_sample_rate, 24000);
        assert_eq!(config.audio.frame_size, 4096);
        assert!(config.transport.endpoint.starts_with("wss://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.audio.frame_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.volume = 120;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.channels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_survive_config_roundtrip() {
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .build()
            .unwrap();
        let config: AppConfig = built.try_deserialize().unwrap();
        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.speakers.default_label(), "RX UNIT");
    }
}
