//! # Session Lifecycle Controller
//!
//! Owns every piece of mutable radio state and is the only consumer of the
//! event queue, so nothing here needs a lock.
//!
//! ## Connect Sequence:
//! 1. **PERM CHECK**: verify the endpoint is a secure context
//! 2. Open the microphone (fails with `ERR: MIC`)
//! 3. **NET SYNC**: open the output context and the transport session
//! 4. **LINK EST**: on the transport's `Opened`, open the gate, chirp, start capture
//!
//! ## Disconnect:
//! Close the session, stop the microphone, cut all scheduled playback, reset
//! the gate. Idempotent; transport errors and closes run the same path.
//!
//! ## Stale Events:
//! Every connect bumps a generation counter that tags the transport's events.
//! Callbacks from an older session (or arriving while offline) are dropped, and
//! so is any audio that would be enqueued after teardown.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::audio::capture::{AudioFrame, CapturePipeline};
use crate::audio::codec::decode_payload;
use crate::audio::effects::{radio_chirp, static_burst};
use crate::audio::scheduler::{PlaybackScheduler, PlaybackTransition, SegmentId};
use crate::config::{AppConfig, ChannelConfig};
use crate::device::{AudioHost, CaptureStream, OutputDevice};
use crate::error::{RadioError, RadioResult};
use crate::radio::events::{ControllerEvent, EventReceiver, EventSender};
use crate::radio::gate::{GateCue, GateState, TransmissionGate};
use crate::radio::status::{
    RadioStatus, TranscriptLog, STATUS_LINK_EST, STATUS_NET_SYNC, STATUS_OFFLINE, STATUS_PERM_CHECK,
};
use crate::transport::{ServerPayload, SessionConfig, SessionHandle, Transport, TransportEvent, TransportEvents};

/// Where the link is, independent of push-to-talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    Offline,
    /// Microphone held, waiting for the transport's `Opened`
    Connecting,
    Open,
}

pub struct SessionController {
    config: AppConfig,
    host: Box<dyn AudioHost>,
    transport: Arc<dyn Transport>,
    events: EventSender,

    gate: TransmissionGate,
    scheduler: PlaybackScheduler,
    pipeline: CapturePipeline,
    phase: LinkPhase,
    generation: u64,

    session: Option<Box<dyn SessionHandle>>,
    capture: Option<Box<dyn CaptureStream>>,
    // Kept across sessions so teardown cues stay audible
    output: Option<Box<dyn OutputDevice>>,

    channel_index: usize,
    status: RadioStatus,
    status_tx: watch::Sender<RadioStatus>,
    squelch_token: u64,
    transcript: TranscriptLog,
    rng: StdRng,
}

impl SessionController {
    pub fn new(
        config: AppConfig,
        host: Box<dyn AudioHost>,
        transport: Arc<dyn Transport>,
        events: EventSender,
    ) -> Self {
        let volume = config.audio.volume.min(100);
        let channel = config.channels.first().cloned().unwrap_or_else(|| ChannelConfig {
            name: "CH 01".to_string(),
            frequency: String::new(),
            description: String::new(),
        });
        let status = RadioStatus::new(channel, volume);
        let (status_tx, _) = watch::channel(status.clone());
        let pipeline = CapturePipeline::new(config.audio.input_sample_rate);

        Self {
            config,
            host,
            transport,
            events,
            gate: TransmissionGate::new(),
            scheduler: PlaybackScheduler::new(),
            pipeline,
            phase: LinkPhase::Offline,
            generation: 0,
            session: None,
            capture: None,
            output: None,
            channel_index: 0,
            status,
            status_tx,
            squelch_token: 0,
            transcript: TranscriptLog::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the noise source (deterministic cues in tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Watch channel that receives every status change.
    pub fn subscribe(&self) -> watch::Receiver<RadioStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> &RadioStatus {
        &self.status
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn active_segments(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Consume events until `Shutdown`.
    pub async fn run(mut self, mut events: EventReceiver) {
        info!(channel = %self.status.channel.name, "Radio controller started");
        while let Some(event) = events.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        self.disconnect();
        info!("Radio controller stopped");
    }

    /// Apply one event. Returns false when the loop should stop.
    pub async fn handle(&mut self, event: ControllerEvent) -> bool {
        let keep_running = match event {
            ControllerEvent::Connect => {
                self.connect().await;
                true
            }
            ControllerEvent::Disconnect => {
                self.disconnect();
                true
            }
            ControllerEvent::TalkPressed => {
                self.talk_pressed();
                true
            }
            ControllerEvent::TalkReleased => {
                self.talk_released();
                true
            }
            ControllerEvent::SelectChannel(index) => {
                self.select_channel(index);
                true
            }
            ControllerEvent::NextChannel => {
                let count = self.config.channels.len().max(1);
                self.select_channel((self.channel_index + 1) % count);
                true
            }
            ControllerEvent::SetVolume(percent) => {
                self.set_volume(percent);
                true
            }
            ControllerEvent::CaptureFrame(frame) => {
                self.capture_frame(frame);
                true
            }
            ControllerEvent::SegmentEnded(id) => {
                self.segment_ended(id);
                true
            }
            ControllerEvent::Transport { generation, event } => {
                self.transport_event(generation, event);
                true
            }
            ControllerEvent::SquelchElapsed { token } => {
                if token == self.squelch_token {
                    self.status.squelching = false;
                }
                true
            }
            ControllerEvent::Shutdown => {
                info!("Shutdown requested");
                self.disconnect();
                false
            }
        };

        self.publish();
        keep_running
    }

    async fn connect(&mut self) {
        if self.phase != LinkPhase::Offline {
            debug!("Connect ignored, link already {:?}", self.phase);
            return;
        }

        self.status.connecting = true;
        self.set_status_text(STATUS_PERM_CHECK);

        if let Err(err) = self.check_secure_context() {
            self.fail_connect(err);
            return;
        }

        let capture = match self.host.open_input(
            self.config.audio.input_sample_rate,
            self.config.audio.frame_size,
            self.events.clone(),
        ) {
            Ok(capture) => capture,
            Err(err) => {
                self.fail_connect(err);
                return;
            }
        };
        self.capture = Some(capture);

        self.set_status_text(STATUS_NET_SYNC);
        if let Err(err) = self.ensure_output() {
            self.release_capture();
            self.fail_connect(err);
            return;
        }

        self.generation += 1;
        self.phase = LinkPhase::Connecting;
        let session_id = Uuid::new_v4();
        self.status.session_id = Some(session_id);

        let channel = self.status.channel.clone();
        info!(
            session_id = %session_id,
            channel = %channel.name,
            frequency = %channel.frequency,
            "Connecting"
        );

        let session_config = SessionConfig {
            transport: self.config.transport.clone(),
            channel,
            input_sample_rate: self.config.audio.input_sample_rate,
        };
        let events = TransportEvents::new(self.generation, self.events.clone());

        match self.transport.connect(session_config, events).await {
            Ok(session) => {
                self.session = Some(session);
                debug!(session_id = %session_id, "Transport session created, waiting for open");
            }
            Err(err) => {
                let err = match err {
                    RadioError::Transport(_) => err,
                    other => RadioError::Transport(other.to_string()),
                };
                self.release_capture();
                self.phase = LinkPhase::Offline;
                self.status.session_id = None;
                self.fail_connect(err);
            }
        }
    }

    fn check_secure_context(&self) -> RadioResult<()> {
        let endpoint = self.config.transport.endpoint.trim().to_ascii_lowercase();
        if endpoint.starts_with("wss://") || self.config.transport.allow_insecure {
            Ok(())
        } else {
            Err(RadioError::InsecureContext)
        }
    }

    fn ensure_output(&mut self) -> RadioResult<()> {
        if self.output.is_some() {
            return Ok(());
        }
        let mut output = self.host.open_output(
            self.config.audio.output_sample_rate,
            self.config.audio.output_channels,
            self.events.clone(),
        )?;
        output.set_gain(f32::from(self.status.volume) / 100.0);
        self.output = Some(output);
        Ok(())
    }

    fn fail_connect(&mut self, err: RadioError) {
        warn!(status = err.status_code(), "Connect failed: {}", err);
        self.status.connecting = false;
        self.set_status_text(err.status_code());
    }

    fn release_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
    }

    /// Full teardown. No-op while offline.
    fn disconnect(&mut self) {
        if self.phase == LinkPhase::Offline {
            trace!("Disconnect ignored, already offline");
            return;
        }

        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.release_capture();

        let cut = match self.output.as_deref_mut() {
            Some(output) => self.scheduler.stop_all(output),
            None => {
                self.scheduler.clear();
                0
            }
        };
        let cue = self.gate.disconnect();

        info!(
            session_id = ?self.status.session_id,
            segments_cut = cut,
            "Link closed"
        );

        self.phase = LinkPhase::Offline;
        self.status.session_id = None;
        self.status.connecting = false;
        self.status.connected = false;
        self.status.transmitting = false;
        self.status.model_talking = false;
        self.status.active_speaker = None;
        self.set_status_text(STATUS_OFFLINE);

        if let Some(cue) = cue {
            self.play_cue(cue);
        }
    }

    /// Disconnect and leave `err`'s code on the display.
    fn fail_session(&mut self, err: RadioError) {
        error!(status = err.status_code(), "Session failed: {}", err);
        self.disconnect();
        self.set_status_text(err.status_code());
    }

    fn talk_pressed(&mut self) {
        match self.gate.press_talk() {
            Some(cue) => {
                debug!("Transmitting");
                self.status.transmitting = true;
                self.play_cue(cue);
            }
            None => debug!(state = %self.gate.state(), "Talk press ignored"),
        }
    }

    fn talk_released(&mut self) {
        if let Some(cue) = self.gate.release_talk() {
            debug!(forwarded = self.pipeline.forwarded(), "Transmission ended");
            self.status.transmitting = false;
            self.play_cue(cue);
        }
    }

    fn select_channel(&mut self, index: usize) {
        let Some(channel) = self.config.channels.get(index).cloned() else {
            warn!(index, "No such channel");
            return;
        };
        if index == self.channel_index {
            return;
        }

        // Channels are not hot-swappable
        self.disconnect();

        info!(channel = %channel.name, frequency = %channel.frequency, "Channel selected");
        self.channel_index = index;
        self.status.channel = channel;
    }

    fn set_volume(&mut self, percent: u8) {
        let volume = percent.min(100);
        self.status.volume = volume;
        if let Some(output) = self.output.as_deref_mut() {
            output.set_gain(f32::from(volume) / 100.0);
        }
    }

    fn capture_frame(&mut self, frame: AudioFrame) {
        if let Err(err) = self
            .pipeline
            .process(&self.gate, self.session.as_deref_mut(), &frame)
        {
            if err.is_session_fatal() {
                self.fail_session(err);
            } else {
                warn!("Dropping captured frame: {}", err);
            }
        }
    }

    fn segment_ended(&mut self, id: SegmentId) {
        if self.scheduler.segment_ended(id) == PlaybackTransition::Idle {
            self.playback_idle();
        }
    }

    fn playback_idle(&mut self) {
        debug!("Response playback finished");
        self.status.model_talking = false;
        self.status.active_speaker = None;
        let (secs, amplitude) = (
            self.config.effects.idle_burst_secs,
            self.config.effects.idle_burst_amplitude,
        );
        self.play_static_burst(secs, amplitude);
    }

    fn transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.phase == LinkPhase::Offline {
            trace!(generation, current = self.generation, ?event, "Dropping stale transport event");
            return;
        }

        match event {
            TransportEvent::Opened => self.link_opened(),
            TransportEvent::Message(payload) => self.server_message(payload),
            TransportEvent::Error(message) => self.fail_session(RadioError::Transport(message)),
            TransportEvent::Closed => {
                info!("Transport closed");
                self.disconnect();
            }
        }
    }

    fn link_opened(&mut self) {
        if self.phase != LinkPhase::Connecting {
            return;
        }
        self.phase = LinkPhase::Open;
        let cue = self.gate.link_established();
        self.status.connecting = false;
        self.status.connected = true;
        self.set_status_text(STATUS_LINK_EST);
        info!(session_id = ?self.status.session_id, "Link established");
        if let Some(cue) = cue {
            self.play_cue(cue);
        }

        let started = match self.capture.as_deref_mut() {
            Some(capture) => capture.start(),
            None => Err(RadioError::MicrophoneAccess("capture released".to_string())),
        };
        if let Err(err) = started {
            let err = match err {
                RadioError::MicrophoneAccess(_) => err,
                other => RadioError::MicrophoneAccess(other.to_string()),
            };
            self.fail_session(err);
        }
    }

    fn server_message(&mut self, payload: ServerPayload) {
        if payload.interrupted {
            self.interrupt_playback();
        }

        if let Some(text) = payload.transcript.as_deref() {
            let speaker = self.config.speakers.attribute(text).to_string();
            debug!(speaker = %speaker, "Transcript: {}", text);
            self.transcript.push(&speaker, text);
            self.status.active_speaker = Some(speaker);
        }

        if let Some(audio) = payload.audio.as_deref() {
            self.enqueue_response_audio(audio);
        }

        if payload.turn_complete {
            debug!(queued = self.scheduler.active_count(), "Model turn complete");
        }
    }

    fn enqueue_response_audio(&mut self, audio: &str) {
        // Audio after teardown is discarded
        if self.phase != LinkPhase::Open {
            return;
        }
        let Some(output) = self.output.as_deref_mut() else {
            return;
        };

        let buffer = match decode_payload(
            audio,
            self.config.audio.output_sample_rate,
            usize::from(self.config.audio.output_channels),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.status.decode_failures += 1;
                warn!(
                    failures = self.status.decode_failures,
                    "Skipping undecodable response chunk: {}", err
                );
                return;
            }
        };

        match self.scheduler.enqueue(output, &buffer) {
            Ok(segment) => {
                trace!(segment = %segment.id, start = segment.start_time, "Response audio queued");
                self.status.model_talking = true;
            }
            Err(err) => warn!("Dropping response chunk: {}", err),
        }
    }

    fn interrupt_playback(&mut self) {
        let cut = match self.output.as_deref_mut() {
            Some(output) => self.scheduler.stop_all(output),
            None => 0,
        };
        if cut > 0 {
            info!(segments = cut, "Model turn interrupted");
            self.playback_idle();
        }
    }

    /// Sound the cue a gate transition asked for.
    fn play_cue(&mut self, cue: GateCue) {
        match cue {
            GateCue::Chirp => self.play_chirp(),
            GateCue::StaticBurst | GateCue::Release => {
                let (secs, amplitude) = (
                    self.config.effects.release_burst_secs,
                    self.config.effects.release_burst_amplitude,
                );
                self.play_static_burst(secs, amplitude);
            }
        }
    }

    fn play_chirp(&mut self) {
        if let Some(output) = self.output.as_deref_mut() {
            let samples = radio_chirp(output.sample_rate(), &self.config.effects);
            output.play_now(samples);
        }
    }

    fn play_static_burst(&mut self, secs: f32, amplitude: f32) {
        let Some(output) = self.output.as_deref_mut() else {
            return;
        };
        let samples = static_burst(&mut self.rng, output.sample_rate(), secs, amplitude);
        output.play_now(samples);

        // Only the newest burst may clear the indicator
        self.squelch_token += 1;
        self.status.squelching = true;
        let token = self.squelch_token;
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f32(secs.max(0.0))).await;
            let _ = events.send(ControllerEvent::SquelchElapsed { token });
        });
    }

    fn set_status_text(&mut self, text: &str) {
        if self.status.status_text != text {
            debug!(status = text, "Status");
            self.status.status_text = text.to_string();
        }
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_if_modified(|current| {
            if *current == self.status {
                false
            } else {
                *current = self.status.clone();
                true
            }
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.release_capture();
    }
}
