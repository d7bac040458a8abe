//! Test doubles for the device and transport seams.
//!
//! Every fake keeps its state behind `Arc<Mutex<_>>` so a test can hold one
//! clone while the controller owns a boxed other.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::audio::codec::{AudioBuffer, EncodedChunk};
use crate::audio::scheduler::SegmentId;
use crate::device::{AudioHost, CaptureStream, OutputDevice};
use crate::error::{RadioError, RadioResult};
use crate::radio::events::EventSender;
use crate::transport::{SessionConfig, SessionHandle, Transport, TransportEvents};

#[derive(Debug, Default)]
struct ManualState {
    now: f64,
    sample_rate: u32,
    gain: f32,
    fail_next: bool,
    scheduled: Vec<(SegmentId, f64)>,
    stopped: Vec<SegmentId>,
    cues: Vec<usize>,
}

/// Output whose clock only moves when the test says so.
#[derive(Debug, Clone)]
pub struct ManualOutput {
    state: Arc<Mutex<ManualState>>,
}

impl ManualOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                sample_rate,
                gain: 1.0,
                ..Default::default()
            })),
        }
    }

    pub fn advance_to(&self, time: f64) {
        self.state.lock().unwrap().now = time;
    }

    pub fn fail_next_schedule(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    pub fn scheduled_starts(&self) -> Vec<f64> {
        self.state.lock().unwrap().scheduled.iter().map(|(_, start)| *start).collect()
    }

    pub fn scheduled_ids(&self) -> Vec<SegmentId> {
        self.state.lock().unwrap().scheduled.iter().map(|(id, _)| *id).collect()
    }

    pub fn stopped(&self) -> Vec<SegmentId> {
        self.state.lock().unwrap().stopped.clone()
    }

    /// Number of `play_now` cues so far.
    pub fn cue_count(&self) -> usize {
        self.state.lock().unwrap().cues.len()
    }

    /// Sample counts of the `play_now` cues, oldest first.
    pub fn cue_lengths(&self) -> Vec<usize> {
        self.state.lock().unwrap().cues.clone()
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().unwrap().gain
    }
}

impl OutputDevice for ManualOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn schedule(&mut self, id: SegmentId, _buffer: &AudioBuffer, start_time: f64) -> RadioResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next {
            state.fail_next = false;
            return Err(RadioError::Device("schedule rejected".to_string()));
        }
        state.scheduled.push((id, start_time));
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn play_now(&mut self, samples: Vec<f32>) {
        self.state.lock().unwrap().cues.push(samples.len());
    }

    fn set_gain(&mut self, gain: f32) {
        self.state.lock().unwrap().gain = gain;
    }

    fn sample_rate(&self) -> u32 {
        self.state.lock().unwrap().sample_rate
    }
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub opened: usize,
    pub started: usize,
    pub stopped: usize,
}

struct FakeCapture {
    log: Arc<Mutex<CaptureLog>>,
    released: bool,
}

impl CaptureStream for FakeCapture {
    fn start(&mut self) -> RadioResult<()> {
        self.log.lock().unwrap().started += 1;
        Ok(())
    }

    /// Counted once per stream, started or not.
    fn stop(&mut self) {
        if !self.released {
            self.released = true;
            self.log.lock().unwrap().stopped += 1;
        }
    }
}

/// Host handing out a shared `ManualOutput` and logged capture streams.
#[derive(Clone)]
pub struct FakeHost {
    pub output: ManualOutput,
    pub capture: Arc<Mutex<CaptureLog>>,
    pub deny_microphone: bool,
    pub outputs_opened: Arc<Mutex<usize>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            output: ManualOutput::new(24000),
            capture: Arc::new(Mutex::new(CaptureLog::default())),
            deny_microphone: false,
            outputs_opened: Arc::new(Mutex::new(0)),
        }
    }

    pub fn outputs_opened(&self) -> usize {
        *self.outputs_opened.lock().unwrap()
    }
}

impl AudioHost for FakeHost {
    fn open_input(
        &self,
        _sample_rate: u32,
        _frame_size: usize,
        _events: EventSender,
    ) -> RadioResult<Box<dyn CaptureStream>> {
        if self.deny_microphone {
            return Err(RadioError::MicrophoneAccess("permission denied".to_string()));
        }
        self.capture.lock().unwrap().opened += 1;
        Ok(Box::new(FakeCapture {
            log: self.capture.clone(),
            released: false,
        }))
    }

    fn open_output(
        &self,
        _sample_rate: u32,
        _channels: u16,
        _events: EventSender,
    ) -> RadioResult<Box<dyn OutputDevice>> {
        *self.outputs_opened.lock().unwrap() += 1;
        Ok(Box::new(self.output.clone()))
    }
}

/// Session that records what was sent through it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub sent: Arc<Mutex<Vec<EncodedChunk>>>,
    pub closes: Arc<Mutex<usize>>,
}

impl RecordingSession {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

impl SessionHandle for RecordingSession {
    fn send_realtime_input(&mut self, chunk: &EncodedChunk) -> RadioResult<()> {
        self.sent.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    fn close(&mut self) {
        *self.closes.lock().unwrap() += 1;
    }
}

#[derive(Default)]
struct TransportLog {
    connects: Vec<SessionConfig>,
    generations: Vec<u64>,
    sessions: Vec<RecordingSession>,
    fail_next: bool,
}

/// Transport that never touches the network.
#[derive(Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connect(&self) {
        self.log.lock().unwrap().fail_next = true;
    }

    pub fn connect_count(&self) -> usize {
        self.log.lock().unwrap().connects.len()
    }

    pub fn last_config(&self) -> Option<SessionConfig> {
        self.log.lock().unwrap().connects.last().cloned()
    }

    /// Generation handed to the most recent connect.
    pub fn last_generation(&self) -> u64 {
        self.log.lock().unwrap().generations.last().copied().unwrap_or_default()
    }

    pub fn session(&self, index: usize) -> RecordingSession {
        self.log.lock().unwrap().sessions[index].clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        config: SessionConfig,
        events: TransportEvents,
    ) -> RadioResult<Box<dyn SessionHandle>> {
        let mut log = self.log.lock().unwrap();
        log.connects.push(config);
        log.generations.push(events.generation());
        if log.fail_next {
            log.fail_next = false;
            return Err(RadioError::Transport("handshake refused".to_string()));
        }
        let session = RecordingSession::default();
        log.sessions.push(session.clone());
        Ok(Box::new(session))
    }
}
