//! Sound-card backend using cpal.
//!
//! `cpal::Stream` is not `Send`, so each stream lives on its own thread that
//! builds it, reports readiness, and then waits for commands. Dropping the
//! thread's stream releases the device.
//!
//! The microphone stream is built paused when the input is opened and only
//! played on `start`, so device and permission failures surface at open.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::mixer::Mixer;
use super::resample::{needs_resampling, StreamResampler};
use super::{AudioHost, CaptureStream, OutputDevice};
use crate::audio::capture::FrameAccumulator;
use crate::audio::codec::AudioBuffer;
use crate::audio::scheduler::SegmentId;
use crate::error::{RadioError, RadioResult};
use crate::radio::events::{ControllerEvent, EventSender};

const READY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Default)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHost for CpalHost {
    /// Build the microphone stream now, paused, so a missing or refused
    /// device fails the connect before any network work starts.
    fn open_input(
        &self,
        sample_rate: u32,
        frame_size: usize,
        events: EventSender,
    ) -> RadioResult<Box<dyn CaptureStream>> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, String>>();
        let (command_tx, command_rx) = mpsc::channel::<CaptureCommand>();

        let thread = std::thread::spawn(move || {
            let (stream, device_name) = match build_input(sample_rate, frame_size, events) {
                Ok(built) => built,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(device_name));

            while let Ok(command) = command_rx.recv() {
                match command {
                    CaptureCommand::Play(reply) => {
                        let result = stream
                            .play()
                            .map_err(|e| format!("failed to start input stream: {}", e));
                        let _ = reply.send(result);
                    }
                    CaptureCommand::Stop => break,
                }
            }
            drop(stream);
            debug!("Capture thread exiting");
        });

        let device_name = wait_ready(ready_rx).map_err(RadioError::MicrophoneAccess)?;
        info!(device = %device_name, sample_rate, frame_size, "Opened microphone");

        Ok(Box::new(CpalCapture {
            commands: command_tx,
            thread: Some(thread),
            playing: false,
        }))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        _channels: u16,
        events: EventSender,
    ) -> RadioResult<Box<dyn OutputDevice>> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Mutex<Mixer>>, String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            let stream = match build_output(sample_rate, events) {
                Ok((stream, mixer)) => {
                    let _ = ready_tx.send(Ok(mixer));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Output thread exiting");
        });

        let mixer = wait_ready(ready_rx).map_err(RadioError::Device)?;
        let (device_rate, channels) = mixer
            .lock()
            .map(|m| (m.device_rate(), m.channels()))
            .map_err(|_| RadioError::Device("mixer poisoned".to_string()))?;
        info!(timeline_rate = sample_rate, device_rate, channels, "Opened speaker output");

        Ok(Box::new(CpalOutput {
            mixer,
            timeline_rate: sample_rate,
            _thread: StreamThread { stop_tx, thread: Some(thread) },
        }))
    }
}

fn wait_ready<T>(ready_rx: mpsc::Receiver<Result<T, String>>) -> Result<T, String> {
    match ready_rx.recv_timeout(READY_TIMEOUT) {
        Ok(result) => result,
        Err(_) => Err("audio thread did not start".to_string()),
    }
}

/// Owner of the output stream thread. Stopping joins it so the device is free afterwards.
struct StreamThread {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        join(self.thread.take());
    }
}

fn join(thread: Option<JoinHandle<()>>) {
    if let Some(thread) = thread {
        if thread.join().is_err() {
            warn!("Audio thread panicked");
        }
    }
}

enum CaptureCommand {
    Play(mpsc::Sender<Result<(), String>>),
    Stop,
}

/// Microphone stream parked on its own thread until `start`.
pub struct CpalCapture {
    commands: mpsc::Sender<CaptureCommand>,
    thread: Option<JoinHandle<()>>,
    playing: bool,
}

impl CaptureStream for CpalCapture {
    fn start(&mut self) -> RadioResult<()> {
        if self.playing {
            return Ok(());
        }
        if self.thread.is_none() {
            return Err(RadioError::MicrophoneAccess("microphone already released".to_string()));
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(CaptureCommand::Play(reply_tx))
            .map_err(|_| RadioError::MicrophoneAccess("capture thread gone".to_string()))?;
        wait_ready(reply_rx).map_err(RadioError::MicrophoneAccess)?;

        self.playing = true;
        info!("Microphone capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        let _ = self.commands.send(CaptureCommand::Stop);
        join(self.thread.take());
        self.playing = false;
        info!("Microphone released");
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input(
    target_rate: u32,
    frame_size: usize,
    events: EventSender,
) -> Result<(cpal::Stream, String), String> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| "no input device available".to_string())?;
    let device_name = device.name().unwrap_or_default();
    let supported = device
        .default_input_config()
        .map_err(|e| format!("no usable input config: {}", e))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        device_rate = config.sample_rate.0,
        channels = config.channels,
        ?format,
        "Building input stream"
    );

    let stream = match format {
        SampleFormat::F32 => input_stream::<f32>(&device, &config, target_rate, frame_size, events),
        SampleFormat::I16 => input_stream::<i16>(&device, &config, target_rate, frame_size, events),
        SampleFormat::U16 => input_stream::<u16>(&device, &config, target_rate, frame_size, events),
        SampleFormat::I32 => input_stream::<i32>(&device, &config, target_rate, frame_size, events),
        other => Err(format!("unsupported input sample format: {:?}", other)),
    }?;
    Ok((stream, device_name))
}

/// Build the input stream without starting it.
fn input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    target_rate: u32,
    frame_size: usize,
    events: EventSender,
) -> Result<cpal::Stream, String>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut resampler = if needs_resampling(config.sample_rate.0, target_rate) {
        Some(StreamResampler::capture(config.sample_rate.0, target_rate).map_err(|e| e.to_string())?)
    } else {
        None
    };
    let mut accumulator = FrameAccumulator::new(frame_size);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Downmix to mono
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / channels as f32)
                    .collect();
                let samples = match resampler.as_mut() {
                    Some(resampler) => match resampler.process(&mono) {
                        Ok(samples) => samples,
                        Err(err) => {
                            error!("Capture resampling failed: {}", err);
                            return;
                        }
                    },
                    None => mono,
                };
                for frame in accumulator.push(&samples) {
                    if events.send(ControllerEvent::CaptureFrame(frame)).is_err() {
                        // Controller gone
                        return;
                    }
                }
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| format!("failed to build input stream: {}", e))?;

    // Some hosts start streams on build
    if let Err(e) = stream.pause() {
        debug!("Input stream could not be paused: {}", e);
    }
    Ok(stream)
}

fn build_output(
    timeline_rate: u32,
    events: EventSender,
) -> Result<(cpal::Stream, Arc<Mutex<Mixer>>), String> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| "no output device available".to_string())?;
    let supported = device
        .default_output_config()
        .map_err(|e| format!("no usable output config: {}", e))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let mixer = Mixer::new(timeline_rate, config.sample_rate.0, config.channels).map_err(|e| e.to_string())?;
    let mixer = Arc::new(Mutex::new(mixer));

    debug!(
        device_rate = config.sample_rate.0,
        channels = config.channels,
        ?format,
        "Building output stream"
    );

    let stream = match format {
        SampleFormat::F32 => output_stream::<f32>(&device, &config, mixer.clone(), events),
        SampleFormat::I16 => output_stream::<i16>(&device, &config, mixer.clone(), events),
        SampleFormat::U16 => output_stream::<u16>(&device, &config, mixer.clone(), events),
        other => Err(format!("unsupported output sample format: {:?}", other)),
    }?;
    Ok((stream, mixer))
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    events: EventSender,
) -> Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let finished = match mixer.lock() {
                    Ok(mut mixer) => mixer.render(&mut scratch),
                    Err(_) => {
                        scratch.iter_mut().for_each(|s| *s = 0.0);
                        Vec::new()
                    }
                };
                for (slot, &value) in data.iter_mut().zip(scratch.iter()) {
                    *slot = T::from_sample(value);
                }
                for id in finished {
                    let _ = events.send(ControllerEvent::SegmentEnded(id));
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| format!("failed to build output stream: {}", e))?;

    stream.play().map_err(|e| format!("failed to start output stream: {}", e))?;
    Ok(stream)
}

pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    timeline_rate: u32,
    // Stops and joins the output thread on drop
    _thread: StreamThread,
}

impl CpalOutput {
    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> RadioResult<R> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| RadioError::Device("mixer poisoned".to_string()))?;
        Ok(f(&mut mixer))
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.with_mixer(|m| m.current_time()).unwrap_or_default()
    }

    fn schedule(&mut self, id: SegmentId, buffer: &AudioBuffer, start_time: f64) -> RadioResult<()> {
        self.with_mixer(|m| m.schedule(id, buffer, start_time))?
    }

    fn stop(&mut self, id: SegmentId) {
        let _ = self.with_mixer(|m| m.stop(id));
    }

    fn play_now(&mut self, samples: Vec<f32>) {
        let _ = self.with_mixer(|m| m.play_now(samples));
    }

    fn set_gain(&mut self, gain: f32) {
        let _ = self.with_mixer(|m| m.set_gain(gain));
    }

    fn sample_rate(&self) -> u32 {
        self.timeline_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked_capture() -> (CpalCapture, mpsc::Receiver<CaptureCommand>) {
        let (commands, command_rx) = mpsc::channel();
        let thread = std::thread::spawn(|| {});
        let capture = CpalCapture {
            commands,
            thread: Some(thread),
            playing: false,
        };
        (capture, command_rx)
    }

    #[test]
    fn test_start_plays_the_prebuilt_stream() {
        let (mut capture, command_rx) = parked_capture();
        let stream_thread = std::thread::spawn(move || match command_rx.recv() {
            Ok(CaptureCommand::Play(reply)) => {
                let _ = reply.send(Ok(()));
            }
            _ => panic!("expected play"),
        });

        capture.start().unwrap();
        // Already playing: no second command
        capture.start().unwrap();
        stream_thread.join().unwrap();
    }

    #[test]
    fn test_play_failure_is_a_microphone_error() {
        let (mut capture, command_rx) = parked_capture();
        let stream_thread = std::thread::spawn(move || {
            if let Ok(CaptureCommand::Play(reply)) = command_rx.recv() {
                let _ = reply.send(Err("device busy".to_string()));
            }
        });

        assert!(matches!(capture.start(), Err(RadioError::MicrophoneAccess(_))));
        stream_thread.join().unwrap();
    }

    #[test]
    fn test_start_after_release_fails() {
        let (mut capture, _command_rx) = parked_capture();
        capture.stop();
        capture.stop();
        assert!(matches!(capture.start(), Err(RadioError::MicrophoneAccess(_))));
    }
}
