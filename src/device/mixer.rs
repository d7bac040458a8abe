//! Response-timeline mixer for hardware backends.
//!
//! Segments and cues are mixed on a timeline that runs at the response audio
//! rate (24 kHz), so a segment scheduled at the previous segment's end time
//! lands on exactly the frame after it. The mixed timeline is then converted
//! to the device rate by one continuous resampler.
//!
//! The clock is the number of timeline frames mixed so far. A segment counts
//! as finished once its last frame has been mixed.

use std::collections::VecDeque;
use tracing::warn;

use super::resample::{needs_resampling, StreamResampler};
use super::OutputDevice;
use crate::audio::codec::AudioBuffer;
use crate::audio::scheduler::SegmentId;
use crate::error::{RadioError, RadioResult};

// Resampler warm-up can yield nothing for a few blocks; give up after this many
const MAX_EMPTY_BLOCKS: usize = 64;

#[derive(Debug)]
struct Voice {
    id: SegmentId,
    samples: Vec<f32>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Debug)]
struct Cue {
    samples: Vec<f32>,
    position: usize,
}

pub struct Mixer {
    timeline_rate: u32,
    device_rate: u32,
    channels: usize,
    block: usize,
    clock: u64,
    gain: f32,
    voices: Vec<Voice>,
    cues: Vec<Cue>,
    resampler: Option<StreamResampler>,
    // Mono device-rate samples waiting for the next render
    ready: VecDeque<f32>,
    finished: Vec<SegmentId>,
}

impl Mixer {
    pub fn new(timeline_rate: u32, device_rate: u32, channels: u16) -> RadioResult<Self> {
        let timeline_rate = timeline_rate.max(1);
        let device_rate = device_rate.max(1);
        let resampler = if needs_resampling(timeline_rate, device_rate) {
            Some(StreamResampler::playback(timeline_rate, device_rate)?)
        } else {
            None
        };

        Ok(Self {
            timeline_rate,
            device_rate,
            channels: usize::from(channels.max(1)),
            block: (timeline_rate as usize / 100).max(1),
            clock: 0,
            gain: 1.0,
            voices: Vec::new(),
            cues: Vec::new(),
            resampler,
            ready: VecDeque::new(),
            finished: Vec::new(),
        })
    }

    pub fn timeline_rate(&self) -> u32 {
        self.timeline_rate
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fill an interleaved device buffer and return segments that finished.
    pub fn render(&mut self, output: &mut [f32]) -> Vec<SegmentId> {
        let frames = output.len() / self.channels;

        let mut empty_blocks = 0;
        while self.ready.len() < frames && empty_blocks < MAX_EMPTY_BLOCKS {
            match self.mix_block() {
                Ok(0) => empty_blocks += 1,
                Ok(_) => empty_blocks = 0,
                Err(err) => {
                    warn!("Playback resampling failed: {}", err);
                    break;
                }
            }
        }

        for frame in output.chunks_mut(self.channels).take(frames) {
            let value = self.ready.pop_front().unwrap_or(0.0);
            frame.iter_mut().for_each(|slot| *slot = value);
        }
        // Leftover partial frame
        output[frames * self.channels..].iter_mut().for_each(|slot| *slot = 0.0);

        std::mem::take(&mut self.finished)
    }

    /// Mix one block of the timeline and queue it at the device rate.
    fn mix_block(&mut self) -> RadioResult<usize> {
        let mut block = vec![0.0f32; self.block];

        for (offset, slot) in block.iter_mut().enumerate() {
            let now = self.clock + offset as u64;
            let mut value = 0.0f32;
            for voice in &self.voices {
                if now >= voice.start_frame && now < voice.end_frame() {
                    value += voice.samples[(now - voice.start_frame) as usize];
                }
            }
            for cue in &self.cues {
                if let Some(sample) = cue.samples.get(cue.position + offset) {
                    value += *sample;
                }
            }
            *slot = (value * self.gain).clamp(-1.0, 1.0);
        }

        self.clock += self.block as u64;
        for cue in &mut self.cues {
            cue.position += self.block;
        }
        self.cues.retain(|cue| cue.position < cue.samples.len());

        let clock = self.clock;
        let finished = &mut self.finished;
        self.voices.retain(|voice| {
            if voice.end_frame() <= clock {
                finished.push(voice.id);
                false
            } else {
                true
            }
        });

        let converted = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&block)?,
            None => block,
        };
        let produced = converted.len();
        self.ready.extend(converted);
        Ok(produced)
    }
}

impl OutputDevice for Mixer {
    fn current_time(&self) -> f64 {
        self.clock as f64 / self.timeline_rate as f64
    }

    /// Queue `buffer` to start on the timeline frame nearest `start_time`.
    fn schedule(&mut self, id: SegmentId, buffer: &AudioBuffer, start_time: f64) -> RadioResult<()> {
        if buffer.sample_rate() != self.timeline_rate {
            return Err(RadioError::Device(format!(
                "segment at {} Hz on a {} Hz timeline",
                buffer.sample_rate(),
                self.timeline_rate
            )));
        }
        let start_frame = (start_time.max(0.0) * self.timeline_rate as f64).round() as u64;
        self.voices.push(Voice {
            id,
            samples: buffer.mixdown(),
            start_frame: start_frame.max(self.clock),
        });
        Ok(())
    }

    /// Drop a voice without reporting it finished.
    fn stop(&mut self, id: SegmentId) {
        self.voices.retain(|voice| voice.id != id);
    }

    /// Mono cue at the timeline rate, starting with the next mixed block.
    fn play_now(&mut self, samples: Vec<f32>) {
        if !samples.is_empty() {
            self.cues.push(Cue { samples, position: 0 });
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    fn sample_rate(&self) -> u32 {
        self.timeline_rate
    }
}
