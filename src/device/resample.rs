//! Sample-rate conversion between device rates and the rates on the wire.
//!
//! Capture runs device rate → 16 kHz; playback runs the 24 kHz response
//! timeline → device rate. Both sides feed one long-lived FFT resampler per
//! stream, so consecutive buffers are converted as one continuous signal and
//! no block boundary can open a gap.

use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::{Fft, FixedSync, Resampler};

use crate::error::{RadioError, RadioResult};

const MONO: usize = 1;

/// Number of sub-chunks for the FFT resampler (1 = lowest latency)
const SUB_CHUNKS: usize = 1;

/// True when `from` and `to` differ and a resampler is needed.
pub fn needs_resampling(from_rate: u32, to_rate: u32) -> bool {
    from_rate != to_rate
}

/// 10 ms worth of frames at `rate`.
fn chunk_frames(rate: u32) -> usize {
    (rate as usize / 100).max(1)
}

/// Mono streaming resampler.
///
/// Input is accumulated until the resampler can take a full chunk; whatever
/// is not yet enough for a chunk waits for the next call.
pub struct StreamResampler {
    resampler: Fft<f32>,
    from_rate: u32,
    to_rate: u32,
    input_buffer: Vec<f32>,
    work_in: Vec<Vec<f32>>,
    work_out: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// Microphone side: fixed 10 ms output blocks at `target_rate`.
    pub fn capture(device_rate: u32, target_rate: u32) -> RadioResult<Self> {
        Self::build(device_rate, target_rate, chunk_frames(target_rate), FixedSync::Output)
    }

    /// Speaker side: fixed 10 ms input blocks at `source_rate`.
    pub fn playback(source_rate: u32, device_rate: u32) -> RadioResult<Self> {
        Self::build(source_rate, device_rate, chunk_frames(source_rate), FixedSync::Input)
    }

    fn build(from_rate: u32, to_rate: u32, chunk: usize, fixed: FixedSync) -> RadioResult<Self> {
        let resampler = Fft::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            chunk,
            SUB_CHUNKS,
            MONO,
            fixed,
        )
        .map_err(|e| {
            RadioError::Device(format!(
                "failed to create {} Hz -> {} Hz resampler: {}",
                from_rate, to_rate, e
            ))
        })?;

        let input_frames_max = resampler.input_frames_max();
        let output_frames_max = resampler.output_frames_max();

        Ok(Self {
            resampler,
            from_rate,
            to_rate,
            input_buffer: Vec::new(),
            work_in: vec![vec![0.0; input_frames_max]],
            work_out: vec![vec![0.0; output_frames_max]],
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Feed samples at `from_rate`; returns every sample now ready at `to_rate`.
    pub fn process(&mut self, samples: &[f32]) -> RadioResult<Vec<f32>> {
        self.input_buffer.extend_from_slice(samples);

        let mut output = Vec::new();
        while self.input_buffer.len() >= self.resampler.input_frames_next() {
            let frames_needed = self.resampler.input_frames_next();
            self.work_in[0][..frames_needed].copy_from_slice(&self.input_buffer[..frames_needed]);
            self.input_buffer.drain(..frames_needed);

            let input_adapter = SequentialSliceOfVecs::new(&self.work_in[..], MONO, frames_needed)
                .map_err(|e| RadioError::Device(format!("resampler input adapter: {}", e)))?;

            let output_frames = self.resampler.output_frames_next();
            let mut output_adapter =
                SequentialSliceOfVecs::new_mut(&mut self.work_out[..], MONO, output_frames)
                    .map_err(|e| RadioError::Device(format!("resampler output adapter: {}", e)))?;

            let (_, frames_written) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| RadioError::Device(format!("resampler: {}", e)))?;

            output.extend_from_slice(&self.work_out[0][..frames_written]);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(resampler: &mut StreamResampler, block: usize, blocks: usize) -> Vec<f32> {
        let mut produced = Vec::new();
        for _ in 0..blocks {
            produced.extend(resampler.process(&vec![0.5f32; block]).unwrap());
        }
        produced
    }

    #[test]
    fn test_needs_resampling() {
        assert!(!needs_resampling(24000, 24000));
        assert!(needs_resampling(24000, 44100));
        assert!(needs_resampling(48000, 16000));
    }

    #[test]
    fn test_capture_downsamples_to_wire_rate() {
        let mut resampler = StreamResampler::capture(48000, 16000).unwrap();
        assert_eq!((resampler.from_rate(), resampler.to_rate()), (48000, 16000));

        // One second in odd-sized device callbacks
        let produced = feed(&mut resampler, 480, 100);

        // Whole 10 ms blocks only; at most one block still in flight
        assert_eq!(produced.len() % 160, 0);
        assert!(produced.len() >= 16000 - 2 * 160 && produced.len() <= 16000);
    }

    #[test]
    fn test_playback_upsamples_continuously() {
        let mut resampler = StreamResampler::playback(24000, 44100).unwrap();

        // 1001-sample pieces do not line up with the 240-frame blocks
        let produced = feed(&mut resampler, 1001, 24);
        let expected = 24 * 1001 * 44100 / 24000;
        assert!(produced.len() <= expected && produced.len() + 2 * 441 >= expected);

        // Past the filter's start-up, a constant input stays constant
        let settled = &produced[2000..produced.len() - 2000];
        assert!(settled.iter().all(|&s| (s - 0.5).abs() < 0.05));
    }

    #[test]
    fn test_empty_input() {
        let mut resampler = StreamResampler::playback(24000, 48000).unwrap();
        assert!(resampler.process(&[]).unwrap().is_empty());
    }
}
