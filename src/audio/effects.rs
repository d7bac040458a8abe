//! Procedural radio cues.
//!
//! Both generators return plain sample vectors that the controller plays with
//! `OutputDevice::play_now`, outside the response timeline.

use rand::Rng;

use crate::config::EffectsConfig;

/// Fading white-noise burst (squelch tail, talk release).
///
/// Amplitude falls linearly from `amplitude` to zero across the burst.
pub fn static_burst<R: Rng + ?Sized>(
    rng: &mut R,
    sample_rate: u32,
    duration_secs: f32,
    amplitude: f32,
) -> Vec<f32> {
    let len = (sample_rate as f32 * duration_secs.max(0.0)) as usize;
    (0..len)
        .map(|i| {
            let fade = 1.0 - i as f32 / len as f32;
            rng.gen_range(-1.0f32..1.0) * amplitude * fade
        })
        .collect()
}

/// Short upward sine sweep (link up, talk pressed).
///
/// Frequency and gain both move exponentially from their start to end values.
pub fn radio_chirp(sample_rate: u32, effects: &EffectsConfig) -> Vec<f32> {
    let len = (sample_rate as f32 * effects.chirp_secs.max(0.0)) as usize;
    let rate = sample_rate as f32;
    let mut phase = 0.0f32;

    (0..len)
        .map(|i| {
            let t = i as f32 / len as f32;
            let freq = exp_ramp(effects.chirp_start_hz, effects.chirp_end_hz, t);
            let gain = exp_ramp(effects.chirp_gain_start, effects.chirp_gain_end, t);
            let sample = phase.sin() * gain;
            phase += std::f32::consts::TAU * freq / rate;
            if phase > std::f32::consts::TAU {
                phase -= std::f32::consts::TAU;
            }
            sample
        })
        .collect()
}

/// Exponential interpolation; falls back to linear when either end is not positive.
fn exp_ramp(from: f32, to: f32, t: f32) -> f32 {
    if from > 0.0 && to > 0.0 {
        from * (to / from).powf(t)
    } else {
        from + (to - from) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_static_burst_length_and_fade() {
        let mut rng = StdRng::seed_from_u64(7);
        let burst = static_burst(&mut rng, 24000, 0.15, 0.05);
        assert_eq!(burst.len(), 3600);
        assert!(burst.iter().all(|s| s.abs() <= 0.05));

        // Last tenth is quieter than the first tenth
        let head: f32 = burst[..360].iter().map(|s| s.abs()).sum();
        let tail: f32 = burst[3240..].iter().map(|s| s.abs()).sum();
        assert!(tail < head);
    }

    #[test]
    fn test_static_burst_zero_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(static_burst(&mut rng, 24000, 0.0, 0.05).is_empty());
    }

    #[test]
    fn test_chirp_shape() {
        let effects = AppConfig::default().effects;
        let chirp = radio_chirp(24000, &effects);
        assert_eq!(chirp.len(), 1200);
        assert!(chirp.iter().all(|s| s.abs() <= effects.chirp_gain_start + 1e-6));
        assert_eq!(chirp[0], 0.0);
    }

    #[test]
    fn test_exp_ramp_endpoints() {
        assert!((exp_ramp(880.0, 1760.0, 0.0) - 880.0).abs() < 1e-3);
        assert!((exp_ramp(880.0, 1760.0, 1.0) - 1760.0).abs() < 1e-2);
        assert!((exp_ramp(880.0, 1760.0, 0.5) - 1244.5).abs() < 0.1);
        assert_eq!(exp_ramp(0.0, 1.0, 0.5), 0.5);
    }
}
