//! Telephony audio utilities
//!
//! The gateway speaks 16-bit signed PCM, 8 kHz, mono, little-endian. TTS
//! providers may produce other sample rates; everything is brought to the
//! telephony rate before framing.

/// Sample rate of the telephony leg
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Bytes per outbound gateway frame (100 ms at 8 kHz / 16-bit mono)
pub const OUTBOUND_FRAME_BYTES: usize = 3200;

/// Outbound payloads must end on this boundary (20 ms at 8 kHz / 16-bit)
pub const FRAME_PAD_BOUNDARY: usize = 320;

const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

/// Decode little-endian PCM16 bytes into normalized f32 samples
pub fn samples_from_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / PCM16_NORMALIZE
        })
        .collect()
}

/// Encode normalized f32 samples as little-endian PCM16 bytes
pub fn pcm16_from_samples(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm16 = (clamped * PCM16_SCALE) as i16;
            pcm16.to_le_bytes()
        })
        .collect()
}

/// Resample f32 samples between rates using Rubato (sinc/FFT), with a linear
/// fallback for very short buffers where the FFT resampler cannot run.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    if samples.len() < 64 {
        return resample_linear(samples, from_rate, to_rate);
    }

    let samples_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let chunk_size = samples.len().min(1024);

    match FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1) {
        Ok(mut resampler) => {
            let input_frames = vec![samples_f64];
            match resampler.process(&input_frames, None) {
                Ok(output_frames) => output_frames[0].iter().map(|&s| s as f32).collect(),
                Err(e) => {
                    tracing::warn!("Rubato processing failed, using linear fallback: {}", e);
                    resample_linear(samples, from_rate, to_rate)
                },
            }
        },
        Err(e) => {
            tracing::warn!("Rubato init failed, using linear fallback: {}", e);
            resample_linear(samples, from_rate, to_rate)
        },
    }
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx_floor = src_idx.floor() as usize;
        let idx_ceil = (idx_floor + 1).min(samples.len().saturating_sub(1));
        let frac = src_idx - idx_floor as f64;

        let sample = samples[idx_floor] * (1.0 - frac as f32) + samples[idx_ceil] * frac as f32;
        resampled.push(sample);
    }

    resampled
}

/// RMS energy of a sample buffer, used for the batch-VAD silence window
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_round_trip_signs() {
        let pcm16: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0]; // Two samples
        let samples = samples_from_pcm16(&pcm16);

        assert_eq!(samples.len(), 2);
        assert!(samples[0] > 0.0);
        assert!(samples[1] < 0.0);

        let bytes = pcm16_from_samples(&samples);
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![0.0f32; 160]; // 10ms at 16kHz
        let resampled = resample(&samples, 16000, 8000);
        assert_eq!(resampled.len(), 80); // 10ms at 8kHz
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.25f32; 80];
        let out = resample(&samples, 8000, 8000);
        assert_eq!(out, samples);
    }

    #[test]
    fn test_rms_energy() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);

        assert_eq!(rms_energy(&[]), 0.0);
    }
}
