//! Text-to-speech providers
//!
//! Synthesis is sentence-at-a-time: the speaking path hands each chunked
//! sentence to the provider and frames the returned audio out to the
//! gateway. Providers are always asked for raw PCM or WAV; WAV is decoded
//! and everything is resampled to the telephony rate before framing.

pub mod http;
pub mod rechunk;

use async_trait::async_trait;

use outdial_core::{Language, VoiceSettings};

use crate::PipelineError;

/// One synthesis request
#[derive(Debug, Clone)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: String,
    pub language: Language,
    pub settings: VoiceSettings,
}

/// TTS provider interface. Returns PCM16 / 8 kHz / mono bytes.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError>;
}

/// Decode provider audio bytes to telephony-rate PCM16.
///
/// WAV (RIFF magic) is decoded through its header; anything else is
/// treated as raw PCM16 at `raw_rate`.
pub fn decode_to_telephony_pcm(bytes: &[u8], raw_rate: u32) -> Result<Vec<u8>, PipelineError> {
    use outdial_core::audio::{pcm16_from_samples, resample, samples_from_pcm16, TELEPHONY_SAMPLE_RATE};

    let (samples, rate) = if bytes.len() >= 4 && &bytes[0..4] == b"RIFF" {
        let reader = hound::WavReader::new(std::io::Cursor::new(bytes))
            .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(PipelineError::AudioDecode(format!(
                "expected mono WAV, got {} channels",
                spec.channels
            )));
        }
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / 32768.0)
                .collect(),
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .filter_map(|s| s.ok())
                .collect(),
        };
        (samples, spec.sample_rate)
    } else {
        (samples_from_pcm16(bytes), raw_rate)
    };

    let resampled = resample(&samples, rate, TELEPHONY_SAMPLE_RATE);
    Ok(pcm16_from_samples(&resampled))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_wav_decode_resamples() {
        // 16 kHz WAV halves to 8 kHz
        let samples: Vec<i16> = vec![0; 1600];
        let wav = wav_bytes(16000, &samples);
        let pcm = decode_to_telephony_pcm(&wav, 16000).unwrap();
        assert_eq!(pcm.len(), 1600); // 800 samples * 2 bytes
    }

    #[test]
    fn test_raw_pcm_passthrough_at_rate() {
        let raw: Vec<u8> = vec![0; 640]; // 320 samples at 8 kHz
        let pcm = decode_to_telephony_pcm(&raw, 8000).unwrap();
        assert_eq!(pcm.len(), 640);
    }

    #[test]
    fn test_stereo_wav_rejected() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(0i16).unwrap();
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        assert!(decode_to_telephony_pcm(&cursor.into_inner(), 8000).is_err());
    }
}
