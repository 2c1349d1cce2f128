//! Batch transcription fallback
//!
//! When no streaming provider is reachable (or a stream dies mid-turn),
//! the buffered turn audio is wrapped in a WAV container and posted to a
//! Whisper-style transcription endpoint.

use serde::Deserialize;

use crate::PipelineError;

/// Batch endpoint configuration
#[derive(Debug, Clone)]
pub struct BatchSttConfig {
    pub url: String,
    pub api_key: String,
    pub language: Option<String>,
}

#[derive(Deserialize)]
struct BatchResponse {
    text: String,
}

/// Wrap raw PCM16 / 8 kHz mono bytes in a WAV container
pub fn wav_from_pcm(pcm: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Transcribe one buffered turn
pub async fn transcribe(config: &BatchSttConfig, pcm: &[u8]) -> Result<String, PipelineError> {
    if config.url.is_empty() {
        return Err(PipelineError::Connection(
            "no batch STT endpoint configured".to_string(),
        ));
    }

    let wav = wav_from_pcm(pcm)?;

    let file_part = reqwest::multipart::Part::bytes(wav)
        .file_name("turn.wav")
        .mime_str("audio/wav")
        .map_err(|e| PipelineError::Stt(e.to_string()))?;
    let mut form = reqwest::multipart::Form::new()
        .part("file", file_part)
        .text("model", "whisper-1");
    if let Some(ref language) = config.language {
        form = form.text("language", language.clone());
    }

    let client = reqwest::Client::new();
    let response = client
        .post(&config.url)
        .bearer_auth(&config.api_key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| PipelineError::Stt(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::Stt(format!("HTTP {}: {}", status, body)));
    }

    let parsed: BatchResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::Stt(e.to_string()))?;

    Ok(parsed.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_wrapping() {
        let pcm: Vec<u8> = (0..320u16).flat_map(|i| (i as i16).to_le_bytes()).collect();
        let wav = wav_from_pcm(&pcm).unwrap();

        // RIFF header plus the payload
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > pcm.len());

        // Round-trip through the reader
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 320);
    }

    #[tokio::test]
    async fn test_missing_endpoint_rejected() {
        let config = BatchSttConfig {
            url: String::new(),
            api_key: String::new(),
            language: None,
        };
        assert!(transcribe(&config, &[0u8; 640]).await.is_err());
    }
}
