//! WAV renderer: renders an MML score to a WAV byte buffer.

use crate::error::SynthError;
use crate::player::{PlayerConfig, render_score};

const BITS_PER_SAMPLE: u16 = 16;

/// Render `source` to a 16-bit PCM WAV file held in memory.
pub fn render_wav(source: &str, config: &PlayerConfig) -> Result<Vec<u8>, SynthError> {
    let pcm = render_score(source, config)?;
    Ok(encode_wav(&pcm, config.sample_rate, config.channels))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bytes_per_sample = BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    let block_align = channels * bytes_per_sample;
    let data_size = (samples.len() * bytes_per_sample as usize) as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    buf.extend(samples.iter().flat_map(|s| s.to_le_bytes()));

    buf
}
