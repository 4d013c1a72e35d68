pub mod dsp;
pub mod error;
pub mod parser;
pub mod player;
pub mod preset;
pub mod scale;
pub mod token;

use crate::dsp::algorithm::Algorithm;
use crate::error::{MmlError, SynthError};
use crate::parser::MmlConfig;
use crate::player::{PartEvents, PlayerConfig};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the fmsynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse an MML score (parts separated by `;`) with the default settings.
pub fn parse(source: &str) -> Result<Vec<PartEvents>, MmlError> {
    player::parse_parts(source, &MmlConfig::default())
}

fn player_config(sample_rate: u32, algorithm: u32) -> Result<PlayerConfig, JsValue> {
    let algorithm = Algorithm::from_index(algorithm)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown algorithm {algorithm}")))?;
    Ok(PlayerConfig {
        sample_rate,
        algorithm,
        ..PlayerConfig::default()
    })
}

fn mml_error(source: &str, e: &MmlError) -> JsValue {
    JsValue::from_str(&e.report("score.mml", source))
}

fn synth_error(source: &str, e: SynthError) -> JsValue {
    match e {
        SynthError::Mml(e) => mml_error(source, &e),
        other => JsValue::from_str(&format!("{other}")),
    }
}

/// WASM-exposed: parse MML into a JSON list of parts and their events.
/// Durations are in milliseconds.
#[wasm_bindgen]
pub fn parse_mml_events(source: &str) -> Result<JsValue, JsValue> {
    let parts = parse(source).map_err(|e| mml_error(source, &e))?;
    serde_wasm_bindgen::to_value(&parts).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render MML to a 16-bit stereo WAV byte array.
#[wasm_bindgen]
pub fn render_mml_wav(source: &str, sample_rate: u32, algorithm: u32) -> Result<Vec<u8>, JsValue> {
    let config = player_config(sample_rate, algorithm)?;
    dsp::renderer::render_wav(source, &config).map_err(|e| synth_error(source, e))
}

/// WASM-exposed: render MML to mono f32 samples in [-1, 1].
/// Returns the raw audio buffer for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_mml_samples(source: &str, sample_rate: u32, algorithm: u32) -> Result<Vec<f32>, JsValue> {
    let config = PlayerConfig {
        channels: 1,
        ..player_config(sample_rate, algorithm)?
    };
    let pcm = player::render_score(source, &config).map_err(|e| synth_error(source, e))?;
    Ok(pcm.iter().map(|&s| s as f32 / i16::MAX as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MmlEvent;

    #[test]
    fn parse_score_parts() {
        let parts = parse("T120L4O4C; O3 E").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].events[3].event, MmlEvent::Note { note: 48, ticks: 500 });
        assert_eq!(parts[1].events[1].event, MmlEvent::Note { note: 40, ticks: 500 });
    }

    #[test]
    fn parse_reports_first_error() {
        let err = parse("C; D; [E").unwrap_err();
        assert_eq!(err.code(), -10);
        assert_eq!(err.span.start, 6);
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }
}
