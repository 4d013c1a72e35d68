//! DSP core: fixed-point FM synthesis.
//!
//! Envelopes and waveforms drive operators, which are linked into trees
//! inside an arena. Sounds mix those trees into 16-bit PCM. The same code
//! runs in the browser (via WASM) and in the `mmlplay` CLI.

pub mod algorithm;
pub mod envelope;
pub mod operator;
pub mod oscillator;
pub mod renderer;
pub mod sound;
