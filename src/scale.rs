//! Equal-tempered pitch for MML note indices.

/// Index of O4A, the tuning reference.
pub const A4_INDEX: i32 = 57;

pub const DEFAULT_TUNING: f32 = 440.0;

const NAMES: [&str; 12] = ["C", "C+", "D", "D+", "E", "F", "F+", "G", "G+", "A", "A+", "B"];

/// Frequency in Hz of `index` (`octave * 12 + semitone`), with O4A at
/// `tuning_pitch`.
pub fn note_frequency(index: i32, tuning_pitch: f32) -> f32 {
    (tuning_pitch as f64 * 2.0_f64.powf((index - A4_INDEX) as f64 / 12.0)) as f32
}

/// MML spelling of a note index, e.g. `O4C+`. Sharps only.
pub fn note_name(index: i32) -> String {
    let octave = index.div_euclid(12);
    let name = NAMES[index.rem_euclid(12) as usize];
    format!("O{octave}{name}")
}
