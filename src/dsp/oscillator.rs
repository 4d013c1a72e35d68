//! Fixed-point waveform generators.
//!
//! A phase of `2 * PHASE_PI` is one full cycle. Every generator returns a
//! signed amplitude in roughly `[-32767, 32767]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Half a cycle in phase units.
pub const PHASE_PI: i32 = 0x10000;

const QUARTER: i32 = PHASE_PI / 2;
const FULL_SCALE: i32 = i16::MAX as i32;

/// Quarter-wave sine table with one guard entry on each side for the
/// linear interpolation.
static SIN_TABLE: [i16; 258] = [
    -0x00c9,
    0x0000, 0x00c9, 0x0192, 0x025b, 0x0324, 0x03ed, 0x04b6, 0x057e, 0x0647,
    0x0710, 0x07d9, 0x08a1, 0x096a, 0x0a32, 0x0afb, 0x0bc3, 0x0c8b, 0x0d53,
    0x0e1b, 0x0ee3, 0x0fab, 0x1072, 0x1139, 0x1200, 0x12c7, 0x138e, 0x1455,
    0x151b, 0x15e1, 0x16a7, 0x176d, 0x1833, 0x18f8, 0x19bd, 0x1a82, 0x1b46,
    0x1c0b, 0x1ccf, 0x1d93, 0x1e56, 0x1f19, 0x1fdc, 0x209f, 0x2161, 0x2223,
    0x22e4, 0x23a6, 0x2467, 0x2527, 0x25e7, 0x26a7, 0x2767, 0x2826, 0x28e5,
    0x29a3, 0x2a61, 0x2b1e, 0x2bdb, 0x2c98, 0x2d54, 0x2e10, 0x2ecc, 0x2f86,
    0x3041, 0x30fb, 0x31b4, 0x326d, 0x3326, 0x33de, 0x3496, 0x354d, 0x3603,
    0x36b9, 0x376f, 0x3824, 0x38d8, 0x398c, 0x3a3f, 0x3af2, 0x3ba4, 0x3c56,
    0x3d07, 0x3db7, 0x3e67, 0x3f16, 0x3fc5, 0x4073, 0x4120, 0x41cd, 0x4279,
    0x4325, 0x43d0, 0x447a, 0x4523, 0x45cc, 0x4674, 0x471c, 0x47c3, 0x4869,
    0x490e, 0x49b3, 0x4a57, 0x4afa, 0x4b9d, 0x4c3f, 0x4ce0, 0x4d80, 0x4e20,
    0x4ebf, 0x4f5d, 0x4ffa, 0x5097, 0x5133, 0x51ce, 0x5268, 0x5301, 0x539a,
    0x5432, 0x54c9, 0x555f, 0x55f4, 0x5689, 0x571d, 0x57b0, 0x5842, 0x58d3,
    0x5963, 0x59f3, 0x5a81, 0x5b0f, 0x5b9c, 0x5c28, 0x5cb3, 0x5d3d, 0x5dc6,
    0x5e4f, 0x5ed6, 0x5f5d, 0x5fe2, 0x6067, 0x60eb, 0x616e, 0x61f0, 0x6271,
    0x62f1, 0x6370, 0x63ee, 0x646b, 0x64e7, 0x6562, 0x65dd, 0x6656, 0x66ce,
    0x6745, 0x67bc, 0x6831, 0x68a5, 0x6919, 0x698b, 0x69fc, 0x6a6c, 0x6adb,
    0x6b4a, 0x6bb7, 0x6c23, 0x6c8e, 0x6cf8, 0x6d61, 0x6dc9, 0x6e30, 0x6e95,
    0x6efa, 0x6f5e, 0x6fc0, 0x7022, 0x7082, 0x70e1, 0x7140, 0x719d, 0x71f9,
    0x7254, 0x72ae, 0x7306, 0x735e, 0x73b5, 0x740a, 0x745e, 0x74b1, 0x7503,
    0x7554, 0x75a4, 0x75f3, 0x7640, 0x768d, 0x76d8, 0x7722, 0x776b, 0x77b3,
    0x77f9, 0x783f, 0x7883, 0x78c6, 0x7908, 0x7949, 0x7989, 0x79c7, 0x7a04,
    0x7a41, 0x7a7c, 0x7ab5, 0x7aee, 0x7b25, 0x7b5c, 0x7b91, 0x7bc4, 0x7bf7,
    0x7c29, 0x7c59, 0x7c88, 0x7cb6, 0x7ce2, 0x7d0e, 0x7d38, 0x7d61, 0x7d89,
    0x7db0, 0x7dd5, 0x7df9, 0x7e1c, 0x7e3e, 0x7e5e, 0x7e7e, 0x7e9c, 0x7eb9,
    0x7ed4, 0x7eef, 0x7f08, 0x7f20, 0x7f37, 0x7f4c, 0x7f61, 0x7f74, 0x7f86,
    0x7f96, 0x7fa6, 0x7fb4, 0x7fc1, 0x7fcd, 0x7fd7, 0x7fe0, 0x7fe8, 0x7fef,
    0x7ff5, 0x7ff9, 0x7ffc, 0x7ffe, 0x7fff,
];

/// Supported operator waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl Waveform {
    /// Amplitude at `theta`. Any phase is accepted; it is folded into one cycle first.
    pub fn sample(self, theta: i32) -> i32 {
        let theta = fold_phase(theta);
        match self {
            Waveform::Sine => sine(theta),
            Waveform::Triangle => triangle(theta),
            Waveform::Sawtooth => (theta >> 1) - FULL_SCALE,
            Waveform::Square => {
                if theta < PHASE_PI {
                    FULL_SCALE
                } else {
                    -FULL_SCALE
                }
            }
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waveform::Sine => "sine",
            Waveform::Triangle => "triangle",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Square => "square",
        };
        f.write_str(name)
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" | "sin" => Ok(Waveform::Sine),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "square" => Ok(Waveform::Square),
            _ => Err(format!("unknown waveform '{s}'")),
        }
    }
}

/// Fold a phase into `[0, 2 * PHASE_PI)`. Negative phases are mirrored
/// around `PHASE_PI`, which keeps the sine odd.
fn fold_phase(theta: i32) -> i32 {
    let theta = theta as i64;
    let theta = if theta < 0 { PHASE_PI as i64 - theta } else { theta };
    (theta % (2 * PHASE_PI as i64)) as i32
}

fn sine(theta: i32) -> i32 {
    let rest = theta & 0x7f;
    let quadrant = theta / QUARTER;
    let idx = ((theta % QUARTER) >> 7) as usize;

    let level = if quadrant & 0x01 != 0 {
        let idx = 257 - idx;
        let base = SIN_TABLE[idx] as i32;
        base + (((SIN_TABLE[idx - 1] as i32 - base) * rest) >> 7)
    } else {
        let base = SIN_TABLE[idx + 1] as i32;
        base + (((SIN_TABLE[idx + 2] as i32 - base) * rest) >> 7)
    };

    if quadrant & 0x02 != 0 { -level } else { level }
}

fn triangle(theta: i32) -> i32 {
    let offset = theta % QUARTER;
    let (start, slope) = match theta / QUARTER {
        0 => (0, FULL_SCALE),
        1 => (FULL_SCALE, -FULL_SCALE),
        2 => (0, -FULL_SCALE),
        _ => (-FULL_SCALE, FULL_SCALE),
    };
    start + ((slope * offset) >> 15)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Sawtooth,
        Waveform::Square,
    ];

    #[test]
    fn sine_key_points() {
        assert_eq!(Waveform::Sine.sample(0), 0);
        assert_eq!(Waveform::Sine.sample(QUARTER), FULL_SCALE);
        assert_eq!(Waveform::Sine.sample(PHASE_PI).abs(), 0);
        assert_eq!(Waveform::Sine.sample(3 * QUARTER), -FULL_SCALE);
    }

    #[test]
    fn sine_is_odd() {
        for theta in (1..2 * PHASE_PI).step_by(997) {
            assert_eq!(
                Waveform::Sine.sample(-theta),
                -Waveform::Sine.sample(theta),
                "theta = {theta}"
            );
        }
    }

    #[test]
    fn sine_tracks_float_sine() {
        for theta in (0..2 * PHASE_PI).step_by(311) {
            let expected = (theta as f64 / PHASE_PI as f64 * std::f64::consts::PI).sin() * 32767.0;
            let got = Waveform::Sine.sample(theta) as f64;
            assert!((got - expected).abs() < 80.0, "theta {theta}: {got} vs {expected}");
        }
    }

    #[test]
    fn periodic_over_full_cycle() {
        for wave in ALL {
            for theta in (0..2 * PHASE_PI).step_by(1013) {
                assert_eq!(wave.sample(theta), wave.sample(theta + 2 * PHASE_PI), "{wave}");
            }
        }
    }

    #[test]
    fn outputs_stay_in_range() {
        for wave in ALL {
            for theta in (-4 * PHASE_PI..4 * PHASE_PI).step_by(97) {
                let s = wave.sample(theta);
                assert!((-FULL_SCALE..=FULL_SCALE + 1).contains(&s), "{wave} out of range: {s}");
            }
        }
    }

    #[test]
    fn triangle_and_square_shape() {
        assert_eq!(Waveform::Triangle.sample(0), 0);
        assert_eq!(Waveform::Triangle.sample(QUARTER), FULL_SCALE);
        assert_eq!(Waveform::Triangle.sample(3 * QUARTER), -FULL_SCALE);
        assert_eq!(Waveform::Square.sample(10), FULL_SCALE);
        assert_eq!(Waveform::Square.sample(PHASE_PI + 10), -FULL_SCALE);
    }

    #[test]
    fn sawtooth_rises_across_cycle() {
        assert_eq!(Waveform::Sawtooth.sample(0), -FULL_SCALE);
        let mut prev = Waveform::Sawtooth.sample(0);
        for theta in (1..2 * PHASE_PI).step_by(101) {
            let s = Waveform::Sawtooth.sample(theta);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn parse_waveform_names() {
        assert_eq!("saw".parse::<Waveform>().unwrap(), Waveform::Sawtooth);
        assert_eq!("sine".parse::<Waveform>().unwrap(), Waveform::Sine);
        assert!("noise".parse::<Waveform>().is_err());
    }
}
