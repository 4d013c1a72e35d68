//! Built-in operator routings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{EgLevel, EgLevels};
use crate::dsp::operator::{OpId, OperatorGraph};
use crate::dsp::oscillator::Waveform;
use crate::error::OperatorError;
use crate::preset::{OperatorPreset, PresetDescriptor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Algorithm {
    /// A single enveloped sine.
    #[default]
    Plain,
    /// Sine carrier modulated by a self-feedback sine at twice the pitch.
    Feedback,
    /// Sine carrier with two parallel modulators, the first one itself
    /// modulated by a third.
    Stacked,
}

const CARRIER_ENVELOPE: EgLevels = EgLevels {
    attack: EgLevel::new(1.0, 5),
    decay_break: EgLevel::new(0.6, 60),
    decay: EgLevel::new(0.4, 200),
    sustain: EgLevel::new(0.3, 600),
    release: EgLevel::new(0.0, 80),
};

const MODULATOR_ENVELOPE: EgLevels = EgLevels {
    attack: EgLevel::new(0.6, 2),
    decay_break: EgLevel::new(0.3, 100),
    decay: EgLevel::new(0.2, 300),
    sustain: EgLevel::new(0.1, 600),
    release: EgLevel::new(0.0, 80),
};

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Plain, Algorithm::Feedback, Algorithm::Stacked];

    pub fn from_index(index: u32) -> Option<Algorithm> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        match self {
            Algorithm::Plain => 0,
            Algorithm::Feedback => 1,
            Algorithm::Stacked => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Plain => "plain",
            Algorithm::Feedback => "feedback",
            Algorithm::Stacked => "stacked",
        }
    }

    pub fn preset(self) -> PresetDescriptor {
        let carrier = OperatorPreset::new(Waveform::Sine).with_envelope(CARRIER_ENVELOPE);
        let carrier = match self {
            Algorithm::Plain => carrier,
            Algorithm::Feedback => carrier.with_modulator(
                OperatorPreset::new(Waveform::Sine)
                    .with_freq_rate(2.0)
                    .with_envelope(MODULATOR_ENVELOPE)
                    .with_feedback(0.6),
            ),
            Algorithm::Stacked => carrier
                .with_modulator(
                    OperatorPreset::new(Waveform::Sine)
                        .with_freq_rate(1.0)
                        .with_envelope(MODULATOR_ENVELOPE)
                        .with_modulator(
                            OperatorPreset::new(Waveform::Sine)
                                .with_freq_rate(4.0)
                                .with_envelope(MODULATOR_ENVELOPE),
                        ),
                )
                .with_modulator(
                    OperatorPreset::new(Waveform::Triangle)
                        .with_freq_rate(3.0)
                        .with_envelope(MODULATOR_ENVELOPE),
                ),
        };
        PresetDescriptor {
            name: self.name().to_string(),
            carrier,
        }
    }

    /// Create this routing in `graph`, returning the carrier.
    pub fn build(self, graph: &mut OperatorGraph) -> Result<OpId, OperatorError> {
        self.preset().carrier.build(graph)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    /// Accepts the name or the numeric mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u32>() {
            return Algorithm::from_index(index).ok_or_else(|| format!("no algorithm {index} (0-2)"));
        }
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown algorithm '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(Algorithm::from_index(algorithm.index()), Some(algorithm));
        }
        assert_eq!(Algorithm::from_index(3), None);
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("1".parse::<Algorithm>(), Ok(Algorithm::Feedback));
        assert_eq!("Stacked".parse::<Algorithm>(), Ok(Algorithm::Stacked));
        assert!("7".parse::<Algorithm>().is_err());
        assert!("organ".parse::<Algorithm>().is_err());
    }

    #[test]
    fn operator_counts() {
        let counts: Vec<usize> = Algorithm::ALL
            .iter()
            .map(|a| {
                let mut graph = OperatorGraph::new(48000);
                a.build(&mut graph).unwrap();
                graph.len()
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 4]);
    }

    #[test]
    fn feedback_is_bound_to_modulator() {
        let mut graph = OperatorGraph::new(48000);
        let carrier = Algorithm::Feedback.build(&mut graph).unwrap();
        let modulator = graph.get(carrier).unwrap().cascade().unwrap();
        assert_eq!(graph.get(modulator).unwrap().freq_rate(), 2.0);

        graph.set_soundfreq(carrier, 440.0).unwrap();
        graph.start(carrier);
        for t in 0..200 {
            graph.update_feedback(carrier);
            graph.operate(carrier, t);
        }
        assert_ne!(graph.get(modulator).unwrap().feedback_val(), 0);
    }

    #[test]
    fn stacked_routing() {
        let mut graph = OperatorGraph::new(48000);
        let carrier = Algorithm::Stacked.build(&mut graph).unwrap();
        let first = graph.get(carrier).unwrap().cascade().unwrap();
        let second = graph.get(first).unwrap().parallel().unwrap();
        let nested = graph.get(first).unwrap().cascade().unwrap();
        assert_eq!(graph.get(second).unwrap().waveform(), Some(Waveform::Triangle));
        assert_eq!(graph.get(nested).unwrap().freq_rate(), 4.0);
        assert_eq!(graph.get(second).unwrap().parent(), Some(first));
        assert_eq!(graph.get(nested).unwrap().parent(), Some(first));
    }

    #[test]
    fn deleting_carrier_frees_everything() {
        let mut graph = OperatorGraph::new(48000);
        let carrier = Algorithm::Stacked.build(&mut graph).unwrap();
        assert_eq!(graph.delete_ops(carrier).unwrap(), 4);
        assert!(graph.is_empty());
    }
}
