//! Operator presets: serializable descriptions of operator trees.
//!
//! A preset names a carrier operator; each operator lists the modulators
//! feeding it. The first modulator is cascaded into the operator and the
//! rest run in parallel with the first, so all of them modulate the same
//! operator.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::EgLevels;
use crate::dsp::operator::{OpId, OperatorGraph};
use crate::dsp::oscillator::Waveform;
use crate::error::{OperatorError, PresetError};

/// Top-level preset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetDescriptor {
    /// Human-readable name (e.g., "Electric Piano").
    pub name: String,
    /// The operator whose output is heard.
    pub carrier: OperatorPreset,
}

/// One operator and the modulators feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorPreset {
    pub waveform: Waveform,
    /// Frequency multiplier relative to the played note.
    #[serde(default = "default_freq_rate")]
    pub freq_rate: f32,
    /// Envelope levels. Without one the operator holds full level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EgLevels>,
    /// Self-feedback ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modulators: Vec<OperatorPreset>,
}

fn default_freq_rate() -> f32 {
    1.0
}

impl OperatorPreset {
    pub fn new(waveform: Waveform) -> Self {
        OperatorPreset {
            waveform,
            freq_rate: 1.0,
            envelope: None,
            feedback: None,
            modulators: Vec::new(),
        }
    }

    pub fn with_freq_rate(mut self, rate: f32) -> Self {
        self.freq_rate = rate;
        self
    }

    pub fn with_envelope(mut self, levels: EgLevels) -> Self {
        self.envelope = Some(levels);
        self
    }

    pub fn with_feedback(mut self, ratio: f32) -> Self {
        self.feedback = Some(ratio);
        self
    }

    pub fn with_modulator(mut self, modulator: OperatorPreset) -> Self {
        self.modulators.push(modulator);
        self
    }

    /// Total operators in this subtree.
    pub fn operator_count(&self) -> usize {
        1 + self.modulators.iter().map(|m| m.operator_count()).sum::<usize>()
    }

    /// Create the operator tree in `graph`. On failure nothing is left behind.
    pub fn build(&self, graph: &mut OperatorGraph) -> Result<OpId, OperatorError> {
        let op = graph.create();
        if let Err(e) = self.configure(graph, op) {
            let _ = graph.delete_ops(op);
            return Err(e);
        }
        Ok(op)
    }

    fn configure(&self, graph: &mut OperatorGraph, op: OpId) -> Result<(), OperatorError> {
        graph.select_opfunc(op, self.waveform)?;
        graph.set_soundfreqrate(op, self.freq_rate)?;
        if let Some(levels) = &self.envelope {
            graph.set_envelope(op, levels)?;
        }
        if let Some(ratio) = self.feedback {
            graph.bind_feedback(op, op, ratio)?;
        }

        let mut first: Option<OpId> = None;
        for modulator in &self.modulators {
            let sub = modulator.build(graph)?;
            let linked = match first {
                None => graph.cascade_subop(op, sub),
                Some(f) => graph.parallel_subop(f, sub),
            };
            if let Err(e) = linked {
                let _ = graph.delete_ops(sub);
                return Err(e);
            }
            first.get_or_insert(sub);
        }
        Ok(())
    }
}

impl PresetDescriptor {
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build(&self, graph: &mut OperatorGraph) -> Result<OpId, PresetError> {
        self.carrier.build(graph).map_err(|source| PresetError::Build {
            preset: self.name.clone(),
            source,
        })
    }
}
