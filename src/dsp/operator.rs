//! FM operator graph.
//!
//! Operators live in an arena owned by [`OperatorGraph`] and are addressed
//! by generational [`OpId`] handles. Each operator owns its first cascade
//! child (a modulator) and its next parallel sibling, so the owning links
//! form a strict tree. Feedback is a plain handle and owns nothing.

use crate::error::OperatorError;

use super::envelope::{EgLevels, EnvelopeGenerator, MAX_EG_LEVEL};
use super::oscillator::{PHASE_PI, Waveform};

/// Handle to an operator inside an [`OperatorGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Feedback {
    source: OpId,
    /// Fixed-point ratio, `MAX_EG_LEVEL` = 1.0.
    rate: i32,
}

/// A single wave-generating unit.
#[derive(Debug, Clone)]
pub struct Operator {
    pub eg: EnvelopeGenerator,
    waveform: Option<Waveform>,
    cascade: Option<OpId>,
    parallel: Option<OpId>,
    parent: Option<OpId>,
    feedback: Option<Feedback>,
    feedback_val: i32,
    last_sigval: i32,
    freq_rate: f32,
    sound_freq: f32,
    delta_phase: f32,
    current_phase: f32,
}

impl Operator {
    fn new() -> Self {
        Operator {
            eg: EnvelopeGenerator::new(),
            waveform: None,
            cascade: None,
            parallel: None,
            parent: None,
            feedback: None,
            feedback_val: 0,
            last_sigval: 0,
            freq_rate: 1.0,
            sound_freq: 0.0,
            delta_phase: 0.0,
            current_phase: 0.0,
        }
    }

    pub fn waveform(&self) -> Option<Waveform> {
        self.waveform
    }

    /// First modulator cascaded into this operator.
    pub fn cascade(&self) -> Option<OpId> {
        self.cascade
    }

    /// Next operator sharing this operator's parent.
    pub fn parallel(&self) -> Option<OpId> {
        self.parallel
    }

    pub fn parent(&self) -> Option<OpId> {
        self.parent
    }

    pub fn freq_rate(&self) -> f32 {
        self.freq_rate
    }

    pub fn sound_freq(&self) -> f32 {
        self.sound_freq
    }

    /// Output of the most recent `operate()` call.
    pub fn last_sigval(&self) -> i32 {
        self.last_sigval
    }

    pub fn feedback_val(&self) -> i32 {
        self.feedback_val
    }

    fn update_delta(&mut self, sample_rate: u32) {
        self.delta_phase = if sample_rate != 0 {
            2.0 * PHASE_PI as f32 * self.sound_freq * self.freq_rate / sample_rate as f32
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    op: Option<Operator>,
}

/// Arena of operators sharing one sample rate.
#[derive(Debug, Clone)]
pub struct OperatorGraph {
    sample_rate: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl OperatorGraph {
    pub fn new(sample_rate: u32) -> Self {
        OperatorGraph {
            sample_rate,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the sample rate and refresh every operator's phase step.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        for op in self.slots.iter_mut().filter_map(|s| s.op.as_mut()) {
            op.update_delta(sample_rate);
        }
    }

    /// Number of live operators.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: OpId) -> Option<&Operator> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.op.as_ref())
    }

    pub fn get_mut(&mut self, id: OpId) -> Option<&mut Operator> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.op.as_mut())
    }

    fn node(&self, id: OpId) -> Result<&Operator, OperatorError> {
        self.get(id).ok_or(OperatorError::UnknownOperator(id))
    }

    fn node_mut(&mut self, id: OpId) -> Result<&mut Operator, OperatorError> {
        self.get_mut(id).ok_or(OperatorError::UnknownOperator(id))
    }

    /// Allocate a detached operator with its own envelope.
    pub fn create(&mut self) -> OpId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.op = Some(Operator::new());
            return OpId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            op: Some(Operator::new()),
        });
        OpId {
            index,
            generation: 0,
        }
    }

    pub fn select_opfunc(&mut self, id: OpId, waveform: Waveform) -> Result<(), OperatorError> {
        self.node_mut(id)?.waveform = Some(waveform);
        Ok(())
    }

    /// Install envelope levels at the graph's sample rate.
    pub fn set_envelope(&mut self, id: OpId, levels: &EgLevels) -> Result<(), OperatorError> {
        let sample_rate = self.sample_rate;
        self.node_mut(id)?.eg.set_param(sample_rate, levels)?;
        Ok(())
    }

    /// Frequency multiplier relative to the sounding frequency.
    pub fn set_soundfreqrate(&mut self, id: OpId, rate: f32) -> Result<(), OperatorError> {
        let sample_rate = self.sample_rate;
        let op = self.node_mut(id)?;
        op.freq_rate = rate;
        op.update_delta(sample_rate);
        Ok(())
    }

    /// Set the sounding frequency of `id` and of every modulator under it.
    pub fn set_soundfreq(&mut self, id: OpId, freq: f32) -> Result<(), OperatorError> {
        let sample_rate = self.sample_rate;
        let op = self.node_mut(id)?;
        op.sound_freq = freq;
        op.update_delta(sample_rate);

        let mut child = op.cascade;
        while let Some(c) = child {
            self.set_soundfreq(c, freq)?;
            child = self.node(c)?.parallel;
        }
        Ok(())
    }

    /// Attach `subop` at the bottom of `op`'s cascade chain.
    pub fn cascade_subop(&mut self, op: OpId, subop: OpId) -> Result<(), OperatorError> {
        let mut tail = op;
        while let Some(next) = self.node(tail)?.cascade {
            tail = next;
        }
        self.check_link(tail, subop)?;
        self.node_mut(tail)?.cascade = Some(subop);
        self.node_mut(subop)?.parent = Some(tail);
        Ok(())
    }

    /// Attach `subop` at the end of `op`'s sibling chain.
    pub fn parallel_subop(&mut self, op: OpId, subop: OpId) -> Result<(), OperatorError> {
        let mut tail = op;
        while let Some(next) = self.node(tail)?.parallel {
            tail = next;
        }
        self.check_link(tail, subop)?;
        self.node_mut(tail)?.parallel = Some(subop);
        self.node_mut(subop)?.parent = Some(tail);
        Ok(())
    }

    /// `subop` must be a detached root that is not an ancestor of `at`.
    fn check_link(&self, at: OpId, subop: OpId) -> Result<(), OperatorError> {
        if self.node(subop)?.parent.is_some() {
            return Err(OperatorError::AlreadyLinked(subop));
        }
        let mut cursor = Some(at);
        while let Some(c) = cursor {
            if c == subop {
                return Err(OperatorError::Cycle { op: at, subop });
            }
            cursor = self.node(c)?.parent;
        }
        Ok(())
    }

    /// Feed `source`'s previous output back into `op`'s phase, scaled by `ratio`.
    /// `source` may be `op` itself.
    pub fn bind_feedback(&mut self, op: OpId, source: OpId, ratio: f32) -> Result<(), OperatorError> {
        self.node(source)?;
        let node = self.node_mut(op)?;
        node.feedback = Some(Feedback {
            source,
            rate: (MAX_EG_LEVEL as f32 * ratio) as i32,
        });
        Ok(())
    }

    /// Latch feedback values for `op` and every modulator under it.
    pub fn update_feedback(&mut self, op: OpId) {
        let Some(node) = self.get(op) else {
            return;
        };
        let mut child = node.cascade;
        let feedback = node.feedback;
        while let Some(c) = child {
            self.update_feedback(c);
            child = self.get(c).and_then(|n| n.parallel);
        }

        if let Some(fb) = feedback {
            let source_val = self.get(fb.source).map_or(0, |s| s.last_sigval);
            if let Some(node) = self.get_mut(op) {
                node.feedback_val = (source_val as i64 * fb.rate as i64 / MAX_EG_LEVEL as i64) as i32;
            }
        }
    }

    /// Start the envelopes of `op` and its modulators.
    pub fn start(&mut self, op: OpId) {
        let Some(node) = self.get_mut(op) else {
            return;
        };
        node.eg.start();
        let mut child = node.cascade;
        while let Some(c) = child {
            self.start(c);
            child = self.get(c).and_then(|n| n.parallel);
        }
    }

    /// Stop the envelopes of `op` and its modulators.
    pub fn stop(&mut self, op: OpId) {
        let Some(node) = self.get_mut(op) else {
            return;
        };
        node.eg.stop();
        let mut child = node.cascade;
        while let Some(c) = child {
            self.stop(c);
            child = self.get(c).and_then(|n| n.parallel);
        }
    }

    /// Produce one sample from `op`. `phase_time == 0` resets the phase.
    pub fn operate(&mut self, op: OpId, phase_time: i32) -> i32 {
        let Some(node) = self.get_mut(op) else {
            return 0;
        };

        node.current_phase = if phase_time != 0 {
            node.current_phase + node.delta_phase
        } else {
            0.0
        };
        let whole = node.current_phase as i32;
        let cycles = whole / (2 * PHASE_PI);
        node.current_phase -= (cycles as i64 * 2 * PHASE_PI as i64) as f32;

        let mut phase = whole.wrapping_add(node.feedback_val);
        let mut child = node.cascade;
        while let Some(c) = child {
            phase = phase.wrapping_add(self.operate(c, phase_time));
            child = self.get(c).and_then(|n| n.parallel);
        }

        let Some(node) = self.get_mut(op) else {
            return 0;
        };
        let level = node.eg.operate() as i64;
        node.last_sigval = match node.waveform {
            Some(wave) => (level * wave.sample(phase) as i64 / MAX_EG_LEVEL as i64) as i32,
            None => 0,
        };
        node.last_sigval
    }

    /// Free `op`, everything cascaded under it, and its later parallel
    /// siblings. Returns the number of operators freed.
    pub fn delete_ops(&mut self, op: OpId) -> Result<usize, OperatorError> {
        let parent = self.node(op)?.parent;
        if let Some(p) = parent.and_then(|p| self.get_mut(p)) {
            if p.cascade == Some(op) {
                p.cascade = None;
            }
            if p.parallel == Some(op) {
                p.parallel = None;
            }
        }
        Ok(self.free_chain(op))
    }

    fn free_chain(&mut self, first: OpId) -> usize {
        let mut freed = 0;
        let mut cursor = Some(first);
        while let Some(id) = cursor {
            let Some(node) = self.get(id) else {
                break;
            };
            let (cascade, parallel) = (node.cascade, node.parallel);
            if let Some(c) = cascade {
                freed += self.free_chain(c);
            }
            if self.release(id) {
                freed += 1;
            }
            cursor = parallel;
        }
        freed
    }

    fn release(&mut self, id: OpId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.op.take().is_none() {
            return false;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        true
    }
}
