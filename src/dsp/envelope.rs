//! Envelope generator: a six-state, fixed-point level/time state machine.
//!
//! Each state holds a starting level, a length in samples and the delta to
//! the level the next state starts from. `operate()` is called once per
//! output sample and interpolates linearly inside the current state.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Full-scale envelope level (1.0 in fixed point).
pub const MAX_EG_LEVEL: i32 = i16::MAX as i32;

/// Envelope states, in the order the generator walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EgState {
    Attack,
    DecayBreak,
    Decay,
    Sustain,
    Release,
    /// Idle. Never advances on its own.
    Released,
}

impl EgState {
    pub const ALL: [EgState; 6] = [
        EgState::Attack,
        EgState::DecayBreak,
        EgState::Decay,
        EgState::Sustain,
        EgState::Release,
        EgState::Released,
    ];

    /// States that carry a configurable target level.
    pub const ACTIVE: [EgState; 5] = [
        EgState::Attack,
        EgState::DecayBreak,
        EgState::Decay,
        EgState::Sustain,
        EgState::Release,
    ];

    fn index(self) -> usize {
        match self {
            EgState::Attack => 0,
            EgState::DecayBreak => 1,
            EgState::Decay => 2,
            EgState::Sustain => 3,
            EgState::Release => 4,
            EgState::Released => 5,
        }
    }

    /// The following state. RELEASED is terminal.
    pub fn next(self) -> EgState {
        match self {
            EgState::Attack => EgState::DecayBreak,
            EgState::DecayBreak => EgState::Decay,
            EgState::Decay => EgState::Sustain,
            EgState::Sustain => EgState::Release,
            EgState::Release | EgState::Released => EgState::Released,
        }
    }
}

/// Precomputed parameters of one envelope state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgParam {
    /// Level at the first sample of the state.
    pub initval: i32,
    /// Length of the state in samples. Zero skips the state.
    pub period: i32,
    /// Difference between the next state's level and `initval`.
    pub diff2next: i32,
}

/// Per-state parameter table, indexed by [`EgState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgParams([EgParam; 6]);

impl Index<EgState> for EgParams {
    type Output = EgParam;

    fn index(&self, state: EgState) -> &EgParam {
        &self.0[state.index()]
    }
}

impl IndexMut<EgState> for EgParams {
    fn index_mut(&mut self, state: EgState) -> &mut EgParam {
        &mut self.0[state.index()]
    }
}

/// Target level and duration of one envelope state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgLevel {
    /// Level reached at the end of the state, nominally [0, 1].
    pub level: f32,
    /// Duration of the state in milliseconds.
    pub period_ms: i32,
}

impl EgLevel {
    pub const fn new(level: f32, period_ms: i32) -> Self {
        EgLevel { level, period_ms }
    }
}

/// Levels for every configurable state of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgLevels {
    pub attack: EgLevel,
    pub decay_break: EgLevel,
    pub decay: EgLevel,
    pub sustain: EgLevel,
    /// The release target is also the level the envelope rests at.
    pub release: EgLevel,
}

impl EgLevels {
    pub fn get(&self, state: EgState) -> Option<&EgLevel> {
        match state {
            EgState::Attack => Some(&self.attack),
            EgState::DecayBreak => Some(&self.decay_break),
            EgState::Decay => Some(&self.decay),
            EgState::Sustain => Some(&self.sustain),
            EgState::Release => Some(&self.release),
            EgState::Released => None,
        }
    }

    /// The level a state starts from: the previous state's target.
    /// Attack starts from the resting (release) level.
    fn starting_level(&self, state: EgState) -> &EgLevel {
        match state {
            EgState::Attack | EgState::Released => &self.release,
            EgState::DecayBreak => &self.attack,
            EgState::Decay => &self.decay_break,
            EgState::Sustain => &self.decay,
            EgState::Release => &self.sustain,
        }
    }
}

impl Default for EgLevels {
    fn default() -> Self {
        EgLevels {
            attack: EgLevel::new(1.0, 10),
            decay_break: EgLevel::new(0.6, 100),
            decay: EgLevel::new(0.3, 200),
            sustain: EgLevel::new(0.3, 300),
            release: EgLevel::new(0.0, 100),
        }
    }
}

fn scale_level(level: f32) -> i32 {
    (MAX_EG_LEVEL as f32 * level) as i32
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Envelope generator state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeGenerator {
    state: EgState,
    state_counter: i32,
    params: EgParams,
}

impl EnvelopeGenerator {
    /// A zeroed generator resting in RELEASED at full level.
    pub fn new() -> Self {
        let mut params = EgParams::default();
        params[EgState::Released].initval = MAX_EG_LEVEL;
        EnvelopeGenerator {
            state: EgState::Released,
            state_counter: 0,
            params,
        }
    }

    pub fn state(&self) -> EgState {
        self.state
    }

    pub fn state_counter(&self) -> i32 {
        self.state_counter
    }

    pub fn param(&self, state: EgState) -> &EgParam {
        &self.params[state]
    }

    pub fn params(&self) -> &EgParams {
        &self.params
    }

    /// Install levels for `sample_rate`.
    ///
    /// Every state is written even when another one fails validation; the
    /// error lists the states whose parameters are out of range.
    pub fn set_param(&mut self, sample_rate: u32, levels: &EgLevels) -> Result<(), EnvelopeError> {
        let mut failed = Vec::new();

        for state in EgState::ACTIVE {
            let Some(target) = levels.get(state) else {
                continue;
            };
            let initval = scale_level(levels.starting_level(state).level);
            let period = clamp_i32(sample_rate as i64 * target.period_ms as i64 / 1000);

            let param = &mut self.params[state];
            param.initval = initval;
            param.period = period;
            param.diff2next = clamp_i32(scale_level(target.level) as i64 - initval as i64);

            if !(-MAX_EG_LEVEL..=MAX_EG_LEVEL).contains(&initval) || period < 0 {
                failed.push(state);
            }
        }

        self.params[EgState::Released].initval = scale_level(levels.release.level);

        if failed.is_empty() {
            Ok(())
        } else {
            Err(EnvelopeError::InvalidParams { failed })
        }
    }

    /// Restart from the attack state.
    pub fn start(&mut self) {
        self.state = EgState::Attack;
        self.state_counter = 0;
    }

    /// Jump to the idle state.
    pub fn stop(&mut self) {
        self.state = EgState::Released;
        self.state_counter = 0;
    }

    /// Produce the level for the next sample.
    pub fn operate(&mut self) -> i32 {
        if self.state == EgState::Released {
            return self.params[EgState::Released].initval;
        }

        let param = self.params[self.state];
        if self.state_counter >= param.period {
            self.state_counter = 0;
            self.state = self.next_active_state(self.state);
            return self.params[self.state].initval;
        }

        let step = param.diff2next as i64 * self.state_counter as i64 / param.period as i64;
        self.state_counter += 1;
        clamp_i32(param.initval as i64 + step)
    }

    fn next_active_state(&self, from: EgState) -> EgState {
        let mut state = from.next();
        while state != EgState::Released && self.params[state].period == 0 {
            state = state.next();
        }
        state
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
