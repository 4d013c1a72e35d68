//! Sounds: operator trees mixed into a PCM stream.
//!
//! Each sound plays one operator tree at one frequency. [`FmSynth::render`]
//! sums every sound into interleaved 16-bit frames and calls a
//! [`TickHandler`] once per frame so a sequencer can retune sounds between
//! samples.

use crate::error::SynthError;

use super::operator::{OpId, OperatorGraph};

/// Handle to a sound inside an [`FmSynth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId(usize);

#[derive(Debug, Clone)]
struct Sound {
    operator: Option<OpId>,
    phase_time: i32,
    max_phase_time: i32,
    /// Fixed point, `i16::MAX` = 1.0.
    volume: i32,
}

/// Called once per rendered frame.
pub trait TickHandler {
    fn on_tick(&mut self, synth: &mut FmSynth);
}

impl TickHandler for () {
    fn on_tick(&mut self, _synth: &mut FmSynth) {}
}

/// A set of sounds sharing one operator graph.
#[derive(Debug, Clone)]
pub struct FmSynth {
    graph: OperatorGraph,
    sounds: Vec<Sound>,
}

impl FmSynth {
    pub fn new(sample_rate: u32) -> Self {
        FmSynth {
            graph: OperatorGraph::new(sample_rate),
            sounds: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn graph(&self) -> &OperatorGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut OperatorGraph {
        &mut self.graph
    }

    /// Add a silent sound with no operator. Sounds render in insertion order.
    pub fn add_sound(&mut self) -> SoundId {
        self.sounds.push(Sound {
            operator: None,
            phase_time: 0,
            max_phase_time: 0,
            volume: 0,
        });
        SoundId(self.sounds.len() - 1)
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    fn sound_mut(&mut self, id: SoundId) -> Result<&mut Sound, SynthError> {
        self.sounds.get_mut(id.0).ok_or(SynthError::UnknownSound(id))
    }

    /// Operator tree currently attached to `id`.
    pub fn operator(&self, id: SoundId) -> Option<OpId> {
        self.sounds.get(id.0).and_then(|s| s.operator)
    }

    pub fn set_operator(&mut self, id: SoundId, op: OpId) -> Result<(), SynthError> {
        if !self.graph.contains(op) {
            return Err(crate::error::OperatorError::UnknownOperator(op).into());
        }
        self.sound_mut(id)?.operator = Some(op);
        Ok(())
    }

    /// Retune `id` to `freq` Hz and restart its envelopes.
    pub fn set_soundfreq(&mut self, id: SoundId, freq: f32) -> Result<(), SynthError> {
        let sample_rate = self.graph.sample_rate();
        let sound = self.sound_mut(id)?;
        sound.phase_time = 0;
        sound.max_phase_time = if freq > 0.0 {
            (sample_rate as f32 / freq) as i32
        } else {
            0
        };
        if let Some(op) = sound.operator {
            self.graph.set_soundfreq(op, freq)?;
            self.graph.start(op);
        }
        Ok(())
    }

    /// Volume in [0, 1]. Out-of-range values are clamped.
    pub fn set_volume(&mut self, id: SoundId, volume: f32) -> Result<(), SynthError> {
        self.sound_mut(id)?.volume = (volume.clamp(0.0, 1.0) * i16::MAX as f32) as i32;
        Ok(())
    }

    pub fn volume(&self, id: SoundId) -> Option<f32> {
        self.sounds.get(id.0).map(|s| s.volume as f32 / i16::MAX as f32)
    }

    /// Stop the envelopes of `id`'s operator tree.
    pub fn stop(&mut self, id: SoundId) -> Result<(), SynthError> {
        if let Some(op) = self.sound_mut(id)?.operator {
            self.graph.stop(op);
        }
        Ok(())
    }

    /// One mono sample: every sound advanced by one step.
    fn next_sample(&mut self) -> i16 {
        let mut mix: i64 = 0;
        for sound in &mut self.sounds {
            let Some(op) = sound.operator else {
                continue;
            };
            self.graph.update_feedback(op);
            let out = self.graph.operate(op, sound.phase_time) as i64;
            mix += out * sound.volume as i64 / i16::MAX as i64;

            sound.phase_time += 1;
            if sound.phase_time >= sound.max_phase_time {
                sound.phase_time = 0;
            }
        }
        mix.clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }

    /// Fill `out` with interleaved frames of `channels` identical samples.
    /// A trailing partial frame is left untouched. Returns the number of
    /// samples written.
    pub fn render<H: TickHandler>(&mut self, out: &mut [i16], channels: usize, handler: &mut H) -> usize {
        let channels = channels.max(1);
        let mut written = 0;
        for frame in out.chunks_exact_mut(channels) {
            frame.fill(self.next_sample());
            written += channels;
            handler.on_tick(self);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::{EgLevel, EgLevels};
    use crate::dsp::oscillator::Waveform;

    fn held_levels() -> EgLevels {
        EgLevels {
            attack: EgLevel::new(1.0, 0),
            decay_break: EgLevel::new(1.0, 0),
            decay: EgLevel::new(1.0, 0),
            sustain: EgLevel::new(1.0, 10_000),
            release: EgLevel::new(0.0, 0),
        }
    }

    fn synth_with_sound(waveform: Waveform) -> (FmSynth, SoundId) {
        let mut synth = FmSynth::new(8000);
        let op = synth.graph_mut().create();
        synth.graph_mut().select_opfunc(op, waveform).unwrap();
        synth.graph_mut().set_envelope(op, &held_levels()).unwrap();
        let sound = synth.add_sound();
        synth.set_operator(sound, op).unwrap();
        (synth, sound)
    }

    struct Counter(usize);

    impl TickHandler for Counter {
        fn on_tick(&mut self, _synth: &mut FmSynth) {
            self.0 += 1;
        }
    }

    #[test]
    fn silent_until_volume_set() {
        let (mut synth, sound) = synth_with_sound(Waveform::Square);
        synth.set_soundfreq(sound, 100.0).unwrap();
        let mut buf = vec![0i16; 256];
        synth.render(&mut buf, 2, &mut ());
        assert!(buf.iter().all(|&s| s == 0));

        synth.set_volume(sound, 0.5).unwrap();
        synth.render(&mut buf, 2, &mut ());
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn channels_are_duplicated() {
        let (mut synth, sound) = synth_with_sound(Waveform::Sine);
        synth.set_soundfreq(sound, 440.0).unwrap();
        synth.set_volume(sound, 1.0).unwrap();

        let mut buf = vec![0i16; 300];
        let written = synth.render(&mut buf, 3, &mut ());
        assert_eq!(written, 300);
        for frame in buf.chunks(3) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[1], frame[2]);
        }
    }

    #[test]
    fn handler_ticks_once_per_frame() {
        let (mut synth, _) = synth_with_sound(Waveform::Sine);
        let mut counter = Counter(0);
        let mut buf = vec![0i16; 101];
        let written = synth.render(&mut buf, 2, &mut counter);
        assert_eq!(written, 100);
        assert_eq!(counter.0, 50);
    }

    #[test]
    fn phase_resets_every_period() {
        let (mut synth, sound) = synth_with_sound(Waveform::Sawtooth);
        // 8000 / 100 = 80 samples per period.
        synth.set_soundfreq(sound, 100.0).unwrap();
        synth.set_volume(sound, 1.0).unwrap();

        let mut buf = vec![0i16; 240];
        synth.render(&mut buf, 1, &mut ());
        assert_eq!(buf[0], buf[80]);
        assert_eq!(buf[80], buf[160]);
    }

    #[test]
    fn mixing_clamps_to_i16() {
        let mut synth = FmSynth::new(8000);
        for _ in 0..4 {
            let op = synth.graph_mut().create();
            synth.graph_mut().select_opfunc(op, Waveform::Square).unwrap();
            synth.graph_mut().set_envelope(op, &held_levels()).unwrap();
            let sound = synth.add_sound();
            synth.set_operator(sound, op).unwrap();
            synth.set_soundfreq(sound, 50.0).unwrap();
            synth.set_volume(sound, 1.0).unwrap();
        }
        let mut buf = vec![0i16; 10];
        synth.render(&mut buf, 1, &mut ());
        assert!(buf[1..].iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let mut synth = FmSynth::new(8000);
        let mut other = FmSynth::new(8000);
        let foreign = other.add_sound();
        assert!(matches!(synth.set_volume(foreign, 0.5), Err(SynthError::UnknownSound(_))));

        let sound = synth.add_sound();
        let stale = {
            let id = synth.graph_mut().create();
            synth.graph_mut().delete_ops(id).unwrap();
            id
        };
        assert!(matches!(synth.set_operator(sound, stale), Err(SynthError::Operator(_))));
    }
}
