//! MML player: drives FM sounds from MML parts, one tick per sample.
//!
//! A score holds one or more parts separated by `;`. Every part gets its own
//! parser state and its own set of sounds, so a melody and an accompaniment
//! play side by side. The player is a [`TickHandler`]: the synth calls it
//! after each rendered frame and it pulls the next command from a part when
//! the current one has run out.

use log::{Level, debug, info, log_enabled, warn};
use serde::{Deserialize, Serialize};

use crate::dsp::algorithm::Algorithm;
use crate::dsp::operator::OpId;
use crate::dsp::sound::{FmSynth, SoundId, TickHandler};
use crate::error::{MmlError, SynthError};
use crate::parser::{MmlConfig, MmlState, VALID_LENGTHS, parse_all};
use crate::preset::PresetDescriptor;
use crate::scale::{DEFAULT_TUNING, note_frequency, note_name};
use crate::token::{MAX_CHORD_NOTES, MmlEvent, Span, Spanned};

/// Frames rendered per block by [`render_score`].
const BLOCK_FRAMES: usize = 1024;

/// Settings for rendering a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub algorithm: Algorithm,
    /// Replaces `algorithm` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<PresetDescriptor>,
    pub tempo: u32,
    pub octave: i32,
    pub length: u32,
    /// Volume of one sounding note, in [0, 1].
    pub carrier_level: f32,
    /// Master volume, in [0, 1].
    pub volume: f32,
    /// Frequency of O4A in Hz.
    pub tuning: f32,
    /// Sounds per part. Chord notes beyond this are not played.
    pub chord_voices: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            sample_rate: 48000,
            channels: 2,
            algorithm: Algorithm::default(),
            preset: None,
            tempo: 120,
            octave: 4,
            length: 4,
            carrier_level: 0.25,
            volume: 1.0,
            tuning: DEFAULT_TUNING,
            chord_voices: MAX_CHORD_NOTES,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), SynthError> {
        let invalid = |msg: &str| Err(SynthError::InvalidConfig(msg.to_string()));
        if self.sample_rate == 0 {
            return invalid("sample rate must be positive");
        }
        if self.channels == 0 {
            return invalid("at least one channel is required");
        }
        if self.tempo == 0 {
            return invalid("tempo must be positive");
        }
        if !VALID_LENGTHS.contains(&self.length) {
            return invalid("default length must be 0, 1, 2, 4, 8, 16, 32 or 64");
        }
        if !(0.0..=1.0).contains(&self.carrier_level) || !(0.0..=1.0).contains(&self.volume) {
            return invalid("levels must lie in [0, 1]");
        }
        if self.tuning.is_nan() || self.tuning <= 0.0 {
            return invalid("tuning pitch must be positive");
        }
        if self.chord_voices == 0 {
            return invalid("each part needs at least one voice");
        }
        Ok(())
    }

    /// Parser settings for this player. One tick is one sample.
    pub fn mml_config(&self) -> MmlConfig {
        MmlConfig {
            tick_rate: self.sample_rate,
            tempo: self.tempo,
            octave: self.octave,
            length: self.length,
        }
    }

    fn build_operator(&self, synth: &mut FmSynth) -> Result<OpId, SynthError> {
        Ok(match &self.preset {
            Some(preset) => preset.build(synth.graph_mut())?,
            None => self.algorithm.build(synth.graph_mut())?,
        })
    }
}

/// A part of a score and its byte offset in the full source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorePart<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Split a score on `;`, skipping blank parts.
pub fn split_parts(source: &str) -> Vec<ScorePart<'_>> {
    let mut parts = Vec::new();
    let mut offset = 0;
    for text in source.split(';') {
        if !text.trim().is_empty() {
            parts.push(ScorePart { offset, text });
        }
        offset += text.len() + 1;
    }
    parts
}

/// Events of one part, with spans into the full source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartEvents {
    pub part: usize,
    pub events: Vec<Spanned>,
}

/// Parse every part of a score. Error spans point into `source`.
pub fn parse_parts(source: &str, config: &MmlConfig) -> Result<Vec<PartEvents>, MmlError> {
    split_parts(source)
        .into_iter()
        .enumerate()
        .map(|(part, p)| {
            let mut events = parse_all(p.text, config).map_err(|e| shift_error(e, p.offset))?;
            for event in &mut events {
                event.span = shift_span(event.span, p.offset);
            }
            Ok(PartEvents { part, events })
        })
        .collect()
}

fn shift_span(span: Span, offset: usize) -> Span {
    Span::new(span.start + offset, span.end + offset)
}

fn shift_error(err: MmlError, offset: usize) -> MmlError {
    MmlError::new(err.kind, shift_span(err.span, offset))
}

struct Part {
    index: usize,
    offset: usize,
    score: String,
    cursor: usize,
    state: MmlState,
    sounds: Vec<SoundId>,
    remaining: u32,
    /// Set by `V` commands, in [0, 1].
    volume: f32,
    finished: bool,
    error: Option<MmlError>,
}

impl Part {
    /// Pull commands until one takes time or the part ends.
    fn advance(&mut self, synth: &mut FmSynth, level: f32, tuning: f32) {
        loop {
            let event = match self.state.next_event(&self.score, &mut self.cursor) {
                Ok(Some(spanned)) => spanned.event,
                Ok(None) => {
                    debug!("part {}: done", self.index);
                    self.finish(synth);
                    return;
                }
                Err(e) => {
                    let e = shift_error(e, self.offset);
                    warn!("part {}: {e}", self.index);
                    self.error = Some(e);
                    self.finish(synth);
                    return;
                }
            };

            if let Err(e) = self.apply(&event, synth, level, tuning) {
                warn!("part {}: {e}", self.index);
                self.finish(synth);
                return;
            }
            match event.ticks() {
                Some(0) => debug!("part {}: {:?} is shorter than one tick, skipped", self.index, event),
                Some(ticks) => {
                    self.remaining = ticks;
                    return;
                }
                None => {}
            }
        }
    }

    fn apply(&mut self, event: &MmlEvent, synth: &mut FmSynth, level: f32, tuning: f32) -> Result<(), SynthError> {
        let level = level * self.volume;
        match event {
            MmlEvent::Note { note, ticks } => {
                debug!("part {}: {} for {ticks} ticks", self.index, note_name(*note));
                self.play(synth, std::slice::from_ref(note), level, tuning)?;
            }
            MmlEvent::Chord { notes, ticks } => {
                if log_enabled!(Level::Debug) {
                    let names: Vec<String> = notes.iter().map(|&n| note_name(n)).collect();
                    debug!("part {}: [{}] for {ticks} ticks", self.index, names.join(" "));
                }
                self.play(synth, notes, level, tuning)?;
            }
            MmlEvent::Rest { ticks } => {
                debug!("part {}: rest for {ticks} ticks", self.index);
                self.silence(synth)?;
            }
            MmlEvent::Volume { volume } => self.volume = *volume as f32 / 100.0,
            MmlEvent::Tone { program } => debug!("part {}: tone @{program} has no effect", self.index),
            _ => {}
        }
        Ok(())
    }

    /// Sound `notes` on the first sounds of the part and mute the rest.
    fn play(&self, synth: &mut FmSynth, notes: &[i32], level: f32, tuning: f32) -> Result<(), SynthError> {
        for (i, &sound) in self.sounds.iter().enumerate() {
            match notes.get(i) {
                Some(&note) => {
                    synth.set_soundfreq(sound, note_frequency(note, tuning))?;
                    synth.set_volume(sound, level)?;
                }
                None => synth.set_volume(sound, 0.0)?,
            }
        }
        Ok(())
    }

    fn silence(&self, synth: &mut FmSynth) -> Result<(), SynthError> {
        for &sound in &self.sounds {
            synth.set_volume(sound, 0.0)?;
        }
        Ok(())
    }

    fn finish(&mut self, synth: &mut FmSynth) {
        self.finished = true;
        self.remaining = 0;
        if let Err(e) = self.silence(synth) {
            warn!("part {}: {e}", self.index);
        }
    }
}

/// Plays the parts of a score on the sounds of an [`FmSynth`].
pub struct MmlPlayer {
    parts: Vec<Part>,
    level: f32,
    tuning: f32,
    elapsed: u64,
    end_tick: Option<u64>,
}

impl MmlPlayer {
    /// Create sounds for every part of `source` in `synth` and queue the
    /// first note of each part.
    pub fn new(synth: &mut FmSynth, source: &str, config: &PlayerConfig) -> Result<Self, SynthError> {
        config.validate()?;
        let mml_config = config.mml_config();

        let mut parts = Vec::new();
        for (index, p) in split_parts(source).into_iter().enumerate() {
            let mut sounds = Vec::with_capacity(config.chord_voices);
            for _ in 0..config.chord_voices {
                let op = config.build_operator(synth)?;
                let sound = synth.add_sound();
                synth.set_operator(sound, op)?;
                sounds.push(sound);
            }
            parts.push(Part {
                index,
                offset: p.offset,
                score: p.text.to_string(),
                cursor: 0,
                state: MmlState::new(&mml_config),
                sounds,
                remaining: 0,
                volume: 1.0,
                finished: false,
                error: None,
            });
        }

        let mut player = MmlPlayer {
            parts,
            level: config.carrier_level * config.volume,
            tuning: config.tuning,
            elapsed: 0,
            end_tick: None,
        };
        for part in &mut player.parts {
            part.advance(synth, player.level, player.tuning);
        }
        player.check_end();
        Ok(player)
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn is_finished(&self) -> bool {
        self.parts.iter().all(|p| p.finished)
    }

    /// Ticks handled so far.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Tick at which the last part finished.
    pub fn end_tick(&self) -> Option<u64> {
        self.end_tick
    }

    /// Parse errors that stopped a part, with the part index.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &MmlError)> {
        self.parts
            .iter()
            .filter_map(|p| p.error.as_ref().map(|e| (p.index, e)))
    }

    fn check_end(&mut self) {
        if self.end_tick.is_none() && self.is_finished() {
            self.end_tick = Some(self.elapsed);
        }
    }
}

impl TickHandler for MmlPlayer {
    fn on_tick(&mut self, synth: &mut FmSynth) {
        self.elapsed += 1;
        for part in &mut self.parts {
            if part.finished {
                continue;
            }
            part.remaining = part.remaining.saturating_sub(1);
            if part.remaining == 0 {
                part.advance(synth, self.level, self.tuning);
            }
        }
        self.check_end();
    }
}

/// Render a whole score to interleaved 16-bit PCM.
///
/// Every part is parsed up front so a syntax error is reported before any
/// audio is produced.
pub fn render_score(source: &str, config: &PlayerConfig) -> Result<Vec<i16>, SynthError> {
    config.validate()?;
    parse_parts(source, &config.mml_config())?;

    let channels = config.channels as usize;
    let mut synth = FmSynth::new(config.sample_rate);
    let mut player = MmlPlayer::new(&mut synth, source, config)?;

    let mut out = Vec::new();
    let mut block = vec![0i16; BLOCK_FRAMES * channels];
    while !player.is_finished() {
        let written = synth.render(&mut block, channels, &mut player);
        out.extend_from_slice(&block[..written]);
    }
    if let Some(end) = player.end_tick() {
        out.truncate(end as usize * channels);
    }

    info!(
        "rendered {} frames from {} part(s) at {} Hz",
        out.len() / channels,
        player.part_count(),
        config.sample_rate
    );
    Ok(out)
}
