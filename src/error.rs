use crate::dsp::envelope::EgState;
use crate::dsp::operator::OpId;
use crate::dsp::sound::SoundId;
use crate::token::Span;
use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use std::fmt;

#[derive(Debug)]
pub enum SynthError {
    Mml(MmlError),
    Envelope(EnvelopeError),
    Operator(OperatorError),
    Preset(PresetError),
    UnknownSound(SoundId),
    InvalidConfig(String),
}

/// Envelope parameters that failed validation. The other states were still
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    InvalidParams { failed: Vec<EgState> },
}

impl EnvelopeError {
    /// Number of states that failed validation.
    pub fn count(&self) -> usize {
        match self {
            EnvelopeError::InvalidParams { failed } => failed.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    UnknownOperator(OpId),
    /// The operator already has a parent in the tree.
    AlreadyLinked(OpId),
    /// Linking `subop` under `op` would close a loop.
    Cycle { op: OpId, subop: OpId },
    Envelope(EnvelopeError),
}

#[derive(Debug)]
pub enum PresetError {
    Json(serde_json::Error),
    Build { preset: String, source: OperatorError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmlErrorKind {
    IllegalCharacter(char),
    InvalidNoteLength,
    InvalidRestLength,
    InvalidTempo,
    InvalidLength,
    InvalidOctave,
    InvalidVolume,
    InvalidTone,
    InvalidChord,
    UnterminatedChord,
    InvalidTuplet,
    NestedTuplet,
    TooManyTupletNotes,
    TooFewTupletNotes,
}

/// A malformed MML token. `span` covers the offending token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmlError {
    pub kind: MmlErrorKind,
    pub span: Span,
}

impl MmlErrorKind {
    /// Negative status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            MmlErrorKind::IllegalCharacter(_) => -1,
            MmlErrorKind::InvalidNoteLength => -2,
            MmlErrorKind::InvalidRestLength => -3,
            MmlErrorKind::InvalidTempo => -4,
            MmlErrorKind::InvalidLength => -5,
            MmlErrorKind::InvalidOctave => -6,
            MmlErrorKind::InvalidVolume => -7,
            MmlErrorKind::InvalidTone => -8,
            MmlErrorKind::InvalidChord => -9,
            MmlErrorKind::UnterminatedChord => -10,
            MmlErrorKind::InvalidTuplet => -11,
            MmlErrorKind::NestedTuplet => -12,
            MmlErrorKind::TooManyTupletNotes => -13,
            MmlErrorKind::TooFewTupletNotes => -14,
        }
    }

    fn hint(&self) -> &'static str {
        match self {
            MmlErrorKind::IllegalCharacter(_) => "not an MML command",
            MmlErrorKind::InvalidNoteLength | MmlErrorKind::InvalidRestLength => {
                "length must be 0, 1, 2, 4, 8, 16, 32 or 64 with at most four dots"
            }
            MmlErrorKind::InvalidTempo => "expected a tempo greater than zero",
            MmlErrorKind::InvalidLength => "expected 0, 1, 2, 4, 8, 16, 32 or 64",
            MmlErrorKind::InvalidOctave => "expected an octave number",
            MmlErrorKind::InvalidVolume => "expected a volume from 0 to 100",
            MmlErrorKind::InvalidTone => "expected a tone number",
            MmlErrorKind::InvalidChord => "only notes and octave changes may appear in a chord",
            MmlErrorKind::UnterminatedChord => "chord opened here is never closed",
            MmlErrorKind::InvalidTuplet => "tuplet must be closed and contain at least one note",
            MmlErrorKind::NestedTuplet => "tuplets cannot be nested",
            MmlErrorKind::TooManyTupletNotes => "more notes than the tuplet was counted with",
            MmlErrorKind::TooFewTupletNotes => "fewer notes than the tuplet was counted with",
        }
    }
}

impl MmlError {
    pub fn new(kind: MmlErrorKind, span: Span) -> Self {
        MmlError { kind, span }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Render a plain-text diagnostic pointing at the offending token.
    pub fn report(&self, name: &str, source: &str) -> String {
        let start = self.span.start.min(source.len());
        let end = self.span.end.clamp(start, source.len());
        let config = Config::default()
            .with_color(false)
            .with_index_type(IndexType::Byte);

        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, (name, start..end))
            .with_config(config)
            .with_code(self.code())
            .with_message(self.kind.to_string())
            .with_label(Label::new((name, start..end)).with_message(self.kind.hint()))
            .finish()
            .write((name, Source::from(source)), &mut out);

        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => format!("{name}: {self}"),
        }
    }
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::Mml(e) => write!(f, "MML error: {e}"),
            SynthError::Envelope(e) => write!(f, "Envelope error: {e}"),
            SynthError::Operator(e) => write!(f, "Operator error: {e}"),
            SynthError::Preset(e) => write!(f, "Preset error: {e}"),
            SynthError::UnknownSound(id) => write!(f, "Unknown sound {id:?}"),
            SynthError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for SynthError {}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::InvalidParams { failed } => {
                write!(f, "{} invalid envelope state(s): {failed:?}", failed.len())
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorError::UnknownOperator(id) => write!(f, "Unknown operator {id:?}"),
            OperatorError::AlreadyLinked(id) => write!(f, "Operator {id:?} is already linked"),
            OperatorError::Cycle { op, subop } => {
                write!(f, "Linking {subop:?} under {op:?} would create a cycle")
            }
            OperatorError::Envelope(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OperatorError {}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::Json(e) => write!(f, "Invalid preset JSON: {e}"),
            PresetError::Build { preset, source } => write!(f, "Cannot build preset '{preset}': {source}"),
        }
    }
}

impl std::error::Error for PresetError {}

impl fmt::Display for MmlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmlErrorKind::IllegalCharacter(ch) => write!(f, "Unexpected char '{ch}'"),
            MmlErrorKind::InvalidNoteLength => write!(f, "Invalid note length"),
            MmlErrorKind::InvalidRestLength => write!(f, "Invalid rest length"),
            MmlErrorKind::InvalidTempo => write!(f, "Invalid tempo"),
            MmlErrorKind::InvalidLength => write!(f, "Invalid default length"),
            MmlErrorKind::InvalidOctave => write!(f, "Invalid octave"),
            MmlErrorKind::InvalidVolume => write!(f, "Invalid volume"),
            MmlErrorKind::InvalidTone => write!(f, "Invalid tone"),
            MmlErrorKind::InvalidChord => write!(f, "Invalid chord"),
            MmlErrorKind::UnterminatedChord => write!(f, "Unterminated chord"),
            MmlErrorKind::InvalidTuplet => write!(f, "Invalid tuplet"),
            MmlErrorKind::NestedTuplet => write!(f, "Nested tuplet"),
            MmlErrorKind::TooManyTupletNotes => write!(f, "Too many notes in tuplet"),
            MmlErrorKind::TooFewTupletNotes => write!(f, "Too few notes in tuplet"),
        }
    }
}

impl fmt::Display for MmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at pos {}", self.kind, self.span.start)
    }
}

impl std::error::Error for MmlError {}

impl From<MmlError> for SynthError {
    fn from(e: MmlError) -> Self {
        SynthError::Mml(e)
    }
}

impl From<EnvelopeError> for SynthError {
    fn from(e: EnvelopeError) -> Self {
        SynthError::Envelope(e)
    }
}

impl From<OperatorError> for SynthError {
    fn from(e: OperatorError) -> Self {
        SynthError::Operator(e)
    }
}

impl From<PresetError> for SynthError {
    fn from(e: PresetError) -> Self {
        SynthError::Preset(e)
    }
}

impl From<EnvelopeError> for OperatorError {
    fn from(e: EnvelopeError) -> Self {
        OperatorError::Envelope(e)
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(e: serde_json::Error) -> Self {
        PresetError::Json(e)
    }
}
