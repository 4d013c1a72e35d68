use serde::{Deserialize, Serialize};

/// Notes beyond this count inside one chord are dropped.
pub const MAX_CHORD_NOTES: usize = 5;

/// Byte range into the MML source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kind of a successfully parsed token. `code()` gives the positive status
/// value; end of input is 0 and errors are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
    Note,
    Rest,
    Tempo,
    Length,
    Octave,
    TupletStart,
    TupletEnd,
    Volume,
    Tone,
    Chord,
}

impl TokenKind {
    pub const EOF_CODE: i32 = 0;

    pub fn code(self) -> i32 {
        match self {
            TokenKind::Note => 1,
            TokenKind::Rest => 2,
            TokenKind::Tempo => 3,
            TokenKind::Length => 4,
            TokenKind::Octave => 5,
            TokenKind::TupletStart => 6,
            TokenKind::TupletEnd => 7,
            TokenKind::Volume => 8,
            TokenKind::Tone => 9,
            TokenKind::Chord => 10,
        }
    }
}

/// One parsed MML command.
///
/// Note indices are `octave * 12 + semitone` with C = 0, so O4A is 57.
/// Durations are in ticks of the parser's tick rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MmlEvent {
    Note { note: i32, ticks: u32 },
    Rest { ticks: u32 },
    Chord { notes: Vec<i32>, ticks: u32 },
    Tempo { bpm: u32 },
    /// New default note length.
    Length { length: u32 },
    Octave { octave: i32 },
    /// 0..=100
    Volume { volume: u32 },
    Tone { program: u32 },
    /// Total duration shared by the notes of the tuplet.
    TupletStart { ticks: u32 },
    TupletEnd,
}

impl MmlEvent {
    pub fn kind(&self) -> TokenKind {
        match self {
            MmlEvent::Note { .. } => TokenKind::Note,
            MmlEvent::Rest { .. } => TokenKind::Rest,
            MmlEvent::Chord { .. } => TokenKind::Chord,
            MmlEvent::Tempo { .. } => TokenKind::Tempo,
            MmlEvent::Length { .. } => TokenKind::Length,
            MmlEvent::Octave { .. } => TokenKind::Octave,
            MmlEvent::Volume { .. } => TokenKind::Volume,
            MmlEvent::Tone { .. } => TokenKind::Tone,
            MmlEvent::TupletStart { .. } => TokenKind::TupletStart,
            MmlEvent::TupletEnd => TokenKind::TupletEnd,
        }
    }

    /// Time this event occupies on the timeline. A tuplet start only
    /// announces the length of the notes that follow, so it takes none.
    pub fn ticks(&self) -> Option<u32> {
        match self {
            MmlEvent::Note { ticks, .. }
            | MmlEvent::Rest { ticks }
            | MmlEvent::Chord { ticks, .. } => Some(*ticks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Spanned {
    #[serde(flatten)]
    pub event: MmlEvent,
    pub span: Span,
}
