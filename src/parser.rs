//! Music Macro Language parser.
//!
//! [`parse_mml`] reads one command at a time from a score, so a player can
//! interleave parsing with playback. The parser state carries tempo, octave,
//! default length and any open tuplet between calls.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{MmlError, MmlErrorKind};
use crate::token::{MAX_CHORD_NOTES, MmlEvent, Span, Spanned};

/// Accepted note lengths. 0 is a double whole note.
pub const VALID_LENGTHS: [u32; 8] = [0, 1, 2, 4, 8, 16, 32, 64];
const MAX_DOTS: u32 = 4;
/// Commands that take a slot in a tuplet.
const TUPLET_NOTES: &[u8] = b"CDEFGABR";

/// Initial parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MmlConfig {
    /// Ticks per second. 1000 gives durations in milliseconds.
    pub tick_rate: u32,
    pub tempo: u32,
    pub octave: i32,
    /// Default note length (4 = quarter note).
    pub length: u32,
}

impl Default for MmlConfig {
    fn default() -> Self {
        MmlConfig {
            tick_rate: 1000,
            tempo: 120,
            octave: 4,
            length: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tuplet {
    notes: u32,
    total: u32,
    played: u32,
}

impl Tuplet {
    fn is_full(&self) -> bool {
        self.played >= self.notes
    }

    /// Even share of the total; the last note takes the remainder.
    fn next_length(&mut self) -> u32 {
        let each = self.total / self.notes;
        self.played += 1;
        if self.played == self.notes {
            self.total - each * (self.notes - 1)
        } else {
            each
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LengthState {
    Idle,
    Numbered,
    Plus,
}

/// Parser state carried between [`parse_mml`] calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmlState {
    tick_rate: u32,
    tempo: u32,
    octave: i32,
    length: u32,
    tuplet: Option<Tuplet>,
}

/// Parse the next command of `score` starting at byte offset `cursor`.
///
/// On success the cursor moves past the command. At end of input it stays at
/// the end and `Ok(None)` is returned. On error it is left at the first byte
/// of the offending command.
pub fn parse_mml(
    state: &mut MmlState,
    score: &str,
    cursor: &mut usize,
) -> Result<Option<MmlEvent>, MmlError> {
    Ok(state.next_event(score, cursor)?.map(|s| s.event))
}

/// Parse a whole score, stopping at the first error.
pub fn parse_all(score: &str, config: &MmlConfig) -> Result<Vec<Spanned>, MmlError> {
    MmlParser::new(score, config).collect()
}

impl MmlState {
    pub fn new(config: &MmlConfig) -> Self {
        MmlState {
            tick_rate: config.tick_rate,
            tempo: config.tempo,
            octave: config.octave,
            length: config.length,
            tuplet: None,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn default_length(&self) -> u32 {
        self.length
    }

    pub fn in_tuplet(&self) -> bool {
        self.tuplet.is_some()
    }

    /// Like [`parse_mml`], keeping the source span of the command.
    pub fn next_event(&mut self, score: &str, cursor: &mut usize) -> Result<Option<Spanned>, MmlError> {
        let mut sc = Scanner {
            src: score.as_bytes(),
            pos: (*cursor).min(score.len()),
        };
        sc.skip_space();
        let start = sc.pos;

        let Some(code) = sc.next_code() else {
            *cursor = start;
            return Ok(None);
        };

        let result = if let Some(semitone) = semitone(code) {
            self.note(semitone, &mut sc)
        } else {
            match code {
                b'R' => self.rest(&mut sc),
                b'T' => self.tempo_change(&mut sc),
                b'L' => self.length_change(&mut sc),
                b'O' | b'<' | b'>' => self.octave_change(code, &mut sc).map(|octave| MmlEvent::Octave { octave }),
                b'V' => volume(&mut sc),
                b'@' => tone(&mut sc),
                b'[' => self.chord(&mut sc),
                b'{' => self.tuplet_start(&mut sc),
                b'}' => self.tuplet_end(&mut sc),
                _ => {
                    let ch = score
                        .get(start..)
                        .and_then(|rest| rest.chars().next())
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    sc.pos = start + ch.len_utf8();
                    Err(MmlErrorKind::IllegalCharacter(ch))
                }
            }
        };

        let span = Span::new(start, sc.pos.max(start + 1).min(score.len()));
        match result {
            Ok(event) => {
                trace!("mml {:?} at {}..{}", event, span.start, span.end);
                *cursor = sc.pos;
                Ok(Some(Spanned { event, span }))
            }
            Err(kind) => {
                *cursor = start;
                Err(MmlError::new(kind, span))
            }
        }
    }

    // ── Commands ────────────────────────────────────────────

    fn note(&mut self, semitone: i32, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        let note = self.note_index(semitone, sc);
        let ticks = self.duration(sc, MmlErrorKind::InvalidNoteLength)?;
        Ok(MmlEvent::Note { note, ticks })
    }

    fn rest(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        let ticks = self.duration(sc, MmlErrorKind::InvalidRestLength)?;
        Ok(MmlEvent::Rest { ticks })
    }

    fn tempo_change(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        match sc.number() {
            Some(bpm) if bpm > 0 => {
                self.tempo = bpm;
                Ok(MmlEvent::Tempo { bpm })
            }
            _ => Err(MmlErrorKind::InvalidTempo),
        }
    }

    fn length_change(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        match sc.number() {
            Some(length) if VALID_LENGTHS.contains(&length) => {
                self.length = length;
                Ok(MmlEvent::Length { length })
            }
            _ => Err(MmlErrorKind::InvalidLength),
        }
    }

    fn octave_change(&mut self, code: u8, sc: &mut Scanner) -> Result<i32, MmlErrorKind> {
        self.octave = match code {
            b'>' => self.octave.saturating_add(1),
            b'<' => self.octave.saturating_sub(1),
            _ => sc
                .number()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or(MmlErrorKind::InvalidOctave)?,
        };
        Ok(self.octave)
    }

    fn chord(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        let mut notes = Vec::with_capacity(MAX_CHORD_NOTES);
        loop {
            let Some(code) = sc.next_code() else {
                return Err(MmlErrorKind::UnterminatedChord);
            };
            if code == b']' {
                break;
            }
            if let Some(semitone) = semitone(code) {
                let note = self.note_index(semitone, sc);
                if notes.len() < MAX_CHORD_NOTES {
                    notes.push(note);
                }
            } else if matches!(code, b'O' | b'<' | b'>') {
                self.octave_change(code, sc)
                    .map_err(|_| MmlErrorKind::InvalidChord)?;
            } else {
                return Err(MmlErrorKind::InvalidChord);
            }
        }
        let ticks = self.duration(sc, MmlErrorKind::InvalidChord)?;
        Ok(MmlEvent::Chord { notes, ticks })
    }

    /// Count the notes up to the closing brace and measure the length
    /// written after it. The cursor itself only moves past `{`.
    fn tuplet_start(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        if self.tuplet.is_some() {
            return Err(MmlErrorKind::NestedTuplet);
        }

        let mut ahead = Scanner { src: sc.src, pos: sc.pos };
        let mut notes = 0u32;
        loop {
            match ahead.next_code() {
                None => return Err(MmlErrorKind::InvalidTuplet),
                Some(b'}') => break,
                Some(b'[') => {
                    if !ahead.skip_past(b']') {
                        return Err(MmlErrorKind::InvalidTuplet);
                    }
                    notes += 1;
                }
                Some(code) if TUPLET_NOTES.contains(&code) => notes += 1,
                Some(_) => {}
            }
        }
        let total = self.read_length(&mut ahead).ok_or(MmlErrorKind::InvalidTuplet)?;
        if notes == 0 {
            return Err(MmlErrorKind::InvalidTuplet);
        }

        self.tuplet = Some(Tuplet {
            notes,
            total,
            played: 0,
        });
        Ok(MmlEvent::TupletStart { ticks: total })
    }

    fn tuplet_end(&mut self, sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
        let Some(tuplet) = self.tuplet.take() else {
            return Err(MmlErrorKind::InvalidTuplet);
        };
        // Measured when the tuplet opened; only skip it here.
        let _ = self.read_length(sc);
        if tuplet.played != tuplet.notes {
            return Err(MmlErrorKind::TooFewTupletNotes);
        }
        Ok(MmlEvent::TupletEnd)
    }

    // ── Lengths ─────────────────────────────────────────────

    fn note_index(&self, semitone: i32, sc: &mut Scanner) -> i32 {
        semitone
            .saturating_add(sc.halfscale())
            .saturating_add(self.octave.saturating_mul(12))
    }

    /// Duration of a note, rest or chord: a share of the open tuplet, or the
    /// length written after the command.
    fn duration(&mut self, sc: &mut Scanner, invalid: MmlErrorKind) -> Result<u32, MmlErrorKind> {
        if let Some(tuplet) = self.tuplet.as_mut() {
            if tuplet.is_full() {
                return Err(MmlErrorKind::TooManyTupletNotes);
            }
            return Ok(tuplet.next_length());
        }
        self.read_length(sc).ok_or(invalid)
    }

    /// `[n][.]*(+n[.]*)*`, summing tied lengths. `None` if any part is invalid.
    fn read_length(&self, sc: &mut Scanner) -> Option<u32> {
        let mut state = LengthState::Idle;
        let mut number = None;
        let mut dots = 0;
        let mut total: u64 = 0;

        loop {
            match state {
                LengthState::Idle => match sc.peek() {
                    Some(b'0'..=b'9') => {
                        number = sc.number();
                        state = LengthState::Numbered;
                    }
                    Some(b'.') => state = LengthState::Numbered,
                    _ => return self.ticks(None, 0),
                },
                LengthState::Numbered => match sc.peek() {
                    Some(b'.') => {
                        dots += 1;
                        sc.bump();
                    }
                    Some(b'+') => {
                        total = total.checked_add(self.ticks(number, dots)? as u64)?;
                        sc.bump();
                        number = None;
                        dots = 0;
                        state = LengthState::Plus;
                    }
                    _ => {
                        total = total.checked_add(self.ticks(number, dots)? as u64)?;
                        return u32::try_from(total).ok();
                    }
                },
                LengthState::Plus => match sc.peek() {
                    Some(b'0'..=b'9') => {
                        number = sc.number();
                        state = LengthState::Numbered;
                    }
                    _ => return None,
                },
            }
        }
    }

    /// `15 * tick_rate * mul / length / tempo`, where `mul` is 16 plus half
    /// of the previous addition for each dot. Length 0 lasts two whole notes.
    fn ticks(&self, number: Option<u32>, dots: u32) -> Option<u32> {
        let length = number.unwrap_or(self.length);
        if !VALID_LENGTHS.contains(&length) || dots > MAX_DOTS || self.tempo == 0 {
            return None;
        }
        let mul: u64 = 16 + (1..=dots).map(|d| 1u64 << (4 - d)).sum::<u64>();
        let scaled = 15 * self.tick_rate as u64 * mul;
        let ticks = match length {
            0 => scaled * 2,
            n => scaled / n as u64,
        } / self.tempo as u64;
        u32::try_from(ticks).ok()
    }
}

fn volume(sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
    let volume = sc.number().unwrap_or(0);
    if volume > 100 {
        return Err(MmlErrorKind::InvalidVolume);
    }
    Ok(MmlEvent::Volume { volume })
}

fn tone(sc: &mut Scanner) -> Result<MmlEvent, MmlErrorKind> {
    let program = sc.number().ok_or(MmlErrorKind::InvalidTone)?;
    Ok(MmlEvent::Tone { program })
}

fn semitone(code: u8) -> Option<i32> {
    match code {
        b'C' => Some(0),
        b'D' => Some(2),
        b'E' => Some(4),
        b'F' => Some(5),
        b'G' => Some(7),
        b'A' => Some(9),
        b'B' => Some(11),
        _ => None,
    }
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Next non-space command byte, upper-cased.
    fn next_code(&mut self) -> Option<u8> {
        self.skip_space();
        let code = self.peek()?;
        self.bump();
        Some(code.to_ascii_uppercase())
    }

    /// Decimal digits, saturating. `None` if there are none.
    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut n: u32 = 0;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            n = n.saturating_mul(10).saturating_add((c - b'0') as u32);
            self.bump();
        }
        (self.pos > start).then_some(n)
    }

    /// Sharps (`+`, `#`) and flats (`-`) following a note letter.
    fn halfscale(&mut self) -> i32 {
        let mut shift = 0;
        loop {
            match self.peek() {
                Some(b'+' | b'#') => shift += 1,
                Some(b'-') => shift -= 1,
                _ => return shift,
            }
            self.bump();
        }
    }

    fn skip_past(&mut self, until: u8) -> bool {
        while let Some(c) = self.peek() {
            self.bump();
            if c == until {
                return true;
            }
        }
        false
    }
}

/// Iterator over the commands of a score. Stops after the first error.
pub struct MmlParser<'a> {
    score: &'a str,
    cursor: usize,
    state: MmlState,
    done: bool,
}

impl<'a> MmlParser<'a> {
    pub fn new(score: &'a str, config: &MmlConfig) -> Self {
        MmlParser {
            score,
            cursor: 0,
            state: MmlState::new(config),
            done: false,
        }
    }

    pub fn state(&self) -> &MmlState {
        &self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Iterator for MmlParser<'_> {
    type Item = Result<Spanned, MmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.state.next_event(self.score, &mut self.cursor) {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn events(score: &str) -> Vec<MmlEvent> {
        parse_all(score, &MmlConfig::default())
            .unwrap()
            .into_iter()
            .map(|s| s.event)
            .collect()
    }

    fn error(score: &str) -> MmlError {
        parse_all(score, &MmlConfig::default()).unwrap_err()
    }

    fn note_ticks(score: &str) -> Vec<u32> {
        events(score).iter().filter_map(|e| e.ticks()).collect()
    }

    #[test]
    fn test_tempo_length_octave_note() {
        assert_eq!(
            events("T120L4O4C"),
            vec![
                MmlEvent::Tempo { bpm: 120 },
                MmlEvent::Length { length: 4 },
                MmlEvent::Octave { octave: 4 },
                MmlEvent::Note { note: 48, ticks: 500 },
            ]
        );
    }

    #[test]
    fn test_parse_mml_codes_and_cursor() {
        let score = "C4 R8";
        let mut state = MmlState::new(&MmlConfig::default());
        let mut cursor = 0;

        let first = parse_mml(&mut state, score, &mut cursor).unwrap().unwrap();
        assert_eq!(first.kind().code(), 1);
        assert_eq!(cursor, 2);

        let second = parse_mml(&mut state, score, &mut cursor).unwrap().unwrap();
        assert_eq!(second, MmlEvent::Rest { ticks: 250 });
        assert_eq!(second.kind(), TokenKind::Rest);
        assert_eq!(cursor, 5);

        assert_eq!(parse_mml(&mut state, score, &mut cursor).unwrap(), None);
        assert_eq!(cursor, 5, "cursor stays at end of input");
        assert_eq!(parse_mml(&mut state, score, &mut cursor).unwrap(), None);
    }

    #[test]
    fn test_sharps_and_flats() {
        let notes: Vec<MmlEvent> = events("C+ D- E# C++ B-");
        let indices: Vec<i32> = notes
            .iter()
            .map(|e| match e {
                MmlEvent::Note { note, .. } => *note,
                other => panic!("Expected note, got {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![49, 49, 53, 50, 58]);
    }

    #[test]
    fn test_lowercase_commands() {
        assert_eq!(
            events("t60 o5 c"),
            vec![
                MmlEvent::Tempo { bpm: 60 },
                MmlEvent::Octave { octave: 5 },
                MmlEvent::Note { note: 60, ticks: 1000 },
            ]
        );
    }

    #[test]
    fn test_lengths_and_dots() {
        assert_eq!(note_ticks("C1 C2 C4 C8 C16 C32 C64"), vec![2000, 1000, 500, 250, 125, 62, 31]);
        assert_eq!(note_ticks("C4. C4.. C4...."), vec![750, 875, 968]);
        assert_eq!(note_ticks("C."), vec![750], "dot applies to the default length");
        assert_eq!(note_ticks("L8 C R"), vec![250, 250]);
    }

    #[test]
    fn test_double_whole_length() {
        assert_eq!(note_ticks("C0 R0 C0."), vec![4000, 4000, 6000]);
        assert_eq!(
            events("L0 C"),
            vec![
                MmlEvent::Length { length: 0 },
                MmlEvent::Note { note: 48, ticks: 4000 },
            ]
        );
    }

    #[test]
    fn test_ties() {
        assert_eq!(note_ticks("C4+8"), vec![750]);
        assert_eq!(note_ticks("C4.+8"), vec![1000], "dots do not carry over a tie");
        assert_eq!(note_ticks("C+4+4"), vec![1000], "first plus is a sharp");
        assert_eq!(note_ticks("R2+2+4"), vec![2500]);
    }

    #[test]
    fn test_tick_rate_scales_durations() {
        let config = MmlConfig {
            tick_rate: 48000,
            ..MmlConfig::default()
        };
        let parsed = parse_all("C4 T60 C8", &config).unwrap();
        let ticks: Vec<u32> = parsed.iter().filter_map(|s| s.event.ticks()).collect();
        assert_eq!(ticks, vec![24000, 24000]);
    }

    #[test]
    fn test_octave_changes() {
        assert_eq!(
            events("O4 > C < < C"),
            vec![
                MmlEvent::Octave { octave: 4 },
                MmlEvent::Octave { octave: 5 },
                MmlEvent::Note { note: 60, ticks: 500 },
                MmlEvent::Octave { octave: 4 },
                MmlEvent::Octave { octave: 3 },
                MmlEvent::Note { note: 36, ticks: 500 },
            ]
        );
        assert_eq!(
            events("O0 < C"),
            vec![
                MmlEvent::Octave { octave: 0 },
                MmlEvent::Octave { octave: -1 },
                MmlEvent::Note { note: -12, ticks: 500 },
            ]
        );
    }

    #[test]
    fn test_volume_and_tone() {
        assert_eq!(
            events("V80 V @3"),
            vec![
                MmlEvent::Volume { volume: 80 },
                MmlEvent::Volume { volume: 0 },
                MmlEvent::Tone { program: 3 },
            ]
        );
    }

    #[test]
    fn test_invalid_commands() {
        let cases = [
            ("C3", MmlErrorKind::InvalidNoteLength),
            ("C4.....", MmlErrorKind::InvalidNoteLength),
            ("C4+", MmlErrorKind::InvalidNoteLength),
            ("R3", MmlErrorKind::InvalidRestLength),
            ("T0", MmlErrorKind::InvalidTempo),
            ("T", MmlErrorKind::InvalidTempo),
            ("L5", MmlErrorKind::InvalidLength),
            ("O", MmlErrorKind::InvalidOctave),
            ("V101", MmlErrorKind::InvalidVolume),
            ("@", MmlErrorKind::InvalidTone),
            ("X", MmlErrorKind::IllegalCharacter('X')),
        ];
        for (score, kind) in cases {
            let err = error(score);
            assert_eq!(err.kind, kind, "score {score:?}");
            assert_eq!(err.span.start, 0, "score {score:?}");
        }
    }

    #[test]
    fn test_error_leaves_cursor_at_token() {
        let score = "C4 D4 x";
        let mut state = MmlState::new(&MmlConfig::default());
        let mut cursor = 0;
        parse_mml(&mut state, score, &mut cursor).unwrap();
        parse_mml(&mut state, score, &mut cursor).unwrap();

        let err = parse_mml(&mut state, score, &mut cursor).unwrap_err();
        assert_eq!(err.kind, MmlErrorKind::IllegalCharacter('x'));
        assert_eq!(err.code(), -1);
        assert_eq!(cursor, 6);
        assert_eq!(err.span, Span::new(6, 7));

        // Retrying reports the same error.
        assert_eq!(parse_mml(&mut state, score, &mut cursor).unwrap_err(), err);
    }

    #[test]
    fn test_illegal_multibyte_character() {
        let err = error("C ♪");
        assert_eq!(err.kind, MmlErrorKind::IllegalCharacter('♪'));
        assert_eq!(err.span, Span::new(2, 2 + '♪'.len_utf8()));
    }

    #[test]
    fn test_event_spans() {
        let parsed = parse_all("  C4\n\tR8.", &MmlConfig::default()).unwrap();
        assert_eq!(parsed[0].span, Span::new(2, 4));
        assert_eq!(parsed[1].span, Span::new(6, 9));
    }

    #[test]
    fn test_chord() {
        assert_eq!(
            events("[CEG] [C E G]8"),
            vec![
                MmlEvent::Chord { notes: vec![48, 52, 55], ticks: 500 },
                MmlEvent::Chord { notes: vec![48, 52, 55], ticks: 250 },
            ]
        );
    }

    #[test]
    fn test_chord_octave_persists() {
        assert_eq!(
            events("[C > C] C"),
            vec![
                MmlEvent::Chord { notes: vec![48, 60], ticks: 500 },
                MmlEvent::Note { note: 60, ticks: 500 },
            ]
        );
    }

    #[test]
    fn test_chord_overflow_is_dropped() {
        match &events("[CDEFGAB]")[0] {
            MmlEvent::Chord { notes, .. } => {
                assert_eq!(notes.len(), MAX_CHORD_NOTES);
                assert_eq!(notes, &vec![48, 50, 52, 53, 55]);
            }
            other => panic!("Expected chord, got {other:?}"),
        }
    }

    #[test]
    fn test_chord_errors() {
        let err = error("[CE");
        assert_eq!(err.kind, MmlErrorKind::UnterminatedChord);
        assert_eq!(err.code(), -10);
        assert_eq!(err.span.start, 0);

        assert_eq!(error("[C R]").kind, MmlErrorKind::InvalidChord);
        assert_eq!(error("[C O]").kind, MmlErrorKind::InvalidChord);
        assert_eq!(error("[CE]3").kind, MmlErrorKind::InvalidChord);
    }

    #[test]
    fn test_empty_chord() {
        assert_eq!(events("[]"), vec![MmlEvent::Chord { notes: vec![], ticks: 500 }]);
    }

    #[test]
    fn test_tuplet_shares_length() {
        assert_eq!(
            events("{CDE}4 F"),
            vec![
                MmlEvent::TupletStart { ticks: 500 },
                MmlEvent::Note { note: 48, ticks: 166 },
                MmlEvent::Note { note: 50, ticks: 166 },
                MmlEvent::Note { note: 52, ticks: 168 },
                MmlEvent::TupletEnd,
                MmlEvent::Note { note: 53, ticks: 500 },
            ]
        );
    }

    #[test]
    fn test_tuplet_with_chord_and_rest() {
        let parsed = events("{[CE] R G}2");
        let ticks: Vec<u32> = parsed.iter().filter_map(|e| e.ticks()).collect();
        assert_eq!(ticks, vec![333, 333, 334]);
        assert_eq!(ticks.iter().sum::<u32>(), 1000);
        assert!(matches!(parsed[1], MmlEvent::Chord { .. }));
    }

    #[test]
    fn test_tuplet_default_length() {
        assert_eq!(note_ticks("L2 {CC}"), vec![500, 500]);
    }

    #[test]
    fn test_parser_state_tracks_tuplet() {
        let mut parser = MmlParser::new("{CD}4", &MmlConfig::default());
        parser.next();
        assert!(parser.state().in_tuplet());
        parser.by_ref().for_each(drop);
        assert!(!parser.state().in_tuplet());
        assert_eq!(parser.cursor(), 5);
    }

    #[test]
    fn test_tuplet_errors() {
        let err = error("{C{D}}");
        assert_eq!(err.kind, MmlErrorKind::NestedTuplet);
        assert_eq!(err.span.start, 2);

        assert_eq!(error("{CDE").kind, MmlErrorKind::InvalidTuplet);
        assert_eq!(error("{}4").kind, MmlErrorKind::InvalidTuplet);
        assert_eq!(error("{CD}3").kind, MmlErrorKind::InvalidTuplet);
        assert_eq!(error("C }").kind, MmlErrorKind::InvalidTuplet);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut parser = MmlParser::new("C X D", &MmlConfig::default());
        assert!(parser.next().unwrap().is_ok());
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_error_report() {
        let source = "T120 [CEG";
        let err = error(source);
        let report = err.report("song.mml", source);
        assert!(report.contains("Unterminated chord"), "report was:\n{report}");
        assert!(report.contains("song.mml"), "report was:\n{report}");
        assert_eq!(err.to_string(), "Unterminated chord at pos 5");
    }

    #[test]
    fn test_event_json() {
        let parsed = parse_all("C", &MmlConfig::default()).unwrap();
        let json = serde_json::to_value(&parsed[0]).unwrap();
        assert_eq!(json["kind"], "note");
        assert_eq!(json["note"], 48);
        assert_eq!(json["ticks"], 500);
        assert_eq!(json["span"]["end"], 1);
    }

    #[test]
    fn test_config_from_json() {
        let config: MmlConfig = serde_json::from_str(r#"{ "tickRate": 48000, "tempo": 90 }"#).unwrap();
        assert_eq!(config.tick_rate, 48000);
        assert_eq!(config.tempo, 90);
        assert_eq!(config.octave, 4);
    }
}
