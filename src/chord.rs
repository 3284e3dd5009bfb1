//! Chord symbols, pitch classes and enharmonic equivalence.
//!
//! A chord is identified by its symbol (`"Am"`, `"Bb"`, `"C#dim"`); its note
//! set is derived from the root and a triad quality. Two chords are
//! enharmonically equivalent when their note sets are equal, whatever the
//! spelling.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// The 12 chromatic note names, sharp spelling, indexed by pitch class.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub const SHARP_SYMBOL: char = '\u{266F}';
pub const FLAT_SYMBOL: char = '\u{266D}';

/// Flat (and odd sharp) spellings mapped onto the sharp names in `NOTE_NAMES`.
const ENHARMONIC_MAP: [(&str, &str); 9] = [
    ("Db", "C#"),
    ("Eb", "D#"),
    ("Gb", "F#"),
    ("Ab", "G#"),
    ("Bb", "A#"),
    ("Cb", "B"),
    ("Fb", "E"),
    ("E#", "F"),
    ("B#", "C"),
];

// Root letter, optional accidental, then whatever suffix follows
static CHORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<letter>[A-G])(?P<accidental>[#b]?)(?P<suffix>.*)$")
        .expect("chord symbol regex")
});

/// Replace Unicode accidentals with their ASCII spelling.
pub fn from_unicode_symbols(symbol: &str) -> String {
    symbol.replace(SHARP_SYMBOL, "#").replace(FLAT_SYMBOL, "b")
}

/// Replace ASCII accidentals on the root with Unicode symbols ("Bbm" → "B♭m").
/// Only the character right after the root letter is touched, so suffixes
/// such as "dim" or "b5" keep their spelling.
pub fn to_unicode_symbols(symbol: &str) -> String {
    let mut chars = symbol.chars();
    let Some(letter) = chars.next() else {
        return String::new();
    };
    let mut out = String::with_capacity(symbol.len() + 2);
    out.push(letter);
    match chars.next() {
        Some('#') => out.push(SHARP_SYMBOL),
        Some('b') if letter.is_ascii_uppercase() => out.push(FLAT_SYMBOL),
        Some(c) => out.push(c),
        None => return out,
    }
    out.extend(chars);
    out
}

/// Normalize a note name to the sharp spelling used by `NOTE_NAMES`.
/// Names not in the enharmonic table are returned unchanged.
pub fn normalize_note_name(note: &str) -> String {
    let ascii = from_unicode_symbols(note);
    ENHARMONIC_MAP
        .iter()
        .find(|(from, _)| *from == ascii)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or(ascii)
}

/// Pitch class index (0 = C) for a note name, after normalization.
pub fn pitch_class(note: &str) -> Option<u8> {
    let normalized = normalize_note_name(note);
    NOTE_NAMES
        .iter()
        .position(|n| *n == normalized)
        .map(|i| i as u8)
}

/// Triad quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Major,
    #[serde(rename = "minor")]
    Minor,
    #[serde(rename = "diminished")]
    Diminished,
}

impl Quality {
    /// Quality from a chord suffix: "dim" wins over "m", anything else is major.
    fn from_suffix(suffix: &str) -> Self {
        if suffix.contains("dim") {
            Quality::Diminished
        } else if suffix.contains('m') {
            Quality::Minor
        } else {
            Quality::Major
        }
    }

    /// Semitone offsets of the triad from its root.
    pub fn intervals(self) -> [u8; 3] {
        match self {
            Quality::Major => [0, 4, 7],
            Quality::Minor => [0, 3, 7],
            Quality::Diminished => [0, 3, 6],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Major => "Major",
            Quality::Minor => "minor",
            Quality::Diminished => "diminished",
        }
    }
}

/// A set of pitch classes as a 12-bit mask (bit 0 = C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PitchSet(u16);

impl PitchSet {
    pub fn from_classes(classes: impl IntoIterator<Item = u8>) -> Self {
        let mut bits = 0u16;
        for pc in classes {
            bits |= 1 << (pc % 12);
        }
        PitchSet(bits)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(self, pc: u8) -> bool {
        pc < 12 && self.0 & (1 << pc) != 0
    }

    /// Note names in chromatic order.
    pub fn names(self) -> Vec<&'static str> {
        (0..12u8)
            .filter(|&pc| self.contains(pc))
            .map(|pc| NOTE_NAMES[pc as usize])
            .collect()
    }
}

/// A chord symbol with its derived root, quality and notes.
///
/// Equality and hashing go by symbol; use [`Chord::is_enharmonic_to`] for
/// note-set equality. Unparseable symbols are kept as-is with an empty note
/// set, so they can never fulfill a tonal function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Chord {
    symbol: String,
    root: Option<u8>,
    quality: Quality,
    notes: PitchSet,
}

impl Chord {
    pub fn new(symbol: &str) -> Self {
        let symbol = symbol.trim().to_string();
        let ascii = from_unicode_symbols(&symbol);

        let Some(caps) = CHORD_RE.captures(&ascii) else {
            log::trace!("Unrecognized chord root in {:?}", symbol);
            return Chord {
                quality: Quality::Major,
                root: None,
                notes: PitchSet::default(),
                symbol,
            };
        };

        let root_name = format!("{}{}", &caps["letter"], &caps["accidental"]);
        let quality = Quality::from_suffix(&caps["suffix"]);
        let root = pitch_class(&root_name);
        let notes = match root {
            Some(r) => PitchSet::from_classes(quality.intervals().iter().map(|i| r + i)),
            None => PitchSet::default(),
        };

        Chord {
            symbol,
            root,
            quality,
            notes,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn root(&self) -> Option<u8> {
        self.root
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn notes(&self) -> PitchSet {
        self.notes
    }

    /// Same pitch classes under a (possibly) different spelling.
    /// Chords without notes are never equivalent to anything.
    pub fn is_enharmonic_to(&self, other: &Chord) -> bool {
        !self.notes.is_empty() && self.notes == other.notes
    }
}

impl PartialEq for Chord {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Chord {}

impl std::hash::Hash for Chord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

impl From<String> for Chord {
    fn from(symbol: String) -> Self {
        Chord::new(&symbol)
    }
}

impl From<&str> for Chord {
    fn from(symbol: &str) -> Self {
        Chord::new(symbol)
    }
}

impl From<Chord> for String {
    fn from(chord: Chord) -> Self {
        chord.symbol
    }
}

/// Parse a list of chord symbols, preserving order.
pub fn parse_progression<S: AsRef<str>>(symbols: &[S]) -> Vec<Chord> {
    symbols.iter().map(|s| Chord::new(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_minor_diminished_notes() {
        assert_eq!(Chord::new("C").notes().names(), vec!["C", "E", "G"]);
        assert_eq!(Chord::new("Am").notes().names(), vec!["C", "E", "A"]);
        assert_eq!(Chord::new("Bdim").notes().names(), vec!["D", "F", "B"]);
        assert_eq!(Chord::new("Bdim").quality(), Quality::Diminished);
    }

    #[test]
    fn test_flats_normalize_to_sharps() {
        assert_eq!(normalize_note_name("Db"), "C#");
        assert_eq!(normalize_note_name("Bb"), "A#");
        assert_eq!(normalize_note_name("E#"), "F");
        assert_eq!(normalize_note_name("B#"), "C");
        for note in NOTE_NAMES {
            assert_eq!(normalize_note_name(note), note);
        }

        assert_eq!(Chord::new("Bb").notes().names(), vec!["D", "F", "A#"]);
        assert_eq!(Chord::new("Gbdim").notes().names(), vec!["C", "F#", "A"]);
        // Cb and Fb resolve to B and E
        assert_eq!(Chord::new("Cb").notes(), Chord::new("B").notes());
        assert_eq!(Chord::new("Fb").notes(), Chord::new("E").notes());
    }

    #[test]
    fn test_enharmonic_equivalence() {
        let pairs = [
            ("Bb", "A#"),
            ("Db", "C#"),
            ("Ebm", "D#m"),
            ("Abdim", "G#dim"),
            ("Gb", "F#"),
        ];
        for (a, b) in pairs {
            let (a, b) = (Chord::new(a), Chord::new(b));
            assert_eq!(a.notes(), b.notes());
            assert!(a.is_enharmonic_to(&b));
            assert!(b.is_enharmonic_to(&a));
            assert_ne!(a, b, "symbol equality is stricter");
        }
    }

    #[test]
    fn test_quality_substring_rules() {
        assert_eq!(Chord::new("Bb").quality(), Quality::Major);
        assert_eq!(Chord::new("Ebm").quality(), Quality::Minor);
        assert_eq!(Chord::new("Abdim").quality(), Quality::Diminished);
        // Extensions without "m" stay major
        assert_eq!(Chord::new("A7").quality(), Quality::Major);
        assert_eq!(Chord::new("A7").notes(), Chord::new("A").notes());
        assert_eq!(Chord::new("Em7").quality(), Quality::Minor);
    }

    #[test]
    fn test_unparseable_root_has_no_notes() {
        let chord = Chord::new("X7alt");
        assert!(chord.notes().is_empty());
        assert_eq!(chord.root(), None);
        assert!(!chord.is_enharmonic_to(&Chord::new("H")));
        assert!(Chord::new("").notes().is_empty());
        assert!(Chord::new("c").notes().is_empty());
    }

    #[test]
    fn test_unicode_accidentals() {
        assert_eq!(to_unicode_symbols("C#"), "C\u{266F}");
        assert_eq!(to_unicode_symbols("Bbm"), "B\u{266D}m");
        assert_eq!(to_unicode_symbols("Ebdim"), "E\u{266D}dim");
        assert_eq!(to_unicode_symbols("C"), "C");
        assert_eq!(to_unicode_symbols("Cm7b5"), "Cm7b5");
        assert_eq!(from_unicode_symbols("F\u{266F}m"), "F#m");

        for symbol in ["C#", "Bb", "F#m", "Ebdim", "Db"] {
            assert_eq!(from_unicode_symbols(&to_unicode_symbols(symbol)), symbol);
        }

        assert_eq!(Chord::new("B\u{266D}m").notes(), Chord::new("Bbm").notes());
        assert_eq!(Chord::new("C\u{266F}dim").notes(), Chord::new("C#dim").notes());
        assert_eq!(normalize_note_name("D\u{266D}"), "C#");
        assert_eq!(normalize_note_name("E\u{266F}"), "F");
    }

    #[test]
    fn test_serde_as_symbol() {
        let json = serde_json::to_string(&Chord::new("F#m")).unwrap();
        assert_eq!(json, "\"F#m\"");
        let back: Chord = serde_json::from_str("\"Bb\"").unwrap();
        assert_eq!(back.notes(), Chord::new("A#").notes());
    }
}
