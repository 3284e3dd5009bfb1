use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::chord::{Chord, Quality};
use crate::kripke::TonalFunction;

/// Scale a chord of a tonality's harmonic field was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleOrigin {
    Natural,
    Harmonic,
    Melodic,
    #[default]
    #[serde(other)]
    Unspecified,
}

/// Major or minor, as read from a tonality's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyQuality {
    Major,
    #[serde(rename = "minor")]
    Minor,
}

impl KeyQuality {
    /// Whether a chord of this quality agrees with the key's quality.
    /// Diminished chords never agree.
    pub fn matches(self, chord: Quality) -> bool {
        matches!(
            (self, chord),
            (KeyQuality::Major, Quality::Major) | (KeyQuality::Minor, Quality::Minor)
        )
    }
}

/// A chord listed under a function, with the scale it comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChord {
    pub chord: Chord,
    pub origin: ScaleOrigin,
}

/// A named key and the chords that fulfill each tonal function in it.
#[derive(Debug, Clone)]
pub struct Tonality {
    name: String,
    functions: BTreeMap<TonalFunction, Vec<FieldChord>>,
    scale_notes: Vec<String>,
}

impl Tonality {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: BTreeMap::new(),
            scale_notes: Vec::new(),
        }
    }

    /// Builder-style: add chords under `function`, all from one origin.
    pub fn with_chords(mut self, function: TonalFunction, symbols: &[&str], origin: ScaleOrigin) -> Self {
        for symbol in symbols {
            self.add_chord(function, Chord::new(symbol), origin);
        }
        self
    }

    pub fn with_scale_notes(mut self, notes: Vec<String>) -> Self {
        self.scale_notes = notes;
        self
    }

    /// Add a chord under `function`; a symbol already listed there is ignored.
    pub fn add_chord(&mut self, function: TonalFunction, chord: Chord, origin: ScaleOrigin) {
        let entries = self.functions.entry(function).or_default();
        if !entries.iter().any(|e| e.chord == chord) {
            entries.push(FieldChord { chord, origin });
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quality(&self) -> KeyQuality {
        if self.name.to_lowercase().contains("minor") {
            KeyQuality::Minor
        } else {
            KeyQuality::Major
        }
    }

    pub fn scale_notes(&self) -> &[String] {
        &self.scale_notes
    }

    /// Chords listed for `function`, in insertion order.
    pub fn chords_for(&self, function: TonalFunction) -> &[FieldChord] {
        self.functions.get(&function).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if `chord` is listed under `function`, literally or through an
    /// enharmonically equivalent spelling.
    pub fn chord_fulfills_function(&self, chord: &Chord, function: TonalFunction) -> bool {
        let entries = self.chords_for(function);
        entries.iter().any(|e| e.chord == *chord) || entries.iter().any(|e| e.chord.is_enharmonic_to(chord))
    }

    /// Every function `chord` fulfills here, in `TonalFunction::ALL` order.
    pub fn functions_of(&self, chord: &Chord) -> Vec<TonalFunction> {
        TonalFunction::ALL
            .into_iter()
            .filter(|&f| self.chord_fulfills_function(chord, f))
            .collect()
    }

    /// True if `chord` belongs to the harmonic field at all.
    pub fn contains(&self, chord: &Chord) -> bool {
        TonalFunction::ALL
            .into_iter()
            .any(|f| self.chord_fulfills_function(chord, f))
    }

    /// Origin of the listed chord matching `chord` under `function`, if any.
    pub fn origin_of(&self, chord: &Chord, function: TonalFunction) -> Option<ScaleOrigin> {
        let entries = self.chords_for(function);
        entries
            .iter()
            .find(|e| e.chord == *chord)
            .or_else(|| entries.iter().find(|e| e.chord.is_enharmonic_to(chord)))
            .map(|e| e.origin)
    }
}

impl fmt::Display for Tonality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
