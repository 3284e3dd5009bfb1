//! Harmonic fields for the 24 major and minor tonalities.
//!
//! Major keys take all seven diatonic triads from the major scale. Minor keys
//! take the natural-minor triads plus the major V and the leading-tone
//! diminished triad from the harmonic minor scale.

use crate::chord::{pitch_class, Chord, NOTE_NAMES};
use crate::kripke::TonalFunction;
use crate::tonality::{ScaleOrigin, Tonality};
use TonalFunction::{Dominant, Subdominant, Tonic};

const MAJOR_SCALE_STEPS: [u8; 7] = [2, 2, 1, 2, 2, 2, 1];
const NATURAL_MINOR_STEPS: [u8; 7] = [2, 1, 2, 2, 1, 2, 2];

/// One triad of a harmonic field: scale degree index, chord suffix, function, source scale.
struct Degree {
    index: usize,
    suffix: &'static str,
    function: TonalFunction,
    origin: ScaleOrigin,
}

const fn degree(index: usize, suffix: &'static str, function: TonalFunction, origin: ScaleOrigin) -> Degree {
    Degree {
        index,
        suffix,
        function,
        origin,
    }
}

// I ii iii IV V vi vii°
const MAJOR_DEGREES: [Degree; 7] = [
    degree(0, "", Tonic, ScaleOrigin::Natural),
    degree(1, "m", Subdominant, ScaleOrigin::Natural),
    degree(2, "m", Tonic, ScaleOrigin::Natural),
    degree(3, "", Subdominant, ScaleOrigin::Natural),
    degree(4, "", Dominant, ScaleOrigin::Natural),
    degree(5, "m", Tonic, ScaleOrigin::Natural),
    degree(6, "dim", Dominant, ScaleOrigin::Natural),
];

// i ii° bIII iv v V bVI bVII vii°
const MINOR_DEGREES: [Degree; 9] = [
    degree(0, "m", Tonic, ScaleOrigin::Natural),
    degree(1, "dim", Subdominant, ScaleOrigin::Natural),
    degree(2, "", Tonic, ScaleOrigin::Natural),
    degree(3, "m", Subdominant, ScaleOrigin::Natural),
    degree(4, "m", Dominant, ScaleOrigin::Natural),
    degree(4, "", Dominant, ScaleOrigin::Harmonic),
    degree(5, "", Tonic, ScaleOrigin::Natural),
    degree(6, "", Dominant, ScaleOrigin::Natural),
    degree(6, "dim", Dominant, ScaleOrigin::Harmonic),
];

/// Pitch classes of a seven-note scale starting on `root`.
fn build_scale(root: u8, steps: &[u8; 7]) -> [u8; 7] {
    let mut scale = [root; 7];
    for i in 1..7 {
        scale[i] = (scale[i - 1] + steps[i - 1]) % 12;
    }
    scale
}

fn fill(tonality: &mut Tonality, degrees: &[Degree], natural: &[u8; 7], harmonic: &[u8; 7]) {
    for d in degrees {
        let scale = match d.origin {
            ScaleOrigin::Harmonic => harmonic,
            _ => natural,
        };
        let symbol = format!("{}{}", NOTE_NAMES[scale[d.index] as usize], d.suffix);
        tonality.add_chord(d.function, Chord::new(&symbol), d.origin);
    }
}

fn scale_names(scale: &[u8; 7]) -> Vec<String> {
    scale.iter().map(|&pc| NOTE_NAMES[pc as usize].to_string()).collect()
}

/// "<root> Major". Returns `None` for an unknown root name.
pub fn major(root: &str) -> Option<Tonality> {
    let pc = pitch_class(root)?;
    let scale = build_scale(pc, &MAJOR_SCALE_STEPS);
    let mut tonality = Tonality::new(&format!("{} Major", NOTE_NAMES[pc as usize]))
        .with_scale_notes(scale_names(&scale));
    fill(&mut tonality, &MAJOR_DEGREES, &scale, &scale);
    Some(tonality)
}

/// "<root> minor", natural and harmonic. Returns `None` for an unknown root name.
pub fn minor(root: &str) -> Option<Tonality> {
    let pc = pitch_class(root)?;
    let natural = build_scale(pc, &NATURAL_MINOR_STEPS);
    let mut harmonic = natural;
    harmonic[6] = (harmonic[6] + 1) % 12;

    let mut tonality = Tonality::new(&format!("{} minor", NOTE_NAMES[pc as usize]))
        .with_scale_notes(scale_names(&natural));
    fill(&mut tonality, &MINOR_DEGREES, &natural, &harmonic);
    Some(tonality)
}

/// All 24 tonalities: for each root in chromatic order, major then minor.
pub fn all_tonalities() -> Vec<Tonality> {
    NOTE_NAMES
        .iter()
        .flat_map(|root| [major(root), minor(root)])
        .flatten()
        .collect()
}
