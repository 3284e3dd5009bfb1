//! Candidate tonality selection: which keys can claim the progression as
//! their own, most likely first.

use crate::chord::Chord;
use crate::kripke::TonalFunction;
use crate::tonality::Tonality;

use super::AnalysisError;

/// Number of chords of the progression that belong to the tonality's field.
pub fn field_score(chords: &[Chord], tonality: &Tonality) -> usize {
    chords.iter().filter(|c| tonality.contains(c)).count()
}

/// Keep the tonalities where the final chord is a tonic and rank them by
/// field score, descending. Ties go to keys whose quality matches the final
/// chord's; remaining ties keep catalog order.
pub fn rank_candidates<'a>(
    chords: &[Chord],
    tonalities: &[&'a Tonality],
) -> Result<Vec<&'a Tonality>, AnalysisError> {
    let Some(last) = chords.last() else {
        return Err(AnalysisError::EmptyProgression);
    };

    let mut scored: Vec<(&Tonality, usize, bool)> = tonalities
        .iter()
        .filter(|t| t.chord_fulfills_function(last, TonalFunction::Tonic))
        .map(|&t| (t, field_score(chords, t), t.quality().matches(last.quality())))
        .collect();

    if scored.is_empty() {
        return Err(AnalysisError::NoTonicCandidate {
            chord: last.symbol().to_string(),
        });
    }

    // sort_by is stable
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

    log::info!(
        "Tonality ranking: {}",
        scored
            .iter()
            .map(|(t, score, _)| format!("{} ({})", t.name(), score))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(scored.into_iter().map(|(t, _, _)| t).collect())
}
