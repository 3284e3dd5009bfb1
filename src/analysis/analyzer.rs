use crate::chord::Chord;
use crate::kripke::{KripkeStructure, TonalFunction};
use crate::tonality::Tonality;

use super::evaluator::{SatisfactionEvaluator, MAX_RECURSION_DEPTH};
use super::explanation::{DerivationStep, Explanation, KripkePath, Rule};

/// Why a progression was not certified tonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    EmptyProgression,
    NoTonalities,
    /// The Kripke structure has no TONIC state.
    Configuration,
    /// The final chord is not a tonic of the primary tonality.
    PreconditionUnmet,
    /// No derivation was found.
    Unsatisfiable,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub is_tonal: bool,
    /// Anchoring tonality, when tonal.
    pub tonality: Option<String>,
    pub explanation: Explanation,
    pub path: Option<KripkePath>,
    pub failure: Option<FailureKind>,
}

impl Verdict {
    fn failed(kind: FailureKind, explanation: Explanation) -> Self {
        Self {
            is_tonal: false,
            tonality: None,
            explanation,
            path: None,
            failure: Some(kind),
        }
    }
}

/// Entry point of the engine: checks one progression against the primary
/// of a ranked list of tonalities.
pub struct ProgressionAnalyzer<'a> {
    structure: &'a KripkeStructure,
    catalog: &'a [Tonality],
    max_depth: usize,
}

impl<'a> ProgressionAnalyzer<'a> {
    pub fn new(structure: &'a KripkeStructure, catalog: &'a [Tonality]) -> Self {
        Self {
            structure,
            catalog,
            max_depth: MAX_RECURSION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// `chords` in performance order; `ranked` as produced by
    /// [`rank_candidates`](super::candidates::rank_candidates), primary first.
    pub fn check_tonal_progression(&self, chords: &[Chord], ranked: &[&'a Tonality]) -> Verdict {
        let mut explanation = Explanation::new();

        if chords.is_empty() {
            explanation.add_step(DerivationStep::new(Rule::InputError, "Input chord sequence is empty."));
            return Verdict::failed(FailureKind::EmptyProgression, explanation);
        }
        let Some(&primary) = ranked.first() else {
            explanation.add_step(DerivationStep::new(
                Rule::InputError,
                "The list of tonalities to test is empty.",
            ));
            return Verdict::failed(FailureKind::NoTonalities, explanation);
        };
        let Some(tonic) = self.structure.state_for_function(TonalFunction::Tonic) else {
            explanation.add_step(DerivationStep::new(
                Rule::ConfigurationError,
                "Kripke structure configuration is missing a TONIC state.",
            ));
            return Verdict::failed(FailureKind::Configuration, explanation);
        };

        let reversed: Vec<Chord> = chords.iter().rev().cloned().collect();
        explanation.add_step(
            DerivationStep::new(
                Rule::AnalysisStart,
                format!("Testing progression in tonality: '{}'.", primary.name()),
            )
            .tonality(primary.name()),
        );

        let last = &reversed[0];
        if !primary.chord_fulfills_function(last, TonalFunction::Tonic) {
            log::info!("Final chord {} is not a tonic of {}", last, primary);
            explanation.add_step(DerivationStep::new(
                Rule::OverallFailure,
                format!(
                    "The final chord '{}' does not function as TONIC in '{}'.",
                    last,
                    primary.name()
                ),
            ));
            return Verdict::failed(FailureKind::PreconditionUnmet, explanation);
        }

        let mut evaluator = SatisfactionEvaluator::new(self.structure, self.catalog, primary)
            .with_ranked(ranked)
            .with_max_depth(self.max_depth);
        let evaluation = evaluator.evaluate(primary, tonic, &reversed, explanation);
        let mut explanation = evaluation.explanation;

        if evaluation.satisfied {
            log::info!("Progression is tonal in {}", primary);
            explanation.add_step(
                DerivationStep::new(
                    Rule::OverallSuccess,
                    format!("Progression identified as tonal in '{}'.", primary.name()),
                )
                .tonality(primary.name()),
            );
            Verdict {
                is_tonal: true,
                tonality: Some(primary.name().to_string()),
                explanation,
                path: evaluation.path,
                failure: None,
            }
        } else {
            log::info!("No derivation found in {}", primary);
            explanation.add_step(DerivationStep::new(
                Rule::OverallFailure,
                format!("No derivation satisfies the progression in '{}'.", primary.name()),
            ));
            Verdict::failed(FailureKind::Unsatisfiable, explanation)
        }
    }
}
