//! Derivation traces: the rule applied at each step of an analysis, and the
//! (state, tonality) route the search took.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::chord::Chord;
use crate::kripke::KripkeState;

/// Formal rule named by a derivation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    AnalysisStart,
    /// Chord P fulfills the function of the current state in tonality L.
    ChordInTonality,
    PivotModulation,
    Reanchor,
    EndOfSequence,
    OverallSuccess,
    OverallFailure,
    InputError,
    ConfigurationError,
}

impl Rule {
    pub fn label(self) -> &'static str {
        match self {
            Rule::AnalysisStart => "Analysis Start",
            Rule::ChordInTonality => "P in L",
            Rule::PivotModulation => "Pivot Modulation (Eq.5)",
            Rule::Reanchor => "Re-anchoring (Eq.4B)",
            Rule::EndOfSequence => "End of Sequence",
            Rule::OverallSuccess => "Overall Success",
            Rule::OverallFailure => "Overall Failure",
            Rule::InputError => "Input Error",
            Rule::ConfigurationError => "Configuration Error",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

fn state_label<S: Serializer>(state: &Option<KripkeState>, serializer: S) -> Result<S::Ok, S::Error> {
    match state {
        Some(s) => serializer.serialize_some(&s.to_string()),
        None => serializer.serialize_none(),
    }
}

/// One step of a derivation.
#[derive(Debug, Clone, Serialize)]
pub struct DerivationStep {
    #[serde(rename = "formal_rule_applied")]
    pub rule: Rule,
    pub observation: String,
    pub processed_chord: Option<Chord>,
    #[serde(rename = "tonality_used_in_step")]
    pub tonality: Option<String>,
    #[serde(rename = "evaluated_functional_state", serialize_with = "state_label")]
    pub evaluated_state: Option<KripkeState>,
}

impl DerivationStep {
    pub fn new(rule: Rule, observation: impl Into<String>) -> Self {
        Self {
            rule,
            observation: observation.into(),
            processed_chord: None,
            tonality: None,
            evaluated_state: None,
        }
    }

    pub fn chord(mut self, chord: &Chord) -> Self {
        self.processed_chord = Some(chord.clone());
        self
    }

    pub fn tonality(mut self, name: &str) -> Self {
        self.tonality = Some(name.to_string());
        self
    }

    pub fn state(mut self, state: &KripkeState) -> Self {
        self.evaluated_state = Some(state.clone());
        self
    }
}

/// An ordered derivation trace.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Explanation {
    pub steps: Vec<DerivationStep>,
}

impl Explanation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: DerivationStep) {
        self.steps.push(step);
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.steps.iter().map(|s| s.rule).collect()
    }

    /// Steps that processed a chord with exactly this symbol.
    pub fn steps_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a DerivationStep> + 'a {
        self.steps
            .iter()
            .filter(move |s| s.processed_chord.as_ref().is_some_and(|c| c.symbol() == symbol))
    }

    pub fn last(&self) -> Option<&DerivationStep> {
        self.steps.last()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// One visited (state, tonality) pair with a short note on how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct PathStep {
    #[serde(serialize_with = "plain_state")]
    pub state: KripkeState,
    pub tonality: String,
    pub note: String,
}

fn plain_state<S: Serializer>(state: &KripkeState, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&state.to_string())
}

/// Route through the Kripke structure, first visited pair first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct KripkePath {
    pub steps: Vec<PathStep>,
}

impl KripkePath {
    pub fn current(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Tonality names in visiting order, consecutive repeats collapsed.
    pub fn tonalities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if names.last() != Some(&step.tonality.as_str()) {
                names.push(&step.tonality);
            }
        }
        names
    }
}
