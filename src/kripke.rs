//! Tonal functions and the Kripke structure over them.
//!
//! The accessibility relation is read backwards: the evaluator walks a
//! progression from its last chord to its first, so an edge `s_t → s_d`
//! means "a dominant may precede a tonic".

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Harmonic role of a chord within a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TonalFunction {
    Tonic,
    Dominant,
    Subdominant,
}

impl TonalFunction {
    pub const ALL: [TonalFunction; 3] = [
        TonalFunction::Tonic,
        TonalFunction::Dominant,
        TonalFunction::Subdominant,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TonalFunction::Tonic => "TONIC",
            TonalFunction::Dominant => "DOMINANT",
            TonalFunction::Subdominant => "SUBDOMINANT",
        }
    }
}

impl fmt::Display for TonalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state `s` of the structure, labeled with the function it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KripkeState {
    #[serde(rename = "state_id")]
    pub id: String,
    #[serde(rename = "associated_tonal_function")]
    pub function: TonalFunction,
}

impl KripkeState {
    pub fn new(id: &str, function: TonalFunction) -> Self {
        Self {
            id: id.to_string(),
            function,
        }
    }
}

impl fmt::Display for KripkeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.function, self.id)
    }
}

/// ⟨S, S₀, S_F, R⟩. States keep declaration order and edges keep relation
/// order, which fixes the order in which successors are explored.
#[derive(Debug, Clone)]
pub struct KripkeStructure {
    states: Vec<KripkeState>,
    initial: Vec<String>,
    finals: Vec<String>,
    /// Edges as indices into `states`.
    edges: Vec<(usize, usize)>,
}

/// A relation or initial/final entry names a state that was never declared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown Kripke state '{0}'")]
pub struct UnknownState(pub String);

impl KripkeStructure {
    pub fn new(
        states: Vec<KripkeState>,
        initial: Vec<String>,
        finals: Vec<String>,
        relation: &[(String, String)],
    ) -> Result<Self, UnknownState> {
        let index_of = |id: &str| {
            states
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| UnknownState(id.to_string()))
        };

        let mut edges = Vec::with_capacity(relation.len());
        for (from, to) in relation {
            let edge = (index_of(from)?, index_of(to)?);
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
        for id in initial.iter().chain(finals.iter()) {
            index_of(id)?;
        }

        Ok(Self {
            states,
            initial,
            finals,
            edges,
        })
    }

    /// The three-state structure used for functional harmony:
    /// tonic → dominant, tonic → subdominant, dominant → subdominant.
    pub fn standard() -> Self {
        let states = vec![
            KripkeState::new("s_t", TonalFunction::Tonic),
            KripkeState::new("s_d", TonalFunction::Dominant),
            KripkeState::new("s_sd", TonalFunction::Subdominant),
        ];
        Self {
            states,
            initial: vec!["s_t".to_string()],
            finals: vec!["s_d".to_string(), "s_sd".to_string()],
            edges: vec![(0, 1), (0, 2), (1, 2)],
        }
    }

    pub fn states(&self) -> &[KripkeState] {
        &self.states
    }

    pub fn initial_states(&self) -> impl Iterator<Item = &KripkeState> {
        self.initial.iter().filter_map(|id| self.state(id))
    }

    pub fn final_states(&self) -> impl Iterator<Item = &KripkeState> {
        self.finals.iter().filter_map(|id| self.state(id))
    }

    pub fn state(&self, id: &str) -> Option<&KripkeState> {
        self.states.iter().find(|s| s.id == id)
    }

    /// First declared state carrying `function`.
    pub fn state_for_function(&self, function: TonalFunction) -> Option<&KripkeState> {
        self.states.iter().find(|s| s.function == function)
    }

    /// States reachable from `state` in one step, in relation order.
    pub fn successors(&self, state: &KripkeState) -> Vec<&KripkeState> {
        let Some(from) = self.states.iter().position(|s| s.id == state.id) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|&(_, to)| &self.states[to])
            .collect()
    }

    /// Edges as (from, to) state pairs.
    pub fn relation(&self) -> impl Iterator<Item = (&KripkeState, &KripkeState)> {
        self.edges
            .iter()
            .map(|&(f, t)| (&self.states[f], &self.states[t]))
    }
}

impl Default for KripkeStructure {
    fn default() -> Self {
        Self::standard()
    }
}
