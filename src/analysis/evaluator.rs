//! Recursive satisfaction search over the reversed chord sequence.
//!
//! A search node is a (state, tonality) pair plus the offset of the next
//! chord to explain. From each node the search tries, in order: direct
//! continuations inside the current tonality, pivot modulations into other
//! tonalities, and finally re-anchoring the unexplained tail in a fresh
//! tonality. The first derivation found is returned.
//!
//! Traces are kept in two append-only arenas (derivation steps and path
//! nodes) linked by parent index, so sibling branches share their common
//! prefix and never see each other's steps.

use std::collections::HashMap;

use crate::chord::Chord;
use crate::kripke::{KripkeState, KripkeStructure, TonalFunction};
use crate::tonality::Tonality;

use super::explanation::{DerivationStep, Explanation, KripkePath, PathStep, Rule};

/// Default bound on recursion depth.
pub const MAX_RECURSION_DEPTH: usize = 25;

/// Hard ceiling for a configured depth bound.
pub const DEPTH_CEILING: usize = 256;

/// Next move out of a search node.
#[derive(Debug, Clone, Copy)]
enum Hypothesis<'a> {
    /// Move to a successor of the current state in the same tonality.
    Continuation {
        state: &'a KripkeState,
        tonality: &'a Tonality,
    },
    /// The chord is tonic in another key; continue from a successor of the
    /// tonic state there.
    Pivot {
        state: &'a KripkeState,
        tonality: &'a Tonality,
    },
    /// Restart the unexplained tail at the tonic state of a tonality.
    Reanchor {
        state: &'a KripkeState,
        tonality: &'a Tonality,
    },
}

impl<'a> Hypothesis<'a> {
    fn target(&self) -> (&'a KripkeState, &'a Tonality) {
        match *self {
            Hypothesis::Continuation { state, tonality }
            | Hypothesis::Pivot { state, tonality }
            | Hypothesis::Reanchor { state, tonality } => (state, tonality),
        }
    }

    fn path_note(&self) -> String {
        match self {
            Hypothesis::Continuation { state, .. } => {
                format!("Direct transition to {}", state.function)
            }
            Hypothesis::Pivot { state, tonality } => {
                format!("Transition to {} in {}", state.function, tonality.name())
            }
            Hypothesis::Reanchor { tonality, .. } => format!("Re-anchoring in {}", tonality.name()),
        }
    }
}

/// A hypothesis and the derivation step that justifies it.
struct Child<'a> {
    hypothesis: Hypothesis<'a>,
    step: usize,
}

struct StepNode {
    step: DerivationStep,
    parent: Option<usize>,
}

struct PathNode<'a> {
    state: &'a KripkeState,
    tonality: &'a Tonality,
    note: String,
    parent: Option<usize>,
}

/// Tips of the step log and the path log for one search node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    step: Option<usize>,
    path: usize,
}

/// Offset reached and the step tip at that point.
type Reach = (usize, Option<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey<'a> {
    state: &'a str,
    tonality: &'a str,
    offset: usize,
    depth: usize,
    anchored: bool,
}

/// Outcome of a fully explored node, relative to the cursor it was entered at.
#[derive(Debug, Clone, Copy)]
enum Cached {
    Solved { base: Cursor, witness: Cursor },
    Failed { base: Option<usize>, reach: Reach },
}

/// Result of one `evaluate` call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub satisfied: bool,
    pub explanation: Explanation,
    /// Witness route; only present when satisfied.
    pub path: Option<KripkePath>,
}

pub struct SatisfactionEvaluator<'a> {
    structure: &'a KripkeStructure,
    /// Pivot candidates: ranked tonalities first, then the rest of the catalog.
    pivot_order: Vec<&'a Tonality>,
    /// Re-anchoring candidates: primary first, then the rest of the catalog.
    reanchor_order: Vec<&'a Tonality>,
    catalog: &'a [Tonality],
    max_depth: usize,
    steps: Vec<StepNode>,
    paths: Vec<PathNode<'a>>,
    cache: HashMap<CacheKey<'a>, Cached>,
    sequence: Vec<Chord>,
    furthest: Option<Reach>,
}

fn dedup_by_name<'a>(tonalities: impl IntoIterator<Item = &'a Tonality>) -> Vec<&'a Tonality> {
    let mut out: Vec<&Tonality> = Vec::new();
    for t in tonalities {
        if !out.iter().any(|o| o.name() == t.name()) {
            out.push(t);
        }
    }
    out
}

impl<'a> SatisfactionEvaluator<'a> {
    pub fn new(structure: &'a KripkeStructure, catalog: &'a [Tonality], primary: &'a Tonality) -> Self {
        Self {
            structure,
            pivot_order: dedup_by_name(catalog),
            reanchor_order: dedup_by_name(std::iter::once(primary).chain(catalog)),
            catalog,
            max_depth: MAX_RECURSION_DEPTH,
            steps: Vec::new(),
            paths: Vec::new(),
            cache: HashMap::new(),
            sequence: Vec::new(),
            furthest: None,
        }
    }

    /// Try these tonalities first when looking for pivots.
    pub fn with_ranked(mut self, ranked: &[&'a Tonality]) -> Self {
        self.pivot_order = dedup_by_name(ranked.iter().copied().chain(self.catalog));
        self.reset();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(DEPTH_CEILING);
        self.reset();
        self
    }

    fn reset(&mut self) {
        self.steps.clear();
        self.paths.clear();
        self.cache.clear();
        self.sequence.clear();
        self.furthest = None;
    }

    /// Decide whether `reversed` (last chord first) can be explained starting
    /// at `state` in `tonality`. The steps of `prelude` head the returned trace.
    ///
    /// Results of explored nodes are kept between calls on the same sequence.
    pub fn evaluate(
        &mut self,
        tonality: &'a Tonality,
        state: &'a KripkeState,
        reversed: &[Chord],
        prelude: Explanation,
    ) -> Evaluation {
        if self.sequence.as_slice() != reversed {
            self.reset();
            self.sequence = reversed.to_vec();
        }
        self.furthest = None;

        let mut tip = None;
        for step in prelude.steps {
            tip = Some(self.push_step(tip, step));
        }
        self.paths.push(PathNode {
            state,
            tonality,
            note: format!("Starting analysis in {}", tonality.name()),
            parent: None,
        });
        let root = Cursor {
            step: tip,
            path: self.paths.len() - 1,
        };

        let sequence = std::mem::take(&mut self.sequence);
        let outcome = self.search(&sequence, root, 0, 0, false);
        self.sequence = sequence;

        match outcome {
            Some(witness) => Evaluation {
                satisfied: true,
                explanation: self.collect_steps(witness.step),
                path: Some(self.collect_path(witness.path)),
            },
            None => {
                let tip = self.furthest.map_or(root.step, |(_, step)| step);
                Evaluation {
                    satisfied: false,
                    explanation: self.collect_steps(tip),
                    path: None,
                }
            }
        }
    }

    fn search(&mut self, seq: &[Chord], at: Cursor, offset: usize, depth: usize, anchored: bool) -> Option<Cursor> {
        if depth > self.max_depth {
            log::trace!("Depth bound {} reached at chord {}", self.max_depth, offset);
            return None;
        }

        let node = &self.paths[at.path];
        let (state, tonality) = (node.state, node.tonality);
        let key = CacheKey {
            state: state.id.as_str(),
            tonality: tonality.name(),
            offset,
            depth,
            anchored,
        };

        if let Some(&cached) = self.cache.get(&key) {
            return match cached {
                Cached::Solved { base, witness } => Some(self.graft(base, witness, at)),
                Cached::Failed { base, reach } => {
                    if self.furthest.is_none_or(|(o, _)| reach.0 > o) {
                        let step = self.graft_steps(base, reach.1, at.step);
                        self.furthest = Some((reach.0, step));
                    }
                    None
                }
            };
        }

        let outer = self.furthest.replace((offset, at.step));
        let outcome = self.expand(seq, at, state, tonality, offset, depth, anchored);
        let reach = self.furthest.unwrap_or((offset, at.step));
        self.furthest = match outer {
            Some(o) if o.0 >= reach.0 => Some(o),
            _ => Some(reach),
        };

        let cached = match outcome {
            Some(witness) => Cached::Solved { base: at, witness },
            None => Cached::Failed { base: at.step, reach },
        };
        self.cache.insert(key, cached);
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &mut self,
        seq: &[Chord],
        at: Cursor,
        state: &'a KripkeState,
        tonality: &'a Tonality,
        offset: usize,
        depth: usize,
        anchored: bool,
    ) -> Option<Cursor> {
        let Some(chord) = seq.get(offset) else {
            let step = self.push_step(
                at.step,
                DerivationStep::new(Rule::EndOfSequence, "End of sequence reached; every chord has been explained."),
            );
            return Some(Cursor {
                step: Some(step),
                path: at.path,
            });
        };

        log::trace!("{} at {} in {} (depth {})", chord, state, tonality, depth);

        let mut children = self.continuations(chord, at, state, tonality);
        let continuations = children.len();
        children.extend(self.pivots(chord, seq.get(offset + 1), at, state, tonality));
        log::debug!(
            "{}: {} continuation(s), {} pivot(s) from {} in {}",
            chord,
            continuations,
            children.len() - continuations,
            state,
            tonality
        );

        for child in children {
            let path = self.push_path(at.path, &child.hypothesis);
            let next = Cursor {
                step: Some(child.step),
                path,
            };
            if let Some(witness) = self.search(seq, next, offset + 1, depth + 1, false) {
                return Some(witness);
            }
        }

        // A node that is itself a re-anchor already sits inside a loop over
        // every tonality at this offset with more depth left.
        if anchored {
            return None;
        }
        self.reanchor(seq, at, offset, depth)
    }

    /// "P in L": the chord fulfills the current state's function and the
    /// search moves on to each successor. Failing that, a chord that fulfills
    /// a successor's function is taken at that successor.
    fn continuations(
        &mut self,
        chord: &Chord,
        at: Cursor,
        state: &'a KripkeState,
        tonality: &'a Tonality,
    ) -> Vec<Child<'a>> {
        let structure = self.structure;
        let successors = structure.successors(state);

        if tonality.chord_fulfills_function(chord, state.function) {
            let step = self.push_step(at.step, Self::match_step(chord, state, tonality));
            return successors
                .into_iter()
                .map(|next| Child {
                    hypothesis: Hypothesis::Continuation {
                        state: next,
                        tonality,
                    },
                    step,
                })
                .collect();
        }

        let mut children = Vec::new();
        for next in successors {
            if !tonality.chord_fulfills_function(chord, next.function) {
                continue;
            }
            let step = self.push_step(at.step, Self::match_step(chord, next, tonality));
            children.push(Child {
                hypothesis: Hypothesis::Continuation {
                    state: next,
                    tonality,
                },
                step,
            });
        }
        children
    }

    fn match_step(chord: &Chord, state: &KripkeState, tonality: &Tonality) -> DerivationStep {
        DerivationStep::new(
            Rule::ChordInTonality,
            format!(
                "Chord '{}' fulfills the {} function in '{}'.",
                chord,
                state.function,
                tonality.name()
            ),
        )
        .chord(chord)
        .tonality(tonality.name())
        .state(state)
    }

    /// Tonalities where the chord is tonic and that it can modulate into:
    /// either it already has a function here, or the next chord is the new
    /// key's dominant.
    fn pivots(
        &mut self,
        chord: &Chord,
        next: Option<&Chord>,
        at: Cursor,
        state: &'a KripkeState,
        tonality: &'a Tonality,
    ) -> Vec<Child<'a>> {
        let structure = self.structure;
        let Some(tonic) = structure.state_for_function(TonalFunction::Tonic) else {
            return Vec::new();
        };
        let successors = structure.successors(tonic);
        let functions_here = tonality.functions_of(chord);

        let mut children = Vec::new();
        let order = self.pivot_order.clone();
        for &target in &order {
            if target.name() == tonality.name() || !target.chord_fulfills_function(chord, TonalFunction::Tonic) {
                continue;
            }
            let reinforced = next.is_some_and(|n| target.chord_fulfills_function(n, TonalFunction::Dominant));
            if functions_here.is_empty() && !reinforced {
                continue;
            }

            let role = if functions_here.is_empty() {
                "a transitional role".to_string()
            } else {
                functions_here.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
            };
            let step = self.push_step(
                at.step,
                DerivationStep::new(
                    Rule::PivotModulation,
                    format!(
                        "Chord '{}' acts as pivot. It has function '{}' in '{}' and becomes the new TONIC in '{}'. (Reinforced by next chord: {})",
                        chord,
                        role,
                        tonality.name(),
                        target.name(),
                        reinforced
                    ),
                )
                .chord(chord)
                .tonality(tonality.name())
                .state(state),
            );
            children.extend(successors.iter().map(|&next_state| Child {
                hypothesis: Hypothesis::Pivot {
                    state: next_state,
                    tonality: target,
                },
                step,
            }));
        }
        children
    }

    /// Restart the tail at `offset` at the tonic state, primary tonality first.
    fn reanchor(&mut self, seq: &[Chord], at: Cursor, offset: usize, depth: usize) -> Option<Cursor> {
        let structure = self.structure;
        let tonic = structure.state_for_function(TonalFunction::Tonic)?;
        let remaining = seq[offset..]
            .iter()
            .map(Chord::symbol)
            .collect::<Vec<_>>()
            .join(", ");

        let order = self.reanchor_order.clone();
        for &target in &order {
            let step = self.push_step(
                at.step,
                DerivationStep::new(
                    Rule::Reanchor,
                    format!("Re-anchoring the remaining chords [{}] in '{}'.", remaining, target.name()),
                )
                .tonality(target.name())
                .state(tonic),
            );
            let hypothesis = Hypothesis::Reanchor {
                state: tonic,
                tonality: target,
            };
            let path = self.push_path(at.path, &hypothesis);
            let next = Cursor { step: Some(step), path };
            if let Some(witness) = self.search(seq, next, offset, depth + 1, true) {
                return Some(witness);
            }
        }
        None
    }

    fn push_step(&mut self, parent: Option<usize>, step: DerivationStep) -> usize {
        self.steps.push(StepNode { step, parent });
        self.steps.len() - 1
    }

    fn push_path(&mut self, parent: usize, hypothesis: &Hypothesis<'a>) -> usize {
        let (state, tonality) = hypothesis.target();
        self.paths.push(PathNode {
            state,
            tonality,
            note: hypothesis.path_note(),
            parent: Some(parent),
        });
        self.paths.len() - 1
    }

    /// Replay the steps between `base` (exclusive) and `tip` onto `onto`.
    fn graft_steps(&mut self, base: Option<usize>, tip: Option<usize>, onto: Option<usize>) -> Option<usize> {
        let mut chain = Vec::new();
        let mut cur = tip;
        while cur != base {
            let Some(i) = cur else { break };
            chain.push(i);
            cur = self.steps[i].parent;
        }
        let mut out = onto;
        for &i in chain.iter().rev() {
            let step = self.steps[i].step.clone();
            out = Some(self.push_step(out, step));
        }
        out
    }

    /// Replay a cached witness recorded from `base` onto the cursor `onto`.
    fn graft(&mut self, base: Cursor, witness: Cursor, onto: Cursor) -> Cursor {
        let step = self.graft_steps(base.step, witness.step, onto.step);

        let mut chain = Vec::new();
        let mut cur = Some(witness.path);
        while cur != Some(base.path) {
            let Some(i) = cur else { break };
            chain.push(i);
            cur = self.paths[i].parent;
        }
        let mut path = onto.path;
        for &i in chain.iter().rev() {
            let node = &self.paths[i];
            let copy = PathNode {
                state: node.state,
                tonality: node.tonality,
                note: node.note.clone(),
                parent: Some(path),
            };
            self.paths.push(copy);
            path = self.paths.len() - 1;
        }
        Cursor { step, path }
    }

    fn collect_steps(&self, tip: Option<usize>) -> Explanation {
        let mut steps = Vec::new();
        let mut cur = tip;
        while let Some(i) = cur {
            steps.push(self.steps[i].step.clone());
            cur = self.steps[i].parent;
        }
        steps.reverse();
        Explanation { steps }
    }

    fn collect_path(&self, tip: usize) -> KripkePath {
        let mut steps = Vec::new();
        let mut cur = Some(tip);
        while let Some(i) = cur {
            let node = &self.paths[i];
            steps.push(PathStep {
                state: node.state.clone(),
                tonality: node.tonality.name().to_string(),
                note: node.note.clone(),
            });
            cur = node.parent;
        }
        steps.reverse();
        KripkePath { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::generate::{major, minor};
    use crate::chord::parse_progression;
    use crate::tonality::ScaleOrigin;

    fn reversed(symbols: &[&str]) -> Vec<Chord> {
        let mut chords = parse_progression(symbols);
        chords.reverse();
        chords
    }

    fn start() -> Explanation {
        let mut exp = Explanation::new();
        exp.add_step(DerivationStep::new(Rule::AnalysisStart, "test"));
        exp
    }

    fn g_minor() -> Tonality {
        Tonality::new("G minor")
            .with_chords(TonalFunction::Tonic, &["Gm", "Bb"], ScaleOrigin::Natural)
            .with_chords(TonalFunction::Dominant, &["D", "D7"], ScaleOrigin::Harmonic)
            .with_chords(TonalFunction::Subdominant, &["Cm", "Eb"], ScaleOrigin::Natural)
    }

    #[test]
    fn test_pivot_then_reanchor() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap(), minor("D").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["Em", "A7", "Dm", "G", "C"]), start());
        assert!(result.satisfied);
        assert_eq!(
            result.explanation.rules(),
            vec![
                Rule::AnalysisStart,
                Rule::ChordInTonality,
                Rule::ChordInTonality,
                Rule::PivotModulation,
                Rule::ChordInTonality,
                Rule::Reanchor,
                Rule::ChordInTonality,
                Rule::EndOfSequence,
            ]
        );

        let pivot = &result.explanation.steps[3];
        assert_eq!(pivot.processed_chord.as_ref().unwrap().symbol(), "Dm");
        assert!(pivot.observation.contains("'SUBDOMINANT' in 'C Major'"));
        assert!(pivot.observation.contains("new TONIC in 'D minor'"));

        let a7 = result.explanation.steps_for("A7").next().unwrap();
        assert_eq!(a7.tonality.as_deref(), Some("D minor"));
        assert_eq!(a7.evaluated_state.as_ref().unwrap().function, TonalFunction::Dominant);

        assert_eq!(result.explanation.steps[5].tonality.as_deref(), Some("C Major"));
        assert_eq!(
            result.explanation.steps[6].processed_chord.as_ref().unwrap().symbol(),
            "Em"
        );

        let path = result.path.unwrap();
        assert_eq!(path.tonalities(), vec!["C Major", "D minor", "C Major"]);
        assert_eq!(path.steps[0].note, "Starting analysis in C Major");
        assert_eq!(path.steps.len(), 7);
    }

    #[test]
    fn test_reanchor_in_same_key() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["C", "G", "C"]), start());
        assert!(result.satisfied);
        assert_eq!(
            result.explanation.rules(),
            vec![
                Rule::AnalysisStart,
                Rule::ChordInTonality,
                Rule::ChordInTonality,
                Rule::Reanchor,
                Rule::ChordInTonality,
                Rule::EndOfSequence,
            ]
        );
        let last_match = &result.explanation.steps[4];
        assert_eq!(last_match.evaluated_state.as_ref().unwrap().function, TonalFunction::Tonic);
    }

    #[test]
    fn test_reinforced_pivot_without_function_in_old_key() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap(), g_minor()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["D", "Gm", "G", "C"]), start());
        assert!(result.satisfied);
        let pivot = result
            .explanation
            .steps
            .iter()
            .find(|s| s.rule == Rule::PivotModulation)
            .unwrap();
        assert!(pivot.observation.contains("a transitional role"));
        assert!(pivot.observation.contains("Reinforced by next chord: true"));
        let d = result.explanation.steps_for("D").next().unwrap();
        assert_eq!(d.tonality.as_deref(), Some("G minor"));
        assert!(!result.explanation.rules().contains(&Rule::Reanchor));
    }

    #[test]
    fn test_unreinforced_chord_is_reanchored_instead() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap(), g_minor()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["Gm", "G", "C"]), start());
        assert!(result.satisfied);
        assert_eq!(
            result.explanation.rules(),
            vec![
                Rule::AnalysisStart,
                Rule::ChordInTonality,
                Rule::ChordInTonality,
                Rule::Reanchor,
                Rule::ChordInTonality,
                Rule::EndOfSequence,
            ]
        );
        assert_eq!(result.explanation.steps[3].tonality.as_deref(), Some("G minor"));
    }

    #[test]
    fn test_foreign_final_chord_fails() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["Dm", "F#"]), start());
        assert!(!result.satisfied);
        assert!(result.path.is_none());
        assert_eq!(result.explanation.rules(), vec![Rule::AnalysisStart]);
    }

    #[test]
    fn test_chord_taken_at_successor_state() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        // F is not dominant, but s_d leads to s_sd where it is subdominant
        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["F", "C"]), start());
        assert!(result.satisfied);
        assert_eq!(
            result.explanation.rules(),
            vec![
                Rule::AnalysisStart,
                Rule::ChordInTonality,
                Rule::ChordInTonality,
                Rule::EndOfSequence,
            ]
        );
        let f = result.explanation.steps_for("F").next().unwrap();
        assert_eq!(f.evaluated_state.as_ref().unwrap().id, "s_sd");

        let path = result.path.unwrap();
        let states: Vec<&str> = path.steps.iter().map(|s| s.state.id.as_str()).collect();
        assert_eq!(states, vec!["s_t", "s_d", "s_sd"]);
        assert_eq!(path.steps[2].note, "Direct transition to SUBDOMINANT");

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["F", "G", "C"]), start());
        assert!(result.satisfied);
        assert!(!result.explanation.rules().contains(&Rule::PivotModulation));
    }

    #[test]
    fn test_deep_failure_does_not_hide_shallow_success() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap(), major("G").unwrap()];
        let tonic = k.state("s_t").unwrap();
        // (s_d, C Major, chord 2) is first reached through a re-anchor one
        // level too deep, then through two pivots within the bound.
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]).with_max_depth(3);

        let result = ev.evaluate(&catalog[0], tonic, &reversed(&["G", "C", "G"]), start());
        assert!(result.satisfied);
        assert_eq!(
            result.explanation.rules(),
            vec![
                Rule::AnalysisStart,
                Rule::PivotModulation,
                Rule::PivotModulation,
                Rule::ChordInTonality,
                Rule::EndOfSequence,
            ]
        );
        assert_eq!(
            result.path.unwrap().tonalities(),
            vec!["C Major", "G Major", "C Major"]
        );
    }

    #[test]
    fn test_depth_bound_fails_cleanly() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let chords = vec!["C"; 40];

        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);
        let result = ev.evaluate(&catalog[0], tonic, &reversed(&chords), start());
        assert!(!result.satisfied);
        // The failure trace shows how far the search got
        assert!(result.explanation.len() > 10);
        assert!(result.explanation.rules().contains(&Rule::Reanchor));

        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]).with_max_depth(100);
        let result = ev.evaluate(&catalog[0], tonic, &reversed(&chords), start());
        assert!(result.satisfied);
        let matched = result
            .explanation
            .rules()
            .into_iter()
            .filter(|r| *r == Rule::ChordInTonality)
            .count();
        assert_eq!(matched, 40);
    }

    #[test]
    fn test_max_depth_is_clamped() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]).with_max_depth(10_000);
        assert_eq!(ev.max_depth, DEPTH_CEILING);
    }

    #[test]
    fn test_repeat_evaluation_replays_cached_results() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap(), minor("D").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let seq = reversed(&["Em", "A7", "Dm", "G", "C"]);
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let first = ev.evaluate(&catalog[0], tonic, &seq, start());
        let mut other_prelude = start();
        other_prelude.add_step(DerivationStep::new(Rule::AnalysisStart, "again"));
        let second = ev.evaluate(&catalog[0], tonic, &seq, other_prelude);

        assert!(second.satisfied);
        assert_eq!(second.explanation.len(), first.explanation.len() + 1);
        assert_eq!(&second.explanation.rules()[2..], &first.explanation.rules()[1..]);
        assert_eq!(
            second.path.unwrap().tonalities(),
            first.path.unwrap().tonalities()
        );
    }

    #[test]
    fn test_repeat_failure_keeps_its_trace() {
        let k = KripkeStructure::standard();
        let catalog = vec![major("C").unwrap()];
        let tonic = k.state("s_t").unwrap();
        let seq = reversed(&["E", "G", "C"]);
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);

        let first = ev.evaluate(&catalog[0], tonic, &seq, start());
        let second = ev.evaluate(&catalog[0], tonic, &seq, start());
        assert!(!first.satisfied);
        assert!(!second.satisfied);
        assert_eq!(first.explanation.rules(), second.explanation.rules());
        assert!(first.explanation.len() > 1);
    }

    #[test]
    fn test_ranked_tonalities_are_tried_first() {
        let k = KripkeStructure::standard();
        // Dm is tonic in D minor, F Major and A# Major
        let catalog = vec![
            major("C").unwrap(),
            minor("D").unwrap(),
            major("F").unwrap(),
        ];
        let tonic = k.state("s_t").unwrap();
        let seq = reversed(&["Dm", "G", "C"]);

        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]);
        let result = ev.evaluate(&catalog[0], tonic, &seq, start());
        let pivot = result.explanation.steps.iter().find(|s| s.rule == Rule::PivotModulation).unwrap();
        assert!(pivot.observation.contains("'D minor'"));

        let ranked = [&catalog[2]];
        let mut ev = SatisfactionEvaluator::new(&k, &catalog, &catalog[0]).with_ranked(&ranked);
        let result = ev.evaluate(&catalog[0], tonic, &seq, start());
        let pivot = result.explanation.steps.iter().find(|s| s.rule == Rule::PivotModulation).unwrap();
        assert!(pivot.observation.contains("'F Major'"));
    }
}
