pub mod analyzer;
pub mod candidates;
pub mod evaluator;
pub mod explanation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::KnowledgeBase;
use crate::chord::parse_progression;
use crate::tonality::Tonality;
use analyzer::ProgressionAnalyzer;
use explanation::{Explanation, KripkePath};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("The chord progression list is empty.")]
    EmptyProgression,
    #[error("None of the specified tonalities are known by the system.")]
    UnknownTonalities,
    #[error("No candidate tonality found where the final chord '{chord}' functions as a Tonic.")]
    NoTonicCandidate { chord: String },
}

/// A progression to analyze, optionally restricted to named tonalities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub chords: Vec<String>,
    #[serde(default, rename = "tonalities_to_test", skip_serializing_if = "Vec::is_empty")]
    pub tonalities: Vec<String>,
}

impl AnalysisRequest {
    pub fn new<S: AsRef<str>>(chords: &[S]) -> Self {
        Self {
            chords: chords.iter().map(|c| c.as_ref().to_string()).collect(),
            tonalities: Vec::new(),
        }
    }

    pub fn with_tonalities<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.tonalities = names.iter().map(|n| n.as_ref().to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub is_tonal_progression: bool,
    pub identified_tonality: Option<String>,
    pub explanation: Explanation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<KripkePath>,
    pub error: Option<String>,
}

impl AnalysisReport {
    fn error(err: AnalysisError) -> Self {
        Self {
            is_tonal_progression: false,
            identified_tonality: None,
            explanation: Explanation::new(),
            path: None,
            error: Some(err.to_string()),
        }
    }
}

/// Request → report boundary over a loaded knowledge base.
pub struct TonalAnalysisService<'a> {
    kb: &'a KnowledgeBase,
    max_depth: usize,
}

impl<'a> TonalAnalysisService<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self {
            kb,
            max_depth: evaluator::MAX_RECURSION_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Tonalities to test: the named ones that exist, or the whole catalog.
    fn tonalities_to_test(&self, names: &[String]) -> Result<Vec<&'a Tonality>, AnalysisError> {
        if names.is_empty() {
            return Ok(self.kb.tonalities().iter().collect());
        }
        let mut selected = Vec::new();
        for name in names {
            match self.kb.tonality(name) {
                Some(t) => selected.push(t),
                None => log::warn!("Unknown tonality '{}' ignored", name),
            }
        }
        if selected.is_empty() {
            return Err(AnalysisError::UnknownTonalities);
        }
        Ok(selected)
    }

    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisReport {
        let chords = parse_progression(&request.chords);
        if chords.is_empty() {
            return AnalysisReport::error(AnalysisError::EmptyProgression);
        }

        let ranked = match self
            .tonalities_to_test(&request.tonalities)
            .and_then(|allowed| candidates::rank_candidates(&chords, &allowed))
        {
            Ok(ranked) => ranked,
            Err(e) => {
                log::info!("{}", e);
                return AnalysisReport::error(e);
            }
        };

        let verdict = ProgressionAnalyzer::new(self.kb.structure(), self.kb.tonalities())
            .with_max_depth(self.max_depth)
            .check_tonal_progression(&chords, &ranked);

        AnalysisReport {
            is_tonal_progression: verdict.is_tonal,
            identified_tonality: verdict.tonality,
            explanation: verdict.explanation,
            path: verdict.path,
            error: None,
        }
    }
}
