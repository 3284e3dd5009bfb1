use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;
use thiserror::Error;

use crate::analysis::{AnalysisReport, AnalysisRequest, TonalAnalysisService};
use crate::catalog::KnowledgeBase;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One progression from the input and its report.
pub struct BatchItem {
    /// 1-based line number in the input.
    pub line: usize,
    pub chords: Vec<String>,
    pub report: AnalysisReport,
}

pub struct BatchOptions<'a> {
    pub jobs: usize,
    pub tonalities: &'a [String],
    pub max_depth: usize,
    pub progress: bool,
}

pub struct BatchSummary {
    pub total: usize,
    pub tonal: usize,
    pub errors: usize,
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

/// Cut a trailing comment. A `#` only opens a comment at the start of a
/// token, so sharps such as "F#m" survive.
fn strip_comment(line: &str) -> &str {
    let mut prev: Option<char> = None;
    for (i, c) in line.char_indices() {
        if c == '#' && prev.is_none_or(is_separator) {
            return &line[..i];
        }
        prev = Some(c);
    }
    line
}

/// Parse one progression per line. Chords are separated by whitespace or
/// commas; blank lines and `#` comments are skipped.
pub fn parse_progressions(text: &str) -> Vec<(usize, Vec<String>)> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let chords: Vec<String> = strip_comment(line)
                .split(is_separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            (!chords.is_empty()).then_some((i + 1, chords))
        })
        .collect()
}

/// Analyze progressions in parallel, one evaluator per progression.
/// Results come back in input order.
pub fn analyze_progressions(
    kb: &KnowledgeBase,
    progressions: Vec<(usize, Vec<String>)>,
    options: &BatchOptions,
) -> Result<Vec<BatchItem>, BatchError> {
    if progressions.is_empty() {
        log::info!("No progressions to analyze");
        return Ok(Vec::new());
    }

    log::info!(
        "Analyzing {} progressions with {} workers",
        progressions.len(),
        options.jobs
    );

    let pb = if options.progress {
        ProgressBar::new(progressions.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()?;

    let service = TonalAnalysisService::new(kb).with_max_depth(options.max_depth);
    let items: Vec<BatchItem> = pool.install(|| {
        progressions
            .into_par_iter()
            .map(|(line, chords)| {
                let request = AnalysisRequest {
                    chords,
                    tonalities: options.tonalities.to_vec(),
                };
                let report = service.analyze(&request);
                log::debug!(
                    "Line {}: {}",
                    line,
                    if report.is_tonal_progression { "tonal" } else { "not tonal" }
                );
                pb.inc(1);
                BatchItem {
                    line,
                    chords: request.chords,
                    report,
                }
            })
            .collect()
    });

    let summary = summarize(&items);
    pb.finish_with_message(format!("Done: {} tonal, {} not tonal", summary.tonal, summary.total - summary.tonal));

    Ok(items)
}

/// Read `path` and analyze every progression in it.
pub fn analyze_file(
    path: &Path,
    kb: &KnowledgeBase,
    options: &BatchOptions,
) -> Result<Vec<BatchItem>, BatchError> {
    let text = std::fs::read_to_string(path).map_err(|e| BatchError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    analyze_progressions(kb, parse_progressions(&text), options)
}

pub fn summarize(items: &[BatchItem]) -> BatchSummary {
    BatchSummary {
        total: items.len(),
        tonal: items.iter().filter(|i| i.report.is_tonal_progression).count(),
        errors: items.iter().filter(|i| i.report.error.is_some()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(tonalities: &[String]) -> BatchOptions<'_> {
        BatchOptions {
            jobs: 2,
            tonalities,
            max_depth: crate::analysis::evaluator::MAX_RECURSION_DEPTH,
            progress: false,
        }
    }

    #[test]
    fn test_parse_progressions() {
        let text = "# standards\nC G C\n\nEm, A7, Dm G C  # pivot\n   \nX7alt\nF#m,C#m #tail\n";
        let parsed = parse_progressions(text);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0], (2, vec!["C".to_string(), "G".into(), "C".into()]));
        assert_eq!(parsed[1].0, 4);
        assert_eq!(parsed[1].1, vec!["Em", "A7", "Dm", "G", "C"]);
        assert_eq!(parsed[2], (6, vec!["X7alt".to_string()]));
        assert_eq!(parsed[3].1, vec!["F#m", "C#m"]);
    }

    #[test]
    fn test_results_keep_input_order() {
        let kb = KnowledgeBase::builtin();
        let text = "C G C\nX7alt\nEm A7 Dm G C\nAm Dm E Am\nC F G C\n";
        let items = analyze_progressions(&kb, parse_progressions(text), &options(&[])).unwrap();

        let lines: Vec<usize> = items.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5]);
        assert!(items[0].report.is_tonal_progression);
        assert!(!items[1].report.is_tonal_progression);
        assert!(items[1].report.error.is_some());
        assert_eq!(items[2].chords[2], "Dm");

        let summary = summarize(&items);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.errors, 1);
        assert!(summary.tonal >= 3);
    }

    #[test]
    fn test_restriction_applies_to_every_line() {
        let kb = KnowledgeBase::builtin();
        let keys = vec!["A minor".to_string()];
        let items = analyze_progressions(&kb, parse_progressions("Dm E Am\nG C"), &options(&keys)).unwrap();
        for item in &items {
            assert_eq!(item.report.identified_tonality.as_deref(), Some("A minor"));
        }
    }

    #[test]
    fn test_analyze_file() {
        let dir = std::env::temp_dir().join(format!("tonalogy-batch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("progressions.txt");
        std::fs::write(&path, "C G C\nG C\n").unwrap();

        let kb = KnowledgeBase::builtin();
        let items = analyze_file(&path, &kb, &options(&[])).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.report.is_tonal_progression));

        let missing = analyze_file(&dir.join("missing.txt"), &kb, &options(&[]));
        assert!(matches!(missing, Err(BatchError::Io { .. })));

        std::fs::remove_dir_all(&dir).ok();
    }
}
