use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tonalogy::analysis::explanation::Explanation;
use tonalogy::analysis::{AnalysisReport, AnalysisRequest, TonalAnalysisService};
use tonalogy::catalog::{self, KnowledgeBase};
use tonalogy::chord::to_unicode_symbols;
use tonalogy::kripke::TonalFunction;

#[derive(Parser)]
#[command(name = "tonalogy", version, about = "Tonal progression analyzer")]
struct Cli {
    /// Kripke structure JSON file (defaults to the built-in structure)
    #[arg(long, global = true)]
    kripke: Option<PathBuf>,

    /// Tonality catalog JSON file (defaults to the generated 24 keys)
    #[arg(long, global = true)]
    tonalities: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a chord progression is tonal and show the derivation
    Analyze {
        /// Chord symbols in performance order
        #[arg(required = true)]
        chords: Vec<String>,

        /// Only consider this tonality (repeatable)
        #[arg(short = 'k', long = "key")]
        keys: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Display accidentals as ♯ and ♭
        #[arg(long)]
        unicode: bool,

        /// Recursion depth bound (defaults to config, then 25)
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Analyze a file of progressions, one per line
    Batch {
        /// Input file; chords separated by spaces or commas, `#` starts a comment
        file: PathBuf,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Print one JSON report per line
        #[arg(long)]
        json: bool,
    },

    /// List the known tonalities and their harmonic fields
    Tonalities {
        /// Only show tonalities whose name contains this (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Write the built-in catalog as JSON files
    Generate {
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = tonalogy::config::AppConfig::load();

    // Resolve catalog paths: CLI > config > built-in
    let kripke_path = cli.kripke.or(config.kripke_path.clone());
    let tonalities_path = cli.tonalities.or(config.tonalities_path.clone());
    let load_kb = || -> Result<KnowledgeBase> {
        let kb = KnowledgeBase::load(kripke_path.as_deref(), tonalities_path.as_deref())
            .context("Failed to load tonal knowledge base")?;
        log::info!(
            "Knowledge base: {} states, {} tonalities",
            kb.structure().states().len(),
            kb.tonalities().len()
        );
        Ok(kb)
    };

    match cli.command {
        Commands::Analyze {
            chords,
            keys,
            json,
            unicode,
            max_depth,
        } => {
            let kb = load_kb()?;
            let keys = if keys.is_empty() { config.tonalities.clone() } else { keys };
            let max_depth = max_depth.unwrap_or_else(|| config.engine.max_depth());
            let request = AnalysisRequest::new(&chords).with_tonalities(&keys);
            let report = TonalAnalysisService::new(&kb)
                .with_max_depth(max_depth)
                .analyze(&request);

            if json {
                let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
                println!("{}", out);
            } else {
                print_report(&chords, &report, unicode);
            }
        }

        Commands::Batch { file, jobs, json } => {
            let kb = load_kb()?;
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let options = tonalogy::batch::BatchOptions {
                jobs: workers,
                tonalities: &config.tonalities,
                max_depth: config.engine.max_depth(),
                progress: !json,
            };
            let items = tonalogy::batch::analyze_file(&file, &kb, &options).context("Batch analysis failed")?;

            if json {
                for item in &items {
                    let out = serde_json::to_string(&item.report).context("Failed to serialize report")?;
                    println!("{}", out);
                }
            } else {
                println!("{:>5}  {:<6} {:<14} Progression", "Line", "Tonal", "Tonality");
                println!("{}", "-".repeat(60));
                for item in &items {
                    let tonality = item
                        .report
                        .identified_tonality
                        .as_deref()
                        .or(item.report.error.as_ref().map(|_| "(error)"))
                        .unwrap_or("-");
                    println!(
                        "{:>5}  {:<6} {:<14} {}",
                        item.line,
                        if item.report.is_tonal_progression { "yes" } else { "no" },
                        tonality,
                        item.chords.join(" ")
                    );
                }
                let summary = tonalogy::batch::summarize(&items);
                println!();
                println!(
                    "Batch complete: {} progressions, {} tonal, {} not tonal, {} errors",
                    summary.total,
                    summary.tonal,
                    summary.total - summary.tonal,
                    summary.errors
                );
            }
        }

        Commands::Tonalities { filter } => {
            let kb = load_kb()?;
            let needle = filter.map(|f| f.to_lowercase());
            let shown: Vec<_> = kb
                .tonalities()
                .iter()
                .filter(|t| needle.as_ref().is_none_or(|n| t.name().to_lowercase().contains(n)))
                .collect();

            if shown.is_empty() {
                println!("No tonalities found.");
                return Ok(());
            }

            println!("{:<12} {:<22} {:<22} {:<22}", "Tonality", "Tonic", "Dominant", "Subdominant");
            println!("{}", "-".repeat(80));
            for t in shown {
                let field = |f: TonalFunction| {
                    t.chords_for(f)
                        .iter()
                        .map(|c| c.chord.symbol())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                println!(
                    "{:<12} {:<22} {:<22} {:<22}",
                    t.name(),
                    field(TonalFunction::Tonic),
                    field(TonalFunction::Dominant),
                    field(TonalFunction::Subdominant)
                );
            }
        }

        Commands::Generate { out_dir } => generate(&out_dir)?,
    }

    Ok(())
}

fn generate(out_dir: &std::path::Path) -> Result<()> {
    let kb = KnowledgeBase::builtin();
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let kripke_file = out_dir.join("kripke_structure.json");
    let json = catalog::kripke_to_json(kb.structure()).context("Failed to serialize Kripke structure")?;
    std::fs::write(&kripke_file, json).with_context(|| format!("Failed to write {}", kripke_file.display()))?;

    let tonalities_file = out_dir.join("tonalities.json");
    let json = catalog::tonalities_to_json(kb.tonalities()).context("Failed to serialize tonalities")?;
    std::fs::write(&tonalities_file, json)
        .with_context(|| format!("Failed to write {}", tonalities_file.display()))?;

    println!(
        "Generate complete: {} and {} ({} tonalities)",
        kripke_file.display(),
        tonalities_file.display(),
        kb.tonalities().len()
    );
    Ok(())
}

fn print_report(chords: &[String], report: &AnalysisReport, unicode: bool) {
    let display = |symbol: &str| {
        if unicode {
            to_unicode_symbols(symbol)
        } else {
            symbol.to_string()
        }
    };

    println!(
        "Progression: {}",
        chords.iter().map(|c| display(c.as_str())).collect::<Vec<_>>().join(" ")
    );

    if let Some(err) = &report.error {
        println!("Not tonal: {}", err);
        return;
    }

    match &report.identified_tonality {
        Some(t) => println!("Tonal in {}", t),
        None => println!("Not tonal"),
    }
    println!();
    print_explanation(&report.explanation, &display);

    if let Some(path) = &report.path {
        println!();
        println!("Path: {}", path.tonalities().join(" -> "));
    }
}

fn print_explanation(explanation: &Explanation, display: &dyn Fn(&str) -> String) {
    println!(
        "{:>3}  {:<26} {:<7} {:<10} {:<20}",
        "#", "Rule", "Chord", "Tonality", "State"
    );
    println!("{}", "-".repeat(80));
    for (i, step) in explanation.steps.iter().enumerate() {
        let chord = step
            .processed_chord
            .as_ref()
            .map(|c| display(c.symbol()))
            .unwrap_or_default();
        let state = step
            .evaluated_state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();
        println!(
            "{:>3}  {:<26} {:<7} {:<10} {:<20}",
            i + 1,
            step.rule.label(),
            chord,
            step.tonality.as_deref().unwrap_or(""),
            state
        );
        println!("     {}", step.observation);
    }
}
