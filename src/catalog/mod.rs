pub mod generate;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::chord::Chord;
use crate::kripke::{KripkeState, KripkeStructure, TonalFunction, UnknownState};
use crate::tonality::{ScaleOrigin, Tonality};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Error serializing {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid Kripke structure: {0}")]
    Structure(#[from] UnknownState),
    #[error("Tonality catalog is empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Kripke structure file layout.
#[derive(Debug, Serialize, Deserialize)]
struct KripkeRecord {
    states: Vec<KripkeState>,
    #[serde(default)]
    initial_states: Vec<String>,
    #[serde(default)]
    final_states: Vec<String>,
    accessibility_relation: Vec<EdgeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    from: String,
    to: String,
}

/// Chords under one function: either `{"C": "natural"}` or a bare `["C"]`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ChordListing {
    Tagged(BTreeMap<String, ScaleOrigin>),
    Plain(Vec<String>),
}

/// One entry of the tonality catalog file.
#[derive(Debug, Serialize, Deserialize)]
struct TonalityRecord {
    tonality_name: String,
    function_to_chords_map: BTreeMap<TonalFunction, ChordListing>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    primary_scale_notes: Vec<String>,
}

impl TonalityRecord {
    fn into_tonality(self) -> Tonality {
        let mut tonality = Tonality::new(&self.tonality_name).with_scale_notes(self.primary_scale_notes);
        for (function, listing) in self.function_to_chords_map {
            match listing {
                ChordListing::Tagged(chords) => {
                    for (symbol, origin) in chords {
                        tonality.add_chord(function, Chord::new(&symbol), origin);
                    }
                }
                ChordListing::Plain(chords) => {
                    for symbol in chords {
                        tonality.add_chord(function, Chord::new(&symbol), ScaleOrigin::Unspecified);
                    }
                }
            }
        }
        tonality
    }

    fn from_tonality(tonality: &Tonality) -> Self {
        let function_to_chords_map = TonalFunction::ALL
            .into_iter()
            .map(|f| {
                let chords = tonality
                    .chords_for(f)
                    .iter()
                    .map(|c| (c.chord.symbol().to_string(), c.origin))
                    .collect();
                (f, ChordListing::Tagged(chords))
            })
            .collect();
        Self {
            tonality_name: tonality.name().to_string(),
            function_to_chords_map,
            primary_scale_notes: tonality.scale_notes().to_vec(),
        }
    }
}

/// Parse a Kripke structure definition.
pub fn parse_kripke(json: &str) -> Result<KripkeStructure> {
    let record: KripkeRecord = serde_json::from_str(json).map_err(|e| CatalogError::Parse {
        what: "Kripke structure".to_string(),
        source: e,
    })?;
    let relation: Vec<(String, String)> = record
        .accessibility_relation
        .into_iter()
        .map(|e| (e.from, e.to))
        .collect();
    Ok(KripkeStructure::new(
        record.states,
        record.initial_states,
        record.final_states,
        &relation,
    )?)
}

/// Parse a tonality catalog, keeping file order.
pub fn parse_tonalities(json: &str) -> Result<Vec<Tonality>> {
    let records: Vec<TonalityRecord> = serde_json::from_str(json).map_err(|e| CatalogError::Parse {
        what: "tonality catalog".to_string(),
        source: e,
    })?;
    Ok(records.into_iter().map(TonalityRecord::into_tonality).collect())
}

pub fn kripke_to_json(structure: &KripkeStructure) -> Result<String> {
    let record = KripkeRecord {
        states: structure.states().to_vec(),
        initial_states: structure.initial_states().map(|s| s.id.clone()).collect(),
        final_states: structure.final_states().map(|s| s.id.clone()).collect(),
        accessibility_relation: structure
            .relation()
            .map(|(from, to)| EdgeRecord {
                from: from.id.clone(),
                to: to.id.clone(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&record).map_err(|e| CatalogError::Serialize {
        what: "Kripke structure".to_string(),
        source: e,
    })
}

pub fn tonalities_to_json(tonalities: &[Tonality]) -> Result<String> {
    let records: Vec<TonalityRecord> = tonalities.iter().map(TonalityRecord::from_tonality).collect();
    serde_json::to_string_pretty(&records).map_err(|e| CatalogError::Serialize {
        what: "tonality catalog".to_string(),
        source: e,
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// The static rules of the tonal universe: the Kripke structure and the
/// tonality catalog. Loaded once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    structure: KripkeStructure,
    tonalities: Vec<Tonality>,
}

impl KnowledgeBase {
    /// Build from parts. Later tonalities reusing an earlier name are dropped.
    pub fn new(structure: KripkeStructure, tonalities: Vec<Tonality>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(tonalities.len());
        for tonality in tonalities {
            if seen.insert(tonality.name().to_string()) {
                unique.push(tonality);
            } else {
                log::warn!("Duplicate tonality '{}' ignored", tonality.name());
            }
        }
        if unique.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self {
            structure,
            tonalities: unique,
        })
    }

    /// The standard three-state structure with the 24 generated tonalities.
    pub fn builtin() -> Self {
        Self {
            structure: KripkeStructure::standard(),
            tonalities: generate::all_tonalities(),
        }
    }

    /// Load from JSON files; a missing path falls back to the built-in part.
    pub fn load(kripke_path: Option<&Path>, tonalities_path: Option<&Path>) -> Result<Self> {
        let structure = match kripke_path {
            Some(path) => {
                let structure = parse_kripke(&read_file(path)?)?;
                log::info!("Loaded Kripke structure from {}", path.display());
                structure
            }
            None => KripkeStructure::standard(),
        };
        let tonalities = match tonalities_path {
            Some(path) => {
                let tonalities = parse_tonalities(&read_file(path)?)?;
                log::info!("Loaded {} tonalities from {}", tonalities.len(), path.display());
                tonalities
            }
            None => generate::all_tonalities(),
        };
        Self::new(structure, tonalities)
    }

    pub fn from_json(kripke_json: &str, tonalities_json: &str) -> Result<Self> {
        Self::new(parse_kripke(kripke_json)?, parse_tonalities(tonalities_json)?)
    }

    pub fn structure(&self) -> &KripkeStructure {
        &self.structure
    }

    pub fn tonalities(&self) -> &[Tonality] {
        &self.tonalities
    }

    pub fn tonality(&self, name: &str) -> Option<&Tonality> {
        self.tonalities.iter().find(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KRIPKE_JSON: &str = r#"{
        "states": [
            {"state_id": "s_t", "associated_tonal_function": "TONIC"},
            {"state_id": "s_d", "associated_tonal_function": "DOMINANT"},
            {"state_id": "s_sd", "associated_tonal_function": "SUBDOMINANT"}
        ],
        "initial_states": ["s_t"],
        "final_states": ["s_t"],
        "accessibility_relation": [
            {"from": "s_t", "to": "s_d"},
            {"from": "s_d", "to": "s_sd"}
        ]
    }"#;

    const TONALITIES_JSON: &str = r#"[
        {
            "tonality_name": "Test Major",
            "function_to_chords_map": {
                "TONIC": ["C", "Am"],
                "DOMINANT": ["G"],
                "SUBDOMINANT": ["F", "Dm"]
            }
        },
        {
            "tonality_name": "Test minor",
            "function_to_chords_map": {
                "TONIC": {"Cm": "natural"},
                "DOMINANT": {"G": "harmonic", "Bdim": "harmonic"},
                "SUBDOMINANT": {"Fm": "natural"}
            }
        }
    ]"#;

    #[test]
    fn test_loads_both_listing_forms() {
        let kb = KnowledgeBase::from_json(KRIPKE_JSON, TONALITIES_JSON).unwrap();
        assert_eq!(kb.tonalities().len(), 2);
        assert_eq!(kb.structure().states().len(), 3);
        assert_eq!(kb.structure().relation().count(), 2);

        let major = kb.tonality("Test Major").unwrap();
        assert!(major.chord_fulfills_function(&Chord::new("Am"), TonalFunction::Tonic));
        assert_eq!(
            major.origin_of(&Chord::new("G"), TonalFunction::Dominant),
            Some(ScaleOrigin::Unspecified)
        );

        let minor = kb.tonality("Test minor").unwrap();
        assert_eq!(
            minor.origin_of(&Chord::new("Bdim"), TonalFunction::Dominant),
            Some(ScaleOrigin::Harmonic)
        );
        assert!(kb.tonality("Nope").is_none());
    }

    #[test]
    fn test_unknown_state_edge_is_fatal() {
        let json = r#"{
            "states": [{"state_id": "s_t", "associated_tonal_function": "TONIC"}],
            "accessibility_relation": [{"from": "s_t", "to": "s_q"}]
        }"#;
        let err = parse_kripke(json).unwrap_err();
        assert!(matches!(err, CatalogError::Structure(_)));
        assert!(err.to_string().contains("s_q"));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(parse_tonalities("{not json"), Err(CatalogError::Parse { .. })));
        let bad_function = r#"[{"tonality_name": "X", "function_to_chords_map": {"MEDIANT": ["C"]}}]"#;
        assert!(matches!(parse_tonalities(bad_function), Err(CatalogError::Parse { .. })));
    }

    #[test]
    fn test_empty_catalog_and_duplicates() {
        let err = KnowledgeBase::new(KripkeStructure::standard(), Vec::new()).unwrap_err();
        assert!(matches!(err, CatalogError::Empty));

        let kb = KnowledgeBase::new(
            KripkeStructure::standard(),
            vec![
                Tonality::new("C Major").with_chords(TonalFunction::Tonic, &["C"], ScaleOrigin::Natural),
                Tonality::new("C Major"),
            ],
        )
        .unwrap();
        assert_eq!(kb.tonalities().len(), 1);
        assert!(!kb.tonalities()[0].chords_for(TonalFunction::Tonic).is_empty());
    }

    #[test]
    fn test_generated_files_load_back() {
        let dir = std::env::temp_dir().join(format!("tonalogy-catalog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let kripke_path = dir.join("kripke_structure.json");
        let tonalities_path = dir.join("tonalities.json");

        let builtin = KnowledgeBase::builtin();
        std::fs::write(&kripke_path, kripke_to_json(builtin.structure()).unwrap()).unwrap();
        std::fs::write(&tonalities_path, tonalities_to_json(builtin.tonalities()).unwrap()).unwrap();

        let kb = KnowledgeBase::load(Some(&kripke_path), Some(&tonalities_path)).unwrap();
        assert_eq!(kb.tonalities().len(), 24);
        assert_eq!(kb.tonalities()[0].name(), "C Major");
        let d_minor = kb.tonality("D minor").unwrap();
        assert_eq!(
            d_minor.origin_of(&Chord::new("A"), TonalFunction::Dominant),
            Some(ScaleOrigin::Harmonic)
        );
        let tonic = kb.structure().state_for_function(TonalFunction::Tonic).unwrap();
        assert_eq!(kb.structure().successors(tonic).len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = KnowledgeBase::load(None, Some(Path::new("/nonexistent/tonalities.json"))).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_error_messages_name_the_operation() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = CatalogError::Serialize {
            what: "tonality catalog".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Error serializing tonality catalog: "));

        let err = parse_tonalities("{not json").unwrap_err();
        assert!(err.to_string().starts_with("Error parsing "));
    }
}
