use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use hoi_types::{GroundTruthInteraction, Rarity, TermFrequency};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{counts}` has {found} entries but `{names}` has {expected}")]
    LengthMismatch {
        counts: &'static str,
        names: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("rare interaction id {id} is out of range ({len} interactions)")]
    RareIdOutOfRange { id: usize, len: usize },
}

/// Serialized layout of the store.
///
/// `interactions` entries are `[id, [object, verb]]`: the verb is the second
/// element of the inner pair.
#[derive(Deserialize)]
struct RawStore {
    objects: Vec<(u64, String)>,
    verbs: Vec<(u64, String)>,
    interactions: Vec<(u64, (String, String))>,
    num_annotations_per_verb: Vec<u64>,
    num_annotations_per_object: Vec<u64>,
    num_annotations_per_interaction: Vec<u64>,
    rare_interaction_ids: Vec<usize>,
}

/// Typed view of the ground-truth store.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    interactions: Vec<GroundTruthInteraction>,
    verbs: Vec<TermFrequency>,
    objects: Vec<TermFrequency>,
}

impl GroundTruth {
    /// Load a JSON-serialized store from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let gt = Self::from_reader(BufReader::new(file))?;
        info!(
            "loaded {} interactions, {} verbs, {} objects from {}",
            gt.interactions.len(),
            gt.verbs.len(),
            gt.objects.len(),
            path.display()
        );
        Ok(gt)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StoreError> {
        let raw: RawStore = serde_json::from_reader(reader)?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let raw: RawStore = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawStore) -> Result<Self, StoreError> {
        check_len(
            "num_annotations_per_verb",
            "verbs",
            raw.verbs.len(),
            raw.num_annotations_per_verb.len(),
        )?;
        check_len(
            "num_annotations_per_object",
            "objects",
            raw.objects.len(),
            raw.num_annotations_per_object.len(),
        )?;
        check_len(
            "num_annotations_per_interaction",
            "interactions",
            raw.interactions.len(),
            raw.num_annotations_per_interaction.len(),
        )?;

        let rare: HashSet<usize> = raw.rare_interaction_ids.iter().copied().collect();
        if let Some(&id) = rare.iter().find(|id| **id >= raw.interactions.len()) {
            return Err(StoreError::RareIdOutOfRange {
                id,
                len: raw.interactions.len(),
            });
        }

        let interactions = raw
            .interactions
            .into_iter()
            .zip(raw.num_annotations_per_interaction)
            .enumerate()
            .map(|(idx, ((_, (object, verb)), frequency))| GroundTruthInteraction {
                verb,
                object,
                frequency,
                rarity: if rare.contains(&idx) {
                    Rarity::Rare
                } else {
                    Rarity::Common
                },
            })
            .collect();

        Ok(Self {
            interactions,
            verbs: terms(raw.verbs, raw.num_annotations_per_verb),
            objects: terms(raw.objects, raw.num_annotations_per_object),
        })
    }

    pub fn interactions(&self) -> &[GroundTruthInteraction] {
        &self.interactions
    }

    pub fn verbs(&self) -> &[TermFrequency] {
        &self.verbs
    }

    pub fn objects(&self) -> &[TermFrequency] {
        &self.objects
    }
}

fn check_len(
    counts: &'static str,
    names: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), StoreError> {
    if expected != found {
        return Err(StoreError::LengthMismatch {
            counts,
            names,
            expected,
            found,
        });
    }
    Ok(())
}

// Lengths are checked by the caller.
fn terms(names: Vec<(u64, String)>, counts: Vec<u64>) -> Vec<TermFrequency> {
    names
        .into_iter()
        .zip(counts)
        .map(|((_, term), frequency)| TermFrequency { term, frequency })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"{
        "objects": [[0, "bicycle"], [1, "cup"]],
        "verbs": [[0, "ride"], [1, "hold"], [2, "no_interaction"]],
        "interactions": [[0, ["bicycle", "ride"]], [1, ["cup", "hold"]], [2, ["cup", "no_interaction"]]],
        "num_annotations_per_verb": [10, 20, 5],
        "num_annotations_per_object": [7, 28],
        "num_annotations_per_interaction": [7, 20, 1],
        "rare_interaction_ids": [2]
    }"#;

    #[test]
    fn unpacks_interactions_verb_first() {
        let gt = GroundTruth::from_json_str(STORE).unwrap();
        let first = &gt.interactions()[0];
        assert_eq!(first.verb, "ride");
        assert_eq!(first.object, "bicycle");
        assert_eq!(first.frequency, 7);
        assert_eq!(first.rarity, Rarity::Common);
        assert_eq!(gt.interactions()[2].rarity, Rarity::Rare);
        assert_eq!(first.key().as_str(), "ride,bicycle");
    }

    #[test]
    fn objects_use_their_own_counts() {
        let gt = GroundTruth::from_json_str(STORE).unwrap();
        assert_eq!(
            gt.objects(),
            &[
                TermFrequency {
                    term: "bicycle".into(),
                    frequency: 7
                },
                TermFrequency {
                    term: "cup".into(),
                    frequency: 28
                },
            ]
        );
        assert_eq!(gt.verbs()[1].frequency, 20);
    }

    #[test]
    fn missing_object_counts_fail_loudly() {
        let json = STORE.replace("num_annotations_per_object", "num_annotations_per_thing");
        let err = GroundTruth::from_json_str(&json).unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
        assert!(err.to_string().contains("num_annotations_per_object"));
    }

    #[test]
    fn count_length_mismatch_is_rejected() {
        let json = STORE.replace("[10, 20, 5]", "[10, 20]");
        let err = GroundTruth::from_json_str(&json).unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                names: "verbs",
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn rare_ids_must_index_interactions() {
        let json = STORE.replace("\"rare_interaction_ids\": [2]", "\"rare_interaction_ids\": [3]");
        let err = GroundTruth::from_json_str(&json).unwrap_err();
        assert!(matches!(err, StoreError::RareIdOutOfRange { id: 3, len: 3 }));
    }
}
