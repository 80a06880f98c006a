//! Reconcile ground-truth and corpus frequency tables.
//!
//! Both main tables are indexed by [`InteractionKey`]; the joined rows are
//! then looked up in four verb/object side tables. Every value of the
//! output row must be present by the time it is typed: nothing missing is
//! silently coerced to zero except what [`MergeMode::AllowMismatch`]
//! explicitly fills in.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use hoi_types::{
    FrequencyRecord, GroundTruthInteraction, InteractionKey, MergedRow, Rarity,
    SourceFrequencies, TermFrequency,
};
use thiserror::Error;
use tracing::{info, warn};

const PREVIEW_LEN: usize = 5;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergeMode {
    /// Both tables must contain exactly the same interactions.
    #[default]
    Strict,
    /// Outer join; gaps are backfilled from the other side, missing
    /// interaction frequencies become 0 and missing rarity becomes
    /// [`Rarity::Absent`].
    AllowMismatch,
}

/// Input table named in merge errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    GroundTruth,
    Corpus,
    GroundTruthVerbs,
    GroundTruthObjects,
    CorpusVerbs,
    CorpusObjects,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Table::GroundTruth => "ground-truth interaction",
            Table::Corpus => "corpus interaction",
            Table::GroundTruthVerbs => "ground-truth verb",
            Table::GroundTruthObjects => "ground-truth object",
            Table::CorpusVerbs => "corpus verb",
            Table::CorpusObjects => "corpus object",
        })
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("interaction `{key}` appears more than once in the {table} table")]
    DuplicateKey { table: Table, key: InteractionKey },
    #[error("`{token}` appears more than once in the {table} table")]
    DuplicateToken { table: Table, token: String },
    #[error(
        "interaction sets differ; only in corpus table: {}; only in ground-truth table: {}",
        preview(.corpus_only),
        preview(.ground_truth_only)
    )]
    DatasetMismatch {
        corpus_only: Vec<InteractionKey>,
        ground_truth_only: Vec<InteractionKey>,
    },
    #[error("interaction `{key}` has no `{column}` value")]
    IncompleteJoin {
        key: InteractionKey,
        column: &'static str,
    },
}

fn preview(keys: &[InteractionKey]) -> String {
    let mut shown: Vec<&str> = keys.iter().take(PREVIEW_LEN).map(|k| k.as_str()).collect();
    if keys.len() > PREVIEW_LEN {
        shown.push("...");
    }
    format!("{} [{}]", keys.len(), shown.join(" | "))
}

/// Verb and object frequency tables from both sources.
#[derive(Clone, Debug, Default)]
pub struct SideTables {
    pub ground_truth_verbs: Vec<TermFrequency>,
    pub ground_truth_objects: Vec<TermFrequency>,
    pub corpus_verbs: Vec<TermFrequency>,
    pub corpus_objects: Vec<TermFrequency>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DatasetMerger {
    mode: MergeMode,
}

/// Joined row before every value has been checked.
struct PartialRow<'a> {
    key: InteractionKey,
    gt_verb: Option<&'a str>,
    gt_object: Option<&'a str>,
    corpus_verb: Option<&'a str>,
    corpus_object: Option<&'a str>,
    gt_frequency: Option<u64>,
    corpus_frequency: Option<u64>,
    rarity: Option<Rarity>,
}

impl DatasetMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Join both tables into one row per interaction, sorted by key.
    ///
    /// All checks run before any row is returned, so a failed merge never
    /// yields a partial table.
    pub fn merge(
        &self,
        ground_truth: &[GroundTruthInteraction],
        corpus: &[FrequencyRecord],
        side: &SideTables,
    ) -> Result<Vec<MergedRow>, MergeError> {
        let gt_rows = index_unique(ground_truth, Table::GroundTruth, |r| r.key())?;
        let corpus_rows = index_unique(corpus, Table::Corpus, |r| r.label.key())?;

        let corpus_only: Vec<InteractionKey> = corpus_rows
            .keys()
            .filter(|k| !gt_rows.contains_key(*k))
            .cloned()
            .collect();
        let ground_truth_only: Vec<InteractionKey> = gt_rows
            .keys()
            .filter(|k| !corpus_rows.contains_key(*k))
            .cloned()
            .collect();
        if !corpus_only.is_empty() || !ground_truth_only.is_empty() {
            match self.mode {
                MergeMode::Strict => {
                    return Err(MergeError::DatasetMismatch {
                        corpus_only,
                        ground_truth_only,
                    });
                }
                MergeMode::AllowMismatch => warn!(
                    "{} interactions only in corpus table, {} only in ground-truth table",
                    corpus_only.len(),
                    ground_truth_only.len()
                ),
            }
        }

        let gt_verbs = term_map(&side.ground_truth_verbs, Table::GroundTruthVerbs)?;
        let gt_objects = term_map(&side.ground_truth_objects, Table::GroundTruthObjects)?;
        let corpus_verbs = term_map(&side.corpus_verbs, Table::CorpusVerbs)?;
        let corpus_objects = term_map(&side.corpus_objects, Table::CorpusObjects)?;

        let keys: BTreeSet<&InteractionKey> = gt_rows.keys().chain(corpus_rows.keys()).collect();
        let mut merged = Vec::with_capacity(keys.len());
        for key in keys {
            let gt = gt_rows.get(key);
            let co = corpus_rows.get(key);
            let mut row = PartialRow {
                key: key.clone(),
                gt_verb: gt.map(|r| r.verb.as_str()),
                gt_object: gt.map(|r| r.object.as_str()),
                corpus_verb: co.map(|r| r.label.verb.as_str()),
                corpus_object: co.map(|r| r.label.object.as_str()),
                gt_frequency: gt.map(|r| r.frequency),
                corpus_frequency: co.map(|r| r.frequency),
                rarity: gt.map(|r| r.rarity),
            };
            if self.mode == MergeMode::AllowMismatch {
                row.fill_gaps();
            }

            let verb = require(row.corpus_verb, &row.key, "Verb")?;
            let object = require(row.corpus_object, &row.key, "Object")?;
            let gt_verb = require(row.gt_verb, &row.key, "Verb_hoi")?;
            let gt_object = require(row.gt_object, &row.key, "Object_hoi")?;
            merged.push(MergedRow {
                verb: verb.to_string(),
                object: object.to_string(),
                corpus: SourceFrequencies {
                    interaction: require(
                        row.corpus_frequency,
                        &row.key,
                        "Interaction_freq_ngrams",
                    )?,
                    verb: require(
                        corpus_verbs.get(verb).copied(),
                        &row.key,
                        "Verb_freq_ngrams",
                    )?,
                    object: require(
                        corpus_objects.get(object).copied(),
                        &row.key,
                        "Object_freq_ngrams",
                    )?,
                },
                ground_truth: SourceFrequencies {
                    interaction: require(row.gt_frequency, &row.key, "Interaction_freq_hoi")?,
                    verb: require(gt_verbs.get(gt_verb).copied(), &row.key, "Verb_freq_hoi")?,
                    object: require(
                        gt_objects.get(gt_object).copied(),
                        &row.key,
                        "Object_freq_hoi",
                    )?,
                },
                rarity: require(row.rarity, &row.key, "IsRare_hoi")?,
                key: row.key,
            });
        }

        info!("merged {} interactions ({:?})", merged.len(), self.mode);
        Ok(merged)
    }
}

impl PartialRow<'_> {
    fn fill_gaps(&mut self) {
        self.gt_verb = self.gt_verb.or(self.corpus_verb);
        self.gt_object = self.gt_object.or(self.corpus_object);
        self.corpus_verb = self.corpus_verb.or(self.gt_verb);
        self.corpus_object = self.corpus_object.or(self.gt_object);
        self.gt_frequency = self.gt_frequency.or(Some(0));
        self.corpus_frequency = self.corpus_frequency.or(Some(0));
        self.rarity = self.rarity.or(Some(Rarity::Absent));
    }
}

fn require<T>(value: Option<T>, key: &InteractionKey, column: &'static str) -> Result<T, MergeError> {
    value.ok_or_else(|| MergeError::IncompleteJoin {
        key: key.clone(),
        column,
    })
}

fn index_unique<T, F>(
    rows: &[T],
    table: Table,
    key: F,
) -> Result<BTreeMap<InteractionKey, &T>, MergeError>
where
    F: Fn(&T) -> InteractionKey,
{
    let mut index = BTreeMap::new();
    for row in rows {
        let k = key(row);
        if index.contains_key(&k) {
            return Err(MergeError::DuplicateKey { table, key: k });
        }
        index.insert(k, row);
    }
    Ok(index)
}

fn term_map(terms: &[TermFrequency], table: Table) -> Result<HashMap<&str, u64>, MergeError> {
    let mut map = HashMap::with_capacity(terms.len());
    for term in terms {
        if map.insert(term.term.as_str(), term.frequency).is_some() {
            return Err(MergeError::DuplicateToken {
                table,
                token: term.term.clone(),
            });
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use hoi_types::Action;

    use super::*;

    fn gt(verb: &str, object: &str, frequency: u64, rarity: Rarity) -> GroundTruthInteraction {
        GroundTruthInteraction {
            verb: verb.into(),
            object: object.into(),
            frequency,
            rarity,
        }
    }

    fn corpus(verb: &str, object: &str, frequency: u64) -> FrequencyRecord {
        FrequencyRecord {
            label: Action::new(verb, object),
            frequency,
        }
    }

    fn terms(pairs: &[(&str, u64)]) -> Vec<TermFrequency> {
        pairs
            .iter()
            .map(|(term, frequency)| TermFrequency {
                term: term.to_string(),
                frequency: *frequency,
            })
            .collect()
    }

    fn side() -> SideTables {
        SideTables {
            ground_truth_verbs: terms(&[("ride", 40), ("hold", 60), ("kick", 3)]),
            ground_truth_objects: terms(&[("bicycle", 35), ("cup", 50), ("ball", 9)]),
            corpus_verbs: terms(&[("ride", 4000), ("hold", 9000), ("kick", 700)]),
            corpus_objects: terms(&[("bicycle", 2500), ("cup", 8000), ("ball", 6000)]),
        }
    }

    #[test]
    fn strict_merge_ignores_row_order() {
        let ground_truth = vec![
            gt("ride", "bicycle", 12, Rarity::Common),
            gt("hold", "cup", 3, Rarity::Rare),
        ];
        let corpus = vec![corpus("hold", "cup", 800), corpus("ride", "bicycle", 150)];
        let rows = DatasetMerger::new(MergeMode::Strict)
            .merge(&ground_truth, &corpus, &side())
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.as_str(), "hold,cup");
        assert_eq!(
            rows[0].corpus,
            SourceFrequencies {
                interaction: 800,
                verb: 9000,
                object: 8000
            }
        );
        assert_eq!(
            rows[0].ground_truth,
            SourceFrequencies {
                interaction: 3,
                verb: 60,
                object: 50
            }
        );
        assert_eq!(rows[0].rarity, Rarity::Rare);
        assert_eq!(rows[1].verb, "ride");
    }

    #[test]
    fn strict_is_the_default_mode() {
        assert_eq!(DatasetMerger::default().mode(), MergeMode::Strict);
        assert_eq!(
            DatasetMerger::new(MergeMode::AllowMismatch).mode(),
            MergeMode::AllowMismatch
        );
    }

    #[test]
    fn strict_merge_rejects_one_missing_key() {
        let ground_truth = vec![gt("ride", "bicycle", 12, Rarity::Common)];
        let corpus = vec![corpus("ride", "bicycle", 150), corpus("kick", "ball", 20)];
        let err = DatasetMerger::default()
            .merge(&ground_truth, &corpus, &side())
            .unwrap_err();
        match &err {
            MergeError::DatasetMismatch {
                corpus_only,
                ground_truth_only,
            } => {
                assert_eq!(corpus_only, &vec![InteractionKey::new("kick", "ball")]);
                assert!(ground_truth_only.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("kick,ball"));
    }

    #[test]
    fn allow_mismatch_fills_absent_rows() {
        let ground_truth = vec![
            gt("ride", "bicycle", 12, Rarity::Common),
            gt("hold", "cup", 3, Rarity::Rare),
        ];
        let corpus = vec![corpus("ride", "bicycle", 150), corpus("kick", "ball", 20)];
        let rows = DatasetMerger::new(MergeMode::AllowMismatch)
            .merge(&ground_truth, &corpus, &side())
            .unwrap();
        assert_eq!(rows.len(), 3);

        let kick = rows.iter().find(|r| r.key.as_str() == "kick,ball").unwrap();
        assert_eq!(kick.ground_truth.interaction, 0);
        assert_eq!(kick.rarity, Rarity::Absent);
        assert_eq!(kick.ground_truth.verb, 3);
        assert_eq!(kick.corpus.interaction, 20);

        let hold = rows.iter().find(|r| r.key.as_str() == "hold,cup").unwrap();
        assert_eq!(hold.verb, "hold");
        assert_eq!(hold.corpus.interaction, 0);
        assert_eq!(hold.corpus.verb, 9000);
        assert_eq!(hold.rarity, Rarity::Rare);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let ground_truth = vec![
            gt("ride", "bicycle", 12, Rarity::Common),
            gt("ride", "bicycle", 1, Rarity::Rare),
        ];
        let corpus = vec![corpus("ride", "bicycle", 150)];
        let err = DatasetMerger::new(MergeMode::AllowMismatch)
            .merge(&ground_truth, &corpus, &side())
            .unwrap_err();
        assert!(matches!(
            err,
            MergeError::DuplicateKey {
                table: Table::GroundTruth,
                ..
            }
        ));

        let mut dup_side = side();
        dup_side.corpus_verbs.push(TermFrequency {
            term: "ride".into(),
            frequency: 1,
        });
        let err = DatasetMerger::default()
            .merge(&ground_truth[..1], &corpus, &dup_side)
            .unwrap_err();
        assert!(matches!(
            err,
            MergeError::DuplicateToken {
                table: Table::CorpusVerbs,
                ..
            }
        ));
    }

    #[test]
    fn missing_side_frequency_is_fatal() {
        let ground_truth = vec![gt("ride", "horse", 12, Rarity::Common)];
        let corpus = vec![corpus("ride", "horse", 150)];
        let err = DatasetMerger::default()
            .merge(&ground_truth, &corpus, &side())
            .unwrap_err();
        match err {
            MergeError::IncompleteJoin { key, column } => {
                assert_eq!(key.as_str(), "ride,horse");
                assert_eq!(column, "Object_freq_ngrams");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
