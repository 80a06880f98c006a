//! The `freq` pipeline: expand, label, normalize, estimate, save.
//!
//! Expansion runs on the raw actions, so labels and the verb/object term
//! tables always use the text as it appeared in the input. Normalization
//! only affects what is sent to the service.

use std::path::{Path, PathBuf};

use hoi_dataset::TableError;
use hoi_dataset::tables::{self, TermColumn};
use hoi_types::{Action, FrequencyRecord, TermFrequency};
use ngram_query::{every_combination, label_actions, object_terms, verb_terms};
use tracing::info;

use crate::batch::{BatchError, BatchRunner};
use crate::client::NgramLookup;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FreqOptions {
    /// Rewrite underscores and the `no_interaction` sentinel before querying.
    pub parse_underscore: bool,
    /// Query every distinct verb against every distinct object.
    pub every_combination: bool,
}

/// Verb and object term frequencies, each sorted by label.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TermTables {
    pub verbs: Vec<TermFrequency>,
    pub objects: Vec<TermFrequency>,
}

pub struct FreqPipeline<L> {
    runner: BatchRunner<L>,
    options: FreqOptions,
}

impl<L: NgramLookup> FreqPipeline<L> {
    pub fn new(runner: BatchRunner<L>, options: FreqOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> FreqOptions {
        self.options
    }

    /// Apply the combination expansion, if enabled. The result is the label
    /// set for every later step.
    pub fn expand(&self, actions: Vec<Action>) -> Vec<Action> {
        if !self.options.every_combination {
            return actions;
        }
        let observed = actions.len();
        let expanded = every_combination(&actions);
        info!("expanded {observed} actions to {} combinations", expanded.len());
        expanded
    }

    /// Estimate every (already expanded) action under its original label.
    pub async fn estimate<F>(
        &self,
        actions: &[Action],
        on_record: F,
    ) -> Result<Vec<FrequencyRecord>, BatchError>
    where
        F: FnMut(&FrequencyRecord),
    {
        info!(
            "estimating with {:?} policy, {:?} mode",
            self.runner.policy(),
            self.runner.mode()
        );
        let labeled = label_actions(actions.to_vec(), self.options.parse_underscore);
        self.runner.run(&labeled, on_record).await
    }

    /// Estimate the distinct verbs, then the distinct objects, of `actions`.
    pub async fn term_tables<F>(
        &self,
        actions: &[Action],
        mut on_term: F,
    ) -> Result<TermTables, BatchError>
    where
        F: FnMut(&TermFrequency),
    {
        let parse = self.options.parse_underscore;
        let verbs = self
            .runner
            .run_terms(&verb_terms(actions, parse), &mut on_term)
            .await?;
        let objects = self
            .runner
            .run_terms(&object_terms(actions, parse), &mut on_term)
            .await?;
        Ok(TermTables { verbs, objects })
    }
}

/// File names of the `freq --save` tables, derived from the input stem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FreqOutputs {
    pub interactions: PathBuf,
    pub verbs: PathBuf,
    pub objects: PathBuf,
}

impl FreqOutputs {
    pub fn new(dir: &Path, stem: &str, options: FreqOptions) -> Self {
        let suffix = if options.every_combination {
            "_ngrams_all"
        } else {
            "_ngrams"
        };
        Self {
            interactions: dir.join(format!("{stem}{suffix}.csv")),
            verbs: dir.join(format!("{stem}_ngrams_verbs.csv")),
            objects: dir.join(format!("{stem}_ngrams_objects.csv")),
        }
    }

    pub fn write(
        &self,
        records: &[FrequencyRecord],
        terms: &TermTables,
    ) -> Result<(), TableError> {
        tables::write_path(&self.interactions, |w| {
            tables::write_frequency_table(w, records)
        })?;
        tables::write_path(&self.verbs, |w| {
            tables::write_term_table(w, TermColumn::Verb, &terms.verbs)
        })?;
        tables::write_path(&self.objects, |w| {
            tables::write_term_table(w, TermColumn::Object, &terms.objects)
        })?;
        info!(
            "saved {}, {}, {}",
            self.interactions.display(),
            self.verbs.display(),
            self.objects.display()
        );
        Ok(())
    }
}
