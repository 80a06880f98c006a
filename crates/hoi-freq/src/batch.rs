use hoi_types::{Action, FrequencyRecord, TermFrequency};
use ngram_query::{LabeledAction, LabeledTerm};
use thiserror::Error;
use tracing::info;

use crate::aggregator::{CombinePolicy, EstimateError, FrequencyAggregator};
use crate::client::NgramLookup;
use crate::pool::WorkerPool;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// One item at a time; each record is reported as soon as it is known.
    Sequential,
    /// Items run concurrently on the pool; records are reported in input
    /// order once the whole batch has finished.
    Parallel(WorkerPool),
}

/// Any single failure aborts the batch; no partial tables are produced.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to estimate `{label}`: {source}")]
    Action {
        label: Action,
        source: EstimateError,
    },
    #[error("failed to estimate term `{label}`: {source}")]
    Term {
        label: String,
        source: EstimateError,
    },
}

/// Drives a [`FrequencyAggregator`] over many actions.
pub struct BatchRunner<L> {
    aggregator: FrequencyAggregator<L>,
    mode: ExecutionMode,
}

impl<L: NgramLookup> BatchRunner<L> {
    pub fn new(aggregator: FrequencyAggregator<L>, mode: ExecutionMode) -> Self {
        Self { aggregator, mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn policy(&self) -> CombinePolicy {
        self.aggregator.policy()
    }

    /// Estimate every action, reporting each result under its original label.
    ///
    /// `on_record` sees records in input order in both modes.
    pub async fn run<F>(
        &self,
        actions: &[LabeledAction],
        mut on_record: F,
    ) -> Result<Vec<FrequencyRecord>, BatchError>
    where
        F: FnMut(&FrequencyRecord),
    {
        info!("estimating {} actions ({:?})", actions.len(), self.mode);
        match self.mode {
            ExecutionMode::Sequential => {
                let mut records = Vec::with_capacity(actions.len());
                for item in actions {
                    let record = self.estimate_action(item).await?;
                    on_record(&record);
                    records.push(record);
                }
                Ok(records)
            }
            ExecutionMode::Parallel(pool) => {
                let records = pool
                    .try_map(actions, |item| self.estimate_action(item))
                    .await?;
                records.iter().for_each(&mut on_record);
                Ok(records)
            }
        }
    }

    /// Estimate standalone verb or object terms under the same ordering rules.
    pub async fn run_terms<F>(
        &self,
        terms: &[LabeledTerm],
        mut on_term: F,
    ) -> Result<Vec<TermFrequency>, BatchError>
    where
        F: FnMut(&TermFrequency),
    {
        info!("estimating {} terms ({:?})", terms.len(), self.mode);
        match self.mode {
            ExecutionMode::Sequential => {
                let mut out = Vec::with_capacity(terms.len());
                for item in terms {
                    let term = self.estimate_term(item).await?;
                    on_term(&term);
                    out.push(term);
                }
                Ok(out)
            }
            ExecutionMode::Parallel(pool) => {
                let out = pool
                    .try_map(terms, |item| self.estimate_term(item))
                    .await?;
                out.iter().for_each(&mut on_term);
                Ok(out)
            }
        }
    }

    async fn estimate_action(&self, item: &LabeledAction) -> Result<FrequencyRecord, BatchError> {
        let frequency = self
            .aggregator
            .estimate(&item.query)
            .await
            .map_err(|source| BatchError::Action {
                label: item.label.clone(),
                source,
            })?;
        Ok(FrequencyRecord {
            label: item.label.clone(),
            frequency,
        })
    }

    async fn estimate_term(&self, item: &LabeledTerm) -> Result<TermFrequency, BatchError> {
        let frequency = self
            .aggregator
            .estimate_term(&item.query)
            .await
            .map_err(|source| BatchError::Term {
                label: item.label.clone(),
                source,
            })?;
        Ok(TermFrequency {
            term: item.label.clone(),
            frequency,
        })
    }
}

#[cfg(test)]
mod tests {
    use ngram_query::{label_actions, verb_terms};

    use super::*;
    use crate::aggregator::tests::FakeLookup;

    fn runner(lookup: FakeLookup, mode: ExecutionMode) -> BatchRunner<FakeLookup> {
        BatchRunner::new(FrequencyAggregator::new(lookup, CombinePolicy::Max), mode)
    }

    fn lookup() -> FakeLookup {
        FakeLookup::with(&[
            ("and~+dining+table~", 30),
            ("ride~+bicycle~", 10),
            ("ride~+*+bicycle~", 12),
            ("hold~+cup~", 4),
        ])
    }

    fn actions() -> Vec<LabeledAction> {
        label_actions(
            vec![
                Action::new("no_interaction", "dining_table"),
                Action::new("ride", "bicycle"),
                Action::new("hold", "cup"),
            ],
            true,
        )
    }

    #[test]
    fn reports_configuration() {
        let pool = WorkerPool::new(3);
        let runner = BatchRunner::new(
            FrequencyAggregator::new(lookup(), CombinePolicy::Sum),
            ExecutionMode::Parallel(pool),
        );
        assert_eq!(runner.mode(), ExecutionMode::Parallel(pool));
        assert_eq!(runner.policy(), CombinePolicy::Sum);
    }

    #[tokio::test]
    async fn sequential_reports_original_labels() {
        let runner = runner(lookup(), ExecutionMode::Sequential);
        let mut streamed = Vec::new();
        let records = runner
            .run(&actions(), |r| streamed.push(r.to_line()))
            .await
            .unwrap();
        assert_eq!(
            streamed,
            vec![
                "no_interaction,dining_table,30",
                "ride,bicycle,12",
                "hold,cup,4"
            ]
        );
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn parallel_matches_sequential_order() {
        let runner = runner(lookup(), ExecutionMode::Parallel(WorkerPool::new(3)));
        let mut streamed = Vec::new();
        let records = runner
            .run(&actions(), |r| streamed.push(r.label.clone()))
            .await
            .unwrap();
        let labels: Vec<Action> = records.iter().map(|r| r.label.clone()).collect();
        assert_eq!(labels, streamed);
        assert_eq!(labels[0], Action::new("no_interaction", "dining_table"));
        assert_eq!(records[1].frequency, 12);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        for mode in [
            ExecutionMode::Sequential,
            ExecutionMode::Parallel(WorkerPool::new(2)),
        ] {
            let mut failing = lookup();
            failing.failing = Some("hold~+*+cup~".into());
            let runner = runner(failing, mode);
            let mut streamed = 0;
            let err = runner
                .run(&actions(), |_| streamed += 1)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("`hold,cup`"));
            if mode == ExecutionMode::Parallel(WorkerPool::new(2)) {
                assert_eq!(streamed, 0);
            }
        }
    }

    #[tokio::test]
    async fn terms_keep_labels() {
        let lookup = FakeLookup::with(&[("and~", 100), ("ride~", 9)]);
        let runner = runner(lookup, ExecutionMode::Parallel(WorkerPool::new(2)));
        let terms = verb_terms(
            &[
                Action::new("ride", "bicycle"),
                Action::new("no_interaction", "bicycle"),
            ],
            true,
        );
        let out = runner.run_terms(&terms, |_| {}).await.unwrap();
        assert_eq!(
            out,
            vec![
                TermFrequency {
                    term: "no_interaction".into(),
                    frequency: 100
                },
                TermFrequency {
                    term: "ride".into(),
                    frequency: 9
                },
            ]
        );
    }
}
