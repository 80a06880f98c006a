use clap::ValueEnum;
use hoi_types::Action;
use ngram_query::{QueryError, querify, querify_simple};
use thiserror::Error;
use tracing::debug;

use crate::client::{NgramLookup, ServiceError};

/// How the exact and fill-wildcard counts of one action are combined.
///
/// The two are not independent: the fill query can also match the exact
/// phrasing, so neither combination is obviously right. `Max` treats the
/// fill count as corroboration, `Sum` as extra evidence.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum CombinePolicy {
    #[default]
    Max,
    Sum,
}

impl CombinePolicy {
    pub fn combine(self, exact: u64, fill: u64) -> u64 {
        match self {
            CombinePolicy::Max => exact.max(fill),
            CombinePolicy::Sum => exact.saturating_add(fill),
        }
    }
}

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Reduces the service's n-gram matches for an action to one frequency.
pub struct FrequencyAggregator<L> {
    lookup: L,
    policy: CombinePolicy,
}

impl<L: NgramLookup> FrequencyAggregator<L> {
    pub fn new(lookup: L, policy: CombinePolicy) -> Self {
        Self { lookup, policy }
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    /// Estimate the corpus frequency of a normalized action.
    ///
    /// Issues the exact query, then the fill-wildcard query, and combines the
    /// two totals under the configured policy.
    pub async fn estimate(&self, action: &Action) -> Result<u64, EstimateError> {
        let queries = querify(action)?;
        let exact = self.lookup.lookup(&queries.exact).await?;
        let fill = self.lookup.lookup(&queries.fill).await?;
        let frequency = self.policy.combine(exact, fill);
        debug!("{action}: exact={exact} fill={fill} -> {frequency}");
        Ok(frequency)
    }

    /// Estimate the corpus frequency of a lone verb or object term.
    pub async fn estimate_term(&self, term: &str) -> Result<u64, EstimateError> {
        let query = querify_simple(term)?;
        Ok(self.lookup.lookup(&query).await?)
    }
}
