pub mod aggregator;
pub mod batch;
pub mod client;
pub mod merge;
pub mod pipeline;
pub mod pool;
pub mod rate_limit;

pub use aggregator::{CombinePolicy, EstimateError, FrequencyAggregator};
pub use batch::{BatchError, BatchRunner, ExecutionMode};
pub use client::{ClientConfig, NgramClient, NgramLookup, ServiceError};
pub use merge::{DatasetMerger, MergeError, MergeMode, SideTables};
pub use pipeline::{FreqOptions, FreqOutputs, FreqPipeline, TermTables};
pub use pool::WorkerPool;
