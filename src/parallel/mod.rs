//! Parallel aggregation pipeline
//!
//! Splits a record source into batches and folds them across a pool of
//! worker threads, merging the per-worker results into one aggregate.
//!
//! # Module Structure
//!
//! - `types`: Batches, partial aggregates, configuration and run outcome
//! - `batching`: Reader thread that slices the source into batches
//! - `worker`: Worker threads competing for batches
//! - `combiner`: Fan-in of worker outputs behind a countdown barrier
//! - `reducer`: Sequential fold into the final aggregate
//! - `processor`: Main ParallelProcessor orchestration

mod batching;
mod combiner;
mod processor;
mod reducer;
mod types;
mod worker;

// Re-export public types
pub use processor::ParallelProcessor;
pub use reducer::{FinalAggregate, KeyCount, Reducer};
pub use types::{
    Batch, ParallelConfig, PartialAggregate, PipelineOutcome, RunStatus, ShortIdSighting,
};
