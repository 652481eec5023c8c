// Core library for the tally batch aggregation tool

pub mod cancel;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod extract;
pub mod formatters;
pub mod parallel;
pub mod platform;
pub mod readers;
pub mod stats;

pub use cancel::{CancelReason, CancelToken};
pub use config::TallyConfig;
pub use extract::{DelimitedExtractor, FieldLayout, RecordExtractor, RecordFields};
pub use parallel::{
    FinalAggregate, KeyCount, ParallelConfig, ParallelProcessor, PipelineOutcome, RunStatus,
};
pub use readers::Source;
pub use stats::ProcessingStats;
