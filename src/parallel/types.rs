//! Type definitions for parallel processing
//!
//! Contains data structures for batches, partial aggregates, and configuration.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::cancel::CancelReason;
use crate::stats::ProcessingStats;

use super::reducer::FinalAggregate;

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    pub num_workers: usize,
    pub batch_size: usize,
    /// Cancel the run once this much time has passed since it started
    pub deadline: Option<Duration>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            batch_size: 1000,
            deadline: None,
        }
    }
}

impl ParallelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(anyhow!("worker count must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch size must be at least 1"));
        }
        Ok(())
    }
}

/// A batch of raw records handed to exactly one worker
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: u64,
    pub lines: Vec<String>,
    /// 1-based source line of `lines[0]`
    pub start_line_num: u64,
}

/// A short identity together with the source line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortIdSighting {
    pub line_num: u64,
    pub key: String,
}

/// One worker's private accumulator for its whole run
#[derive(Debug, Default)]
pub struct PartialAggregate {
    pub worker_id: usize,
    pub rows: usize,
    pub batches: usize,
    pub malformed: usize,
    pub full_ids: Vec<String>,
    pub short_ids: Vec<ShortIdSighting>,
    pub periods: Vec<String>,
}

impl PartialAggregate {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every record was read, extracted and folded
    Completed,
    /// The scope was cancelled before the reducer saw the merged stream close
    Cancelled(CancelReason),
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// Everything a run hands back to the caller
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub aggregate: FinalAggregate,
    pub status: RunStatus,
    pub stats: ProcessingStats,
}
