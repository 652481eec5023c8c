//! Main parallel processor
//!
//! Contains the ParallelProcessor struct that orchestrates the pipeline:
//! reader -> workers -> combiner -> reducer, all inside one cancel scope.

use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::{CancelReason, CancelToken};
use crate::extract::{DelimitedExtractor, RecordExtractor};
use crate::readers::Source;
use crate::stats::ProcessingStats;

use super::batching::batch_reader_thread;
use super::combiner::spawn_combiner;
use super::reducer::{reduce_stream, Reducer};
use super::types::{ParallelConfig, PipelineOutcome, RunStatus};
use super::worker::worker_thread;

/// Main parallel processor
pub struct ParallelProcessor {
    config: ParallelConfig,
    extractor: Arc<dyn RecordExtractor>,
}

impl ParallelProcessor {
    pub fn new(config: ParallelConfig) -> Self {
        Self {
            config,
            extractor: Arc::new(DelimitedExtractor::default()),
        }
    }

    pub fn with_extractor<E: RecordExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Open `source` and run the pipeline over it.
    ///
    /// An unopenable source is returned as an error before any stage starts.
    pub fn process_source(&self, source: &Source, cancel: &CancelToken) -> Result<PipelineOutcome> {
        self.config.validate()?;
        let reader = source.open()?;
        debug!(%source, "source opened");
        self.process_reader(reader, cancel)
    }

    /// Run the pipeline over an already-open reader.
    ///
    /// `cancel` is the run's scope: the caller may cancel it to stop early,
    /// and it is always cancelled with `Finished` before this returns, so a
    /// token serves exactly one run.
    pub fn process_reader<R: BufRead + Send + 'static>(
        &self,
        reader: R,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome> {
        self.config.validate()?;

        let started = Instant::now();
        let num_workers = self.config.num_workers;
        let watchdog = self
            .config
            .deadline
            .map(|deadline| cancel.cancel_at(started + deadline));

        info!(
            workers = num_workers,
            batch_size = self.config.batch_size,
            deadline = ?self.config.deadline,
            "starting pipeline"
        );

        // Stage 1: reader
        let (batch_sender, batch_receiver) = bounded(num_workers);
        let reader_handle = {
            let batch_size = self.config.batch_size;
            let cancel = cancel.clone();
            thread::spawn(move || batch_reader_thread(reader, batch_size, batch_sender, cancel))
        };

        // Stage 2: workers, each with a private output channel
        let mut worker_outputs = Vec::with_capacity(num_workers);
        let mut worker_handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let (result_sender, result_receiver) = bounded(1);
            worker_outputs.push(result_receiver);

            let batch_receiver = batch_receiver.clone();
            let extractor = Arc::clone(&self.extractor);
            let cancel = cancel.clone();
            worker_handles.push(thread::spawn(move || {
                worker_thread(worker_id, batch_receiver, result_sender, extractor, cancel)
            }));
        }
        drop(batch_receiver);

        // Stage 3: fan-in
        let (merged, combiner) = spawn_combiner(worker_outputs, cancel);

        // Stage 4: reduce on this thread
        let mut reducer = Reducer::new();
        let stream_closed = reduce_stream(&merged, &mut reducer, cancel);
        let status = match cancel.reason() {
            Some(reason) => RunStatus::Cancelled(reason),
            None if stream_closed => RunStatus::Completed,
            None => RunStatus::Cancelled(CancelReason::Requested),
        };

        // Release anything still running, then join every stage. A line pump
        // stuck in a read on an idle source is the only thread left behind.
        cancel.cancel(CancelReason::Finished);
        drop(merged);

        let reader_result = reader_handle
            .join()
            .map_err(|_| anyhow!("reader thread panicked"));
        let mut worker_panic = None;
        for (worker_id, handle) in worker_handles.into_iter().enumerate() {
            if handle.join().is_err() {
                worker_panic.get_or_insert(worker_id);
            }
        }
        let combiner_result = combiner.join();
        if let Some(watchdog) = watchdog {
            if watchdog.join().is_err() {
                warn!("deadline watchdog panicked");
            }
        }

        let summary = reader_result??;
        if let Some(worker_id) = worker_panic {
            return Err(anyhow!("worker thread {} panicked", worker_id));
        }
        combiner_result?;

        let partials_merged = reducer.partials_merged();
        let aggregate = reducer.finish();
        if status.is_complete() && aggregate.rows as u64 != summary.records_sent {
            return Err(anyhow!(
                "pipeline lost records: reader sent {} but {} were folded",
                summary.records_sent,
                aggregate.rows
            ));
        }

        let stats = ProcessingStats {
            lines_read: summary.lines_read,
            batches_read: summary.batches_sent,
            records_batched: summary.records_sent,
            malformed_records: aggregate.malformed_records,
            workers: num_workers,
            partials_merged,
            elapsed: started.elapsed(),
        };

        match status {
            RunStatus::Completed => info!(rows = aggregate.rows, "pipeline completed"),
            RunStatus::Cancelled(reason) => {
                warn!(%reason, rows = aggregate.rows, "pipeline stopped early")
            }
        }

        Ok(PipelineOutcome {
            aggregate,
            status,
            stats,
        })
    }
}
