//! Worker thread for parallel processing
//!
//! Workers compete for batches on the shared channel and fold every record
//! into a private `PartialAggregate`. Each worker emits that aggregate once,
//! after the batch channel closes.

use crossbeam_channel::{select, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::extract::RecordExtractor;

use super::types::{Batch, PartialAggregate, ShortIdSighting};

/// Worker thread: drains batches until the reader is done, then emits once.
///
/// Returns whether the partial aggregate was handed downstream. A cancelled
/// worker drops its partial.
pub(crate) fn worker_thread(
    worker_id: usize,
    batch_receiver: Receiver<Batch>,
    result_sender: Sender<PartialAggregate>,
    extractor: Arc<dyn RecordExtractor>,
    cancel: CancelToken,
) -> bool {
    let mut partial = PartialAggregate::new(worker_id);

    loop {
        select! {
            recv(batch_receiver) -> msg => {
                match msg {
                    Ok(batch) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        trace!(worker_id, batch_id = batch.id, "worker took batch");
                        absorb_batch(&mut partial, batch, extractor.as_ref());
                    }
                    Err(_) => break,
                }
            }
            recv(cancel.done()) -> _ => break,
        }
    }

    if cancel.is_cancelled() {
        debug!(worker_id, rows = partial.rows, "worker cancelled, partial dropped");
        return false;
    }

    let rows = partial.rows;
    let batches = partial.batches;
    select! {
        send(result_sender, partial) -> res => {
            if res.is_err() {
                return false;
            }
        }
        recv(cancel.done()) -> _ => return false,
    }

    debug!(worker_id, rows, batches, "worker emitted partial aggregate");
    true
}

/// Run the extractor over every record of `batch`
pub(crate) fn absorb_batch(
    partial: &mut PartialAggregate,
    batch: Batch,
    extractor: &dyn RecordExtractor,
) {
    let mut line_num = batch.start_line_num;
    partial.full_ids.reserve(batch.lines.len());
    partial.short_ids.reserve(batch.lines.len());
    partial.periods.reserve(batch.lines.len());

    for line in batch.lines {
        let fields = extractor.extract(&line);
        if fields.malformed {
            partial.malformed += 1;
        }
        partial.full_ids.push(fields.full_id);
        partial.short_ids.push(ShortIdSighting {
            line_num,
            key: fields.short_id,
        });
        partial.periods.push(fields.period);
        partial.rows += 1;
        line_num += 1;
    }
    partial.batches += 1;
}
