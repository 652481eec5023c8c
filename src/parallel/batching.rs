//! Batch reader thread for parallel processing
//!
//! Reads the source sequentially and groups records into fixed-size batches.
//! The blocking reads happen on a separate line pump so a stalled source can
//! never keep the reader from noticing cancellation.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::io::{self, BufRead};
use std::thread;
use tracing::{debug, trace};

use crate::cancel::{CancelReason, CancelToken};

use super::types::Batch;

/// Raw lines the pump may read ahead of the batch reader
const PUMP_CAPACITY: usize = 1024;

/// One message from the line pump; `Ok(None)` marks end of input
type Pumped = io::Result<Option<Vec<u8>>>;

/// What the reader produced before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReaderSummary {
    pub lines_read: u64,
    pub batches_sent: u64,
    pub records_sent: u64,
}

/// Move the source onto its own thread and stream raw lines back.
///
/// The pump is detached: a read stuck on an idle source keeps only the pump
/// alive, and it exits on its next send once the scope is cancelled.
fn spawn_line_pump<R>(mut reader: R, cancel: CancelToken) -> Receiver<Pumped>
where
    R: BufRead + Send + 'static,
{
    let (line_sender, line_receiver) = bounded(PUMP_CAPACITY);

    thread::spawn(move || loop {
        let mut buffer = Vec::new();
        let message = match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buffer)),
            Err(error) => Err(error),
        };
        let last = !matches!(message, Ok(Some(_)));

        select! {
            send(line_sender, message) -> res => {
                if res.is_err() || last {
                    return;
                }
            }
            recv(cancel.done()) -> _ => return,
        }
    });

    line_receiver
}

/// Reader thread - owns the source and emits batches of `batch_size` records.
///
/// Waits on the next line and on the scope at the same time. A cancelled
/// reader drops whatever is still buffered; a reader that reaches end of
/// input flushes it.
pub(crate) fn batch_reader_thread<R>(
    reader: R,
    batch_size: usize,
    batch_sender: Sender<Batch>,
    cancel: CancelToken,
) -> Result<ReaderSummary>
where
    R: BufRead + Send + 'static,
{
    let mut summary = ReaderSummary::default();
    let mut current_batch = Vec::with_capacity(batch_size);
    let mut batch_start_line = 1u64;

    if cancel.is_cancelled() {
        debug!("reader cancelled before start");
        return Ok(summary);
    }
    let lines = spawn_line_pump(reader, cancel.clone());

    loop {
        let pumped = if cancel.is_cancelled() {
            None
        } else {
            select! {
                recv(lines) -> msg => Some(msg),
                recv(cancel.done()) -> _ => None,
            }
        };

        let buffer = match pumped {
            None => {
                debug!(
                    lines_read = summary.lines_read,
                    dropped = current_batch.len(),
                    "reader stopping on cancellation"
                );
                return Ok(summary);
            }
            Some(Ok(Ok(Some(buffer)))) => buffer,
            Some(Ok(Ok(None))) => break,
            Some(Ok(Err(error))) => {
                cancel.cancel(CancelReason::Failed);
                return Err(error).with_context(|| {
                    format!("while reading source line {}", summary.lines_read + 1)
                });
            }
            Some(Err(_)) => {
                cancel.cancel(CancelReason::Failed);
                return Err(anyhow!(
                    "source reader stopped without reaching end of input after line {}",
                    summary.lines_read
                ));
            }
        };

        summary.lines_read += 1;
        current_batch.push(decode_record(&buffer));

        if current_batch.len() == batch_size
            && !send_batch(
                &batch_sender,
                &mut current_batch,
                &mut batch_start_line,
                &mut summary,
                &cancel,
            )
        {
            return Ok(summary);
        }
    }

    if !current_batch.is_empty() {
        send_batch(
            &batch_sender,
            &mut current_batch,
            &mut batch_start_line,
            &mut summary,
            &cancel,
        );
    }

    debug!(
        lines_read = summary.lines_read,
        batches = summary.batches_sent,
        "reader reached end of input"
    );
    Ok(summary)
}

/// Hand the current batch to whichever worker is free.
///
/// Returns false when the batch could not be delivered: the scope was
/// cancelled while waiting, or every worker is gone.
fn send_batch(
    batch_sender: &Sender<Batch>,
    current_batch: &mut Vec<String>,
    batch_start_line: &mut u64,
    summary: &mut ReaderSummary,
    cancel: &CancelToken,
) -> bool {
    let capacity = current_batch.capacity();
    let lines = std::mem::replace(current_batch, Vec::with_capacity(capacity));
    let batch_len = lines.len() as u64;
    let batch = Batch {
        id: summary.batches_sent,
        lines,
        start_line_num: *batch_start_line,
    };

    select! {
        send(batch_sender, batch) -> res => {
            if res.is_err() {
                return false;
            }
        }
        recv(cancel.done()) -> _ => return false,
    }

    trace!(
        batch_id = summary.batches_sent,
        start_line = *batch_start_line,
        len = batch_len,
        "batch sent"
    );
    summary.batches_sent += 1;
    summary.records_sent += batch_len;
    *batch_start_line += batch_len;
    true
}

/// Strip the line terminator; invalid UTF-8 is replaced rather than rejected
fn decode_record(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
