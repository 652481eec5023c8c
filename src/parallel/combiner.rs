//! Fan-in of worker outputs
//!
//! One forwarding thread per worker output feeds a single merged channel. A
//! join thread waits on a countdown barrier until every forwarder has
//! finished and only then drops the last merged sender, closing the stream.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

use crate::cancel::CancelToken;

use super::types::PartialAggregate;

/// Counts outstanding producers down to zero
pub(crate) struct CountdownBarrier {
    remaining: usize,
    arrivals: Receiver<()>,
    arrival_sender: Sender<()>,
}

/// Held by one producer; reports its completion when dropped, including on
/// early return or panic
pub(crate) struct Arrival {
    sender: Sender<()>,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        let _ = self.sender.send(());
    }
}

impl CountdownBarrier {
    pub fn new(producers: usize) -> Self {
        let (arrival_sender, arrivals) = unbounded();
        Self {
            remaining: producers,
            arrivals,
            arrival_sender,
        }
    }

    pub fn arrival(&self) -> Arrival {
        Arrival {
            sender: self.arrival_sender.clone(),
        }
    }

    /// Wait until every producer arrived. Returns false if the scope was
    /// cancelled first.
    pub fn wait(mut self, cancel: &CancelToken) -> bool {
        while self.remaining > 0 {
            select! {
                recv(self.arrivals) -> msg => {
                    if msg.is_err() {
                        // Unreachable while we hold `arrival_sender`
                        return false;
                    }
                    self.remaining -= 1;
                }
                recv(cancel.done()) -> _ => return false,
            }
        }
        true
    }
}

/// Threads making up the combiner
pub(crate) struct CombinerHandles {
    forwarders: Vec<JoinHandle<usize>>,
    joiner: JoinHandle<bool>,
}

impl CombinerHandles {
    /// Join every combiner thread; returns how many partials were forwarded
    pub fn join(self) -> Result<usize> {
        let mut forwarded = 0;
        let mut panicked = None;
        for (idx, handle) in self.forwarders.into_iter().enumerate() {
            match handle.join() {
                Ok(count) => forwarded += count,
                Err(_) => panicked = Some(idx),
            }
        }
        let all_arrived = self
            .joiner
            .join()
            .map_err(|_| anyhow!("combiner join thread panicked"))?;
        if let Some(idx) = panicked {
            return Err(anyhow!("combiner forwarder {} panicked", idx));
        }
        trace!(forwarded, all_arrived, "combiner joined");
        Ok(forwarded)
    }
}

/// Merge the worker outputs into one stream that closes after all of them do
pub(crate) fn spawn_combiner(
    inputs: Vec<Receiver<PartialAggregate>>,
    cancel: &CancelToken,
) -> (Receiver<PartialAggregate>, CombinerHandles) {
    let (merged_sender, merged_receiver) = bounded(0);
    let barrier = CountdownBarrier::new(inputs.len());

    let forwarders = inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let merged_sender = merged_sender.clone();
            let arrival = barrier.arrival();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let forwarded = forward(input, merged_sender, &cancel);
                trace!(forwarder = idx, forwarded, "forwarder finished");
                drop(arrival);
                forwarded
            })
        })
        .collect();

    let joiner = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            let all_arrived = barrier.wait(&cancel);
            drop(merged_sender);
            debug!(all_arrived, "combiner closed merged stream");
            all_arrived
        })
    };

    (merged_receiver, CombinerHandles { forwarders, joiner })
}

/// Copy everything from `input` to `merged`, abandoning a blocked forward on
/// cancellation. Consumes `merged` so its sender is gone before the caller
/// reports arrival.
fn forward(
    input: Receiver<PartialAggregate>,
    merged: Sender<PartialAggregate>,
    cancel: &CancelToken,
) -> usize {
    let mut forwarded = 0;
    loop {
        let partial = select! {
            recv(input) -> msg => match msg {
                Ok(partial) => partial,
                Err(_) => return forwarded,
            },
            recv(cancel.done()) -> _ => return forwarded,
        };

        select! {
            send(merged, partial) -> res => {
                if res.is_err() {
                    return forwarded;
                }
                forwarded += 1;
            }
            recv(cancel.done()) -> _ => return forwarded,
        }
    }
}
