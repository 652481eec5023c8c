//! Sequential fold of partial aggregates into the final result
//!
//! The reducer runs on the caller's thread and is the only reader of the
//! merged stream, so it owns its maps outright.

use crossbeam_channel::{select, Receiver};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

use crate::cancel::CancelToken;

use super::types::PartialAggregate;

/// A key and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: usize,
}

/// The aggregate handed back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalAggregate {
    pub rows: usize,
    pub distinct_identities: usize,
    pub most_common: Option<KeyCount>,
    pub period_histogram: BTreeMap<String, usize>,
    pub malformed_records: usize,
}

#[derive(Debug, Clone, Copy)]
struct ShortTally {
    count: usize,
    first_line: u64,
}

/// Incremental fold state
#[derive(Debug, Default)]
pub struct Reducer {
    aggregate: FinalAggregate,
    identities: HashSet<String>,
    short_tallies: HashMap<String, ShortTally>,
    partials_merged: usize,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one worker's partial aggregate.
    ///
    /// Every update is commutative, so arrival order does not change the
    /// result. Among short identities with equal maximal count, the one
    /// first seen earliest in the source leads.
    pub fn fold(&mut self, partial: PartialAggregate) {
        self.aggregate.rows += partial.rows;
        self.aggregate.malformed_records += partial.malformed;

        self.identities.extend(partial.full_ids);
        self.aggregate.distinct_identities = self.identities.len();

        for period in partial.periods {
            *self.aggregate.period_histogram.entry(period).or_insert(0) += 1;
        }

        for sighting in partial.short_ids {
            let key = sighting.key;
            let tally = match self.short_tallies.get_mut(&key) {
                Some(tally) => {
                    tally.count += 1;
                    tally.first_line = tally.first_line.min(sighting.line_num);
                    *tally
                }
                None => {
                    let tally = ShortTally {
                        count: 1,
                        first_line: sighting.line_num,
                    };
                    self.short_tallies.insert(key.clone(), tally);
                    tally
                }
            };

            let displace = match &self.aggregate.most_common {
                None => true,
                Some(leader) if leader.key == key => true,
                Some(leader) => {
                    let leader_first = self
                        .short_tallies
                        .get(&leader.key)
                        .map_or(u64::MAX, |t| t.first_line);
                    tally.count > leader.count
                        || (tally.count == leader.count && tally.first_line < leader_first)
                }
            };
            if displace {
                self.aggregate.most_common = Some(KeyCount {
                    key,
                    count: tally.count,
                });
            }
        }

        self.partials_merged += 1;
        trace!(
            worker_id = partial.worker_id,
            rows = self.aggregate.rows,
            "folded partial aggregate"
        );
    }

    pub fn partials_merged(&self) -> usize {
        self.partials_merged
    }

    /// Current state without consuming the reducer
    pub fn snapshot(&self) -> &FinalAggregate {
        &self.aggregate
    }

    pub fn finish(self) -> FinalAggregate {
        self.aggregate
    }
}

/// Drain the merged stream into `reducer`.
///
/// Returns true when the stream closed on its own, false when the scope was
/// cancelled first. Either way `reducer` holds everything folded so far.
pub(crate) fn reduce_stream(
    merged: &Receiver<PartialAggregate>,
    reducer: &mut Reducer,
    cancel: &CancelToken,
) -> bool {
    loop {
        select! {
            recv(merged) -> msg => match msg {
                Ok(partial) => reducer.fold(partial),
                Err(_) => {
                    debug!(partials = reducer.partials_merged(), "merged stream closed");
                    return true;
                }
            },
            recv(cancel.done()) -> _ => {
                debug!(partials = reducer.partials_merged(), "reducer stopped on cancellation");
                return false;
            }
        }
    }
}
