use serde::Serialize;
use std::time::Duration;

/// Statistics collected during one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub lines_read: u64,
    pub batches_read: u64,
    pub records_batched: u64,
    pub malformed_records: usize,
    pub workers: usize,
    pub partials_merged: usize,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl ProcessingStats {
    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Lines processed: {} total in {} batches",
            self.lines_read, self.batches_read
        );

        if self.malformed_records > 0 {
            output.push_str(&format!(", {} malformed", self.malformed_records));
        }

        output.push_str(&format!(
            "; {} of {} workers reported",
            self.partials_merged, self.workers
        ));

        let processing_time_ms = self.elapsed.as_millis();
        output.push_str(&format!(" in {}ms", processing_time_ms));

        if processing_time_ms > 0 && self.lines_read > 0 {
            let lines_per_sec = (self.lines_read as f64 * 1000.0) / processing_time_ms as f64;
            output.push_str(&format!(" ({:.0} lines/s)", lines_per_sec));
        }

        output
    }
}
