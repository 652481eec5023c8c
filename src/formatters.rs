//! Rendering of the final aggregate and processing stats

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use crate::cancel::CancelReason;
use crate::cli::{OutputFormat, StatsFormat};
use crate::parallel::{FinalAggregate, KeyCount, RunStatus};
use crate::stats::ProcessingStats;

/// Turns a finished run into the text written to stdout
pub trait Formatter {
    fn format(&self, aggregate: &FinalAggregate, status: RunStatus) -> Result<String>;
}

pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// One metric per line, histogram buckets indented and sorted by period
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format(&self, aggregate: &FinalAggregate, status: RunStatus) -> Result<String> {
        let mut out = String::new();
        if let RunStatus::Cancelled(reason) = status {
            let _ = writeln!(out, "Status: partial ({})", reason);
        }
        let _ = writeln!(out, "Rows: {}", aggregate.rows);
        let _ = writeln!(out, "Distinct identities: {}", aggregate.distinct_identities);
        match &aggregate.most_common {
            Some(KeyCount { key, count }) => {
                let _ = writeln!(out, "Most common short identity: {} ({})", key, count);
            }
            None => {
                let _ = writeln!(out, "Most common short identity: none");
            }
        }
        if aggregate.malformed_records > 0 {
            let _ = writeln!(out, "Malformed records: {}", aggregate.malformed_records);
        }
        let _ = writeln!(out, "Records per period:");
        for (period, count) in &aggregate.period_histogram {
            let _ = writeln!(out, "  {}: {}", period, count);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum StatusLabel {
    Completed,
    Cancelled,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    status: StatusLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancel_reason: Option<CancelReason>,
    #[serde(flatten)]
    aggregate: &'a FinalAggregate,
}

/// Pretty-printed JSON object with the status alongside the aggregate fields
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, aggregate: &FinalAggregate, status: RunStatus) -> Result<String> {
        let (label, cancel_reason) = match status {
            RunStatus::Completed => (StatusLabel::Completed, None),
            RunStatus::Cancelled(reason) => (StatusLabel::Cancelled, Some(reason)),
        };
        let report = JsonReport {
            status: label,
            cancel_reason,
            aggregate,
        };
        let mut json =
            serde_json::to_string_pretty(&report).context("failed to serialize aggregate")?;
        json.push('\n');
        Ok(json)
    }
}

pub fn format_stats(stats: &ProcessingStats, format: StatsFormat) -> Result<String> {
    match format {
        StatsFormat::Table => Ok(stats.format_stats()),
        StatsFormat::Json => {
            serde_json::to_string_pretty(stats).context("failed to serialize stats")
        }
    }
}
