use anyhow::{anyhow, Result};

use crate::cli::{Cli, OutputFormat, StatsFormat};
use crate::extract::FieldLayout;
use crate::parallel::ParallelConfig;
use crate::readers::Source;

/// Main configuration struct for tally
#[derive(Debug, Clone)]
pub struct TallyConfig {
    pub source: Source,
    pub parallel: ParallelConfig,
    pub layout: FieldLayout,
    pub output: OutputConfig,
    pub verbose: u8,
}

/// Output configuration
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub stats: Option<StatsFormat>,
}

impl TallyConfig {
    /// Build the run configuration from parsed arguments.
    ///
    /// Errors here are usage errors: nothing has been opened yet.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let file = cli
            .file
            .as_deref()
            .ok_or_else(|| anyhow!("no input file given (use '-' to read stdin)"))?;

        let defaults = ParallelConfig::default();
        let parallel = ParallelConfig {
            num_workers: effective_threads(cli.threads),
            batch_size: cli.batch_size.unwrap_or(defaults.batch_size),
            deadline: cli.deadline,
        };
        parallel.validate()?;

        let layout = FieldLayout {
            separator: cli.separator,
            identity_field: cli.identity_field,
            period_field: cli.period_field,
        };
        layout.validate()?;

        Ok(Self {
            source: Source::from_arg(file),
            parallel,
            layout,
            output: OutputConfig {
                format: cli.output_format,
                stats: cli.stats,
            },
            verbose: cli.verbose,
        })
    }
}

/// `0` means one worker per logical CPU
pub fn effective_threads(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

/// Prefix a user-facing message with the program name
pub fn format_error_message(message: &str) -> String {
    format!("tally: {}", message)
}
