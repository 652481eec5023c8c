// CLI-specific types and structures
// This module contains the command-line interface definitions and parsing logic

use clap::Parser;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsFormat {
    Table,
    Json,
}

// CLI structure - contains all command-line arguments and options
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Parallel batch aggregation over large delimited record files")]
#[command(
    long_about = "Parallel batch aggregation over large delimited record files\n\nReads newline-delimited records, splits them into batches, folds the batches across a pool of worker threads and prints row count, distinct identities, the most common short identity and a per-period histogram.\n\nCOMMON EXAMPLES:\n  tally itcont.txt\n  tally -j 8 -b 5000 itcont.txt.gz\n  tally --deadline 30s -F json itcont.txt\n  zcat itcont.txt.gz | tally -"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Source file to process ('-' for stdin). Gzip and zstd are detected automatically.
    #[arg(value_name = "FILE")]
    pub file: Option<String>,

    /// Number of worker threads (0 = one per CPU)
    #[arg(
        short = 'j',
        long = "threads",
        default_value_t = 0,
        help_heading = "Performance Options"
    )]
    pub threads: usize,

    /// Records per batch handed to a worker
    #[arg(short = 'b', long = "batch-size", help_heading = "Performance Options")]
    pub batch_size: Option<usize>,

    /// Stop after this long and report the partial result (e.g. 500ms, 30s, 2m)
    #[arg(
        long = "deadline",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        help_heading = "Performance Options"
    )]
    pub deadline: Option<std::time::Duration>,

    /// Field separator within a record
    #[arg(long = "separator", default_value_t = '|', help_heading = "Record Layout")]
    pub separator: char,

    /// Zero-based index of the `LAST, FIRST` name field
    #[arg(long = "identity-field", default_value_t = 7, help_heading = "Record Layout")]
    pub identity_field: usize,

    /// Zero-based index of the MMDDYYYY date field
    #[arg(long = "period-field", default_value_t = 13, help_heading = "Record Layout")]
    pub period_field: usize,

    /// Output format for the final aggregate
    #[arg(
        short = 'F',
        long = "output-format",
        value_enum,
        default_value_t = OutputFormat::Text,
        help_heading = "Output Options"
    )]
    pub output_format: OutputFormat,

    /// Print processing stats to stderr. Use -s for a table, or --stats=json.
    #[arg(
        short = 's',
        long = "stats",
        value_enum,
        value_name = "FORMAT",
        require_equals = true,
        num_args = 0..=1,
        default_missing_value = "table",
        help_heading = "Output Options"
    )]
    pub stats: Option<StatsFormat>,

    /// Disable processing statistics explicitly
    #[arg(long = "no-stats", help_heading = "Output Options", overrides_with = "stats")]
    pub no_stats: bool,

    /// Log pipeline activity to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output Options")]
    pub verbose: u8,

    /// Specify custom configuration file path
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Ignore configuration file
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Use alias from configuration file
    #[arg(short = 'a', long = "alias", help_heading = "Configuration Options")]
    pub alias: Vec<String>,

    /// Show configuration file and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

impl Cli {
    /// Resolve inverted boolean flags to their actual values
    pub fn resolve_boolean_flags(&mut self) {
        if self.no_stats {
            self.stats = None;
        }
    }
}
