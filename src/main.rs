use anyhow::Result;
use clap::Parser;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

use tally::cli::Cli;
use tally::config::{format_error_message, TallyConfig};
use tally::config_file::ConfigFile;
use tally::formatters::{create_formatter, format_stats};
use tally::platform::{ExitCode, SafeStdout, SignalHandler};
use tally::{CancelToken, DelimitedExtractor, ParallelProcessor, RunStatus};

fn main() {
    let cli = process_args_with_config();
    init_logging(cli.verbose);

    debug!("tally started with verbosity level: {}", cli.verbose);
    trace!("full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let config = match TallyConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error_message(&format!("{:#}", e)));
            ExitCode::InvalidUsage.exit();
        }
    };

    let cancel = CancelToken::new();
    let signals = match SignalHandler::new(cancel.clone()) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!(
                "{}",
                format_error_message(&format!("failed to initialize signal handling: {}", e))
            );
            ExitCode::GeneralError.exit();
        }
    };

    if let Err(e) = run(&config, &cancel) {
        eprintln!("{}", format_error_message(&format!("{:#}", e)));
        ExitCode::GeneralError.exit();
    }

    match signals.received() {
        Some(code) => code.exit(),
        None => ExitCode::Success.exit(),
    }
}

fn run(config: &TallyConfig, cancel: &CancelToken) -> Result<()> {
    let processor = ParallelProcessor::new(config.parallel.clone())
        .with_extractor(DelimitedExtractor::new(config.layout.clone()));
    let outcome = processor.process_source(&config.source, cancel)?;

    let formatter = create_formatter(config.output.format);
    SafeStdout::new().write_str(&formatter.format(&outcome.aggregate, outcome.status)?)?;

    if let RunStatus::Cancelled(reason) = outcome.status {
        eprintln!(
            "{}",
            format_error_message(&format!(
                "{}, result covers the first {} records only",
                reason, outcome.aggregate.rows
            ))
        );
    }

    if let Some(stats_format) = config.output.stats {
        eprintln!("{}", format_stats(&outcome.stats, stats_format)?);
    }

    Ok(())
}

/// `-v` raises the level one step per occurrence; `RUST_LOG` wins when set
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .try_init();
}

/// Extract --config-file argument from raw args
fn extract_config_file_arg(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config-file" {
            return iter.next().cloned();
        }
        if let Some(path) = arg.strip_prefix("--config-file=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Apply rc-file defaults and aliases, then parse
fn process_args_with_config() -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();

    if raw_args.iter().any(|arg| arg == "--show-config") {
        print!("{}", ConfigFile::describe());
        ExitCode::Success.exit();
    }

    let processed_args = if raw_args.iter().any(|arg| arg == "--ignore-config") {
        raw_args
    } else {
        let config_file_path = extract_config_file_arg(&raw_args);
        match ConfigFile::load_with_custom_path(config_file_path.as_deref())
            .and_then(|config_file| config_file.process_args(raw_args))
        {
            Ok(processed) => processed,
            Err(e) => {
                eprintln!("{}", format_error_message(&format!("config error: {:#}", e)));
                ExitCode::GeneralError.exit();
            }
        }
    };

    let mut cli = Cli::parse_from(processed_args);
    cli.resolve_boolean_flags();
    cli
}
