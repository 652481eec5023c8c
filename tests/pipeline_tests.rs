mod common;
use common::*;

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufReader, Cursor, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tally::{
    CancelReason, CancelToken, FinalAggregate, ParallelConfig, ParallelProcessor, RunStatus,
    Source,
};
use tempfile::NamedTempFile;

fn processor(num_workers: usize, batch_size: usize) -> ParallelProcessor {
    ParallelProcessor::new(ParallelConfig {
        num_workers,
        batch_size,
        deadline: None,
    })
}

fn run(input: &str, num_workers: usize, batch_size: usize) -> Result<FinalAggregate> {
    let outcome = processor(num_workers, batch_size)
        .process_reader(Cursor::new(input.to_string()), &CancelToken::new())?;
    assert_eq!(outcome.status, RunStatus::Completed);
    Ok(outcome.aggregate)
}

fn sample_input() -> String {
    records(&[
        ("DOE, JANE A", "01152020"),
        ("SMITH, JOHN", "02012020"),
        ("DOE, JANE A", "01202020"),
        ("ROE, JOHN Q", "11302019"),
        ("PLAIN NAME", "1234"),
    ])
}

#[test]
fn test_sample_aggregate() -> Result<()> {
    let aggregate = run(&sample_input(), 3, 2)?;

    assert_eq!(aggregate.rows, 5);
    assert_eq!(aggregate.distinct_identities, 4);
    let leader = aggregate.most_common.expect("leader");
    assert_eq!((leader.key.as_str(), leader.count), ("JANE", 2));
    assert_eq!(aggregate.malformed_records, 1);

    let histogram: Vec<(&str, usize)> = aggregate
        .period_histogram
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    assert_eq!(histogram, vec![("--", 1), ("01", 2), ("02", 1), ("11", 1)]);
    Ok(())
}

#[test]
fn test_result_independent_of_workers_and_batch_size() -> Result<()> {
    let mut rows = Vec::new();
    let names = ["DOE, JANE", "SMITH, JOHN", "ROE, ANN B", "LEE, JOHN", "KIM, ANN"];
    for i in 0..240 {
        let name = names[(i * 7 + i / 3) % names.len()];
        let date = format!("{:02}01{}", i % 12 + 1, 2000 + i % 20);
        rows.push((name.to_string(), date));
    }
    rows.push(("BROKEN".to_string(), "x".to_string()));
    let input: String = rows
        .iter()
        .map(|(name, date)| record(name, date) + "\n")
        .collect();
    let line_count = rows.len();

    let baseline = run(&input, 1, line_count)?;
    assert_eq!(baseline.rows, line_count);
    for workers in [1, 4, 17] {
        for batch_size in [1, 100, line_count] {
            assert_eq!(
                run(&input, workers, batch_size)?,
                baseline,
                "workers={} batch_size={}",
                workers,
                batch_size
            );
        }
    }
    Ok(())
}

#[test]
fn test_empty_source() -> Result<()> {
    for workers in [1, 4] {
        let aggregate = run("", workers, 10)?;
        assert_eq!(aggregate, FinalAggregate::default());
        assert!(aggregate.most_common.is_none());
        assert!(aggregate.period_histogram.is_empty());
    }
    Ok(())
}

#[test]
fn test_single_record() -> Result<()> {
    let aggregate = run(&record("DOE, JANE", "07042021"), 4, 1000)?;
    assert_eq!(aggregate.rows, 1);
    assert_eq!(aggregate.distinct_identities, 1);
    let leader = aggregate.most_common.expect("leader");
    assert_eq!((leader.key.as_str(), leader.count), ("JANE", 1));
    assert_eq!(aggregate.period_histogram.get("07"), Some(&1));
    Ok(())
}

#[test]
fn test_tie_goes_to_earliest_first_appearance() -> Result<()> {
    let input = records(&[
        ("A, ZED", "01012020"),
        ("B, AMY", "01012020"),
        ("C, AMY", "01012020"),
        ("D, ZED", "01012020"),
    ]);
    for workers in [1, 2, 4, 17] {
        for batch_size in [1, 2, 3, 4] {
            let leader = run(&input, workers, batch_size)?.most_common.expect("leader");
            assert_eq!(
                (leader.key.as_str(), leader.count),
                ("ZED", 2),
                "workers={} batch_size={}",
                workers,
                batch_size
            );
        }
    }
    Ok(())
}

#[test]
fn test_tie_ignores_which_key_reached_the_count_first() -> Result<()> {
    // BEN reaches two first, but ANN was seen first
    let input = records(&[
        ("A, ANN", "01012020"),
        ("B, BEN", "01012020"),
        ("C, BEN", "01012020"),
        ("D, ANN", "01012020"),
    ]);
    for workers in [1, 3] {
        for batch_size in [1, 4] {
            let leader = run(&input, workers, batch_size)?.most_common.expect("leader");
            assert_eq!((leader.key.as_str(), leader.count), ("ANN", 2));
        }
    }
    Ok(())
}

#[test]
fn test_crlf_and_missing_final_newline() -> Result<()> {
    let input = format!(
        "{}\r\n{}",
        record("DOE, JANE", "03012020"),
        record("DOE, JOHN", "03022020")
    );
    let aggregate = run(&input, 2, 1)?;
    assert_eq!(aggregate.rows, 2);
    assert_eq!(aggregate.period_histogram.get("03"), Some(&2));
    assert_eq!(aggregate.malformed_records, 0);
    Ok(())
}

/// Yields the same record forever
struct Endless(Vec<u8>, usize);

impl Read for Endless {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.0[self.1..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.1 = (self.1 + n) % self.0.len();
        Ok(n)
    }
}

fn endless() -> BufReader<Endless> {
    BufReader::new(Endless(
        (record("DOE, JANE", "01012020") + "\n").into_bytes(),
        0,
    ))
}

#[test]
fn test_cancel_mid_run_returns_partial() -> Result<()> {
    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        remote.cancel(CancelReason::Requested);
    });

    let outcome = processor(4, 100).process_reader(endless(), &cancel)?;
    stopper.join().unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled(CancelReason::Requested));
    assert!(outcome.aggregate.rows as u64 <= outcome.stats.lines_read);
    Ok(())
}

#[test]
fn test_deadline_returns_partial() -> Result<()> {
    let outcome = ParallelProcessor::new(ParallelConfig {
        num_workers: 3,
        batch_size: 50,
        deadline: Some(Duration::from_millis(30)),
    })
    .process_reader(endless(), &CancelToken::new())?;

    assert_eq!(outcome.status, RunStatus::Cancelled(CancelReason::Deadline));
    assert!(outcome.aggregate.rows as u64 <= outcome.stats.lines_read);
    Ok(())
}

/// Serves one record, then goes quiet like an idle pipe
struct Stalling {
    served: bool,
}

impl Read for Stalling {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.served {
            thread::sleep(Duration::from_secs(5));
            return Ok(0);
        }
        self.served = true;
        let line = record("DOE, JANE", "01012020") + "\n";
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line.as_bytes()[..n]);
        Ok(n)
    }
}

#[test]
fn test_deadline_on_stalled_source_returns_promptly() -> Result<()> {
    let started = Instant::now();
    let outcome = ParallelProcessor::new(ParallelConfig {
        num_workers: 2,
        batch_size: 10,
        deadline: Some(Duration::from_millis(50)),
    })
    .process_reader(BufReader::new(Stalling { served: false }), &CancelToken::new())?;

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "took {:?}",
        started.elapsed()
    );
    assert_eq!(outcome.status, RunStatus::Cancelled(CancelReason::Deadline));
    assert!(outcome.aggregate.rows as u64 <= outcome.stats.lines_read);
    Ok(())
}

#[test]
fn test_generous_deadline_completes() -> Result<()> {
    let outcome = ParallelProcessor::new(ParallelConfig {
        num_workers: 2,
        batch_size: 2,
        deadline: Some(Duration::from_secs(60)),
    })
    .process_reader(Cursor::new(sample_input()), &CancelToken::new())?;
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.aggregate.rows, 5);
    Ok(())
}

#[test]
fn test_gzip_source_file() -> Result<()> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(sample_input().as_bytes())?;
    let mut file = NamedTempFile::new()?;
    file.write_all(&encoder.finish()?)?;
    file.flush()?;

    let outcome = processor(2, 2).process_source(&Source::from(file.path()), &CancelToken::new())?;
    assert_eq!(outcome.aggregate.rows, 5);
    assert_eq!(outcome.stats.lines_read, 5);
    assert_eq!(outcome.stats.partials_merged, 2);
    Ok(())
}

#[test]
fn test_missing_source_fails_before_start() {
    let cancel = CancelToken::new();
    let err = processor(2, 2)
        .process_source(&Source::from_arg("/no/such/itcont.txt"), &cancel)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("/no/such/itcont.txt"));
    assert!(!cancel.is_cancelled());
}

/// Fails after handing out a few lines
struct FailingReader {
    served: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.served >= 3 {
            return Err(std::io::Error::other("disk on fire"));
        }
        self.served += 1;
        let line = record("DOE, JANE", "01012020") + "\n";
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line.as_bytes()[..n]);
        Ok(n)
    }
}

#[test]
fn test_read_failure_is_an_error() {
    let err = processor(2, 1)
        .process_reader(BufReader::new(FailingReader { served: 0 }), &CancelToken::new())
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("disk on fire"), "{}", message);
}
