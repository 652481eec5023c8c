use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tally::{CancelToken, DelimitedExtractor, ParallelConfig, ParallelProcessor, RecordExtractor};

const RECORDS: usize = 50_000;

fn synthetic_source(records: usize) -> Arc<String> {
    let last = ["SMITH", "JONES", "GARCIA", "NGUYEN", "MILLER", "DAVIS"];
    let first = ["JOHN", "MARY", "ANA", "WEI", "ROBERT", "LINDA", "JAMES"];
    let mut out = String::with_capacity(records * 120);
    for i in 0..records {
        out.push_str(&format!(
            "C00{:06}|N|M2|P|201901|15|IND|{}, {} {}|CITY|ST|00000|EMPLOYER|JOB|{:02}{:02}2019|{}||SA{}\n",
            i % 997,
            last[i % last.len()],
            first[(i / 3) % first.len()],
            (b'A' + (i % 26) as u8) as char,
            i % 12 + 1,
            i % 28 + 1,
            i % 500,
            i
        ));
    }
    Arc::new(out)
}

fn bench_extract(c: &mut Criterion) {
    let extractor = DelimitedExtractor::default();
    let record = "C00000001|N|M2|P|201901|15|IND|SMITH, JOHN A|CITY|ST|00000|EMPLOYER|JOB|01152019|100||SA1";
    c.bench_function("extract_record", |b| {
        b.iter(|| black_box(extractor.extract(black_box(record))));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let source = synthetic_source(RECORDS);
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(RECORDS as u64));
    group.sample_size(20);

    for workers in [1usize, 2, 4, 8] {
        for batch_size in [100usize, 1000] {
            let processor = ParallelProcessor::new(ParallelConfig {
                num_workers: workers,
                batch_size,
                deadline: None,
            });
            let id = BenchmarkId::new(format!("workers_{}", workers), batch_size);
            group.bench_with_input(id, &source, |b, source| {
                b.iter(|| {
                    let reader = Cursor::new(source.as_bytes().to_vec());
                    let outcome = processor
                        .process_reader(reader, &CancelToken::new())
                        .expect("pipeline run");
                    black_box(outcome.aggregate.rows)
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_pipeline);
criterion_main!(benches);
