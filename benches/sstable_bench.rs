use std::path::Path;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use sstable::cache::ShardedCache;
use sstable::env::{FsRandomAccessFile, FsWritableFile, WritableFile};
use sstable::filter::BloomFilterPolicy;
use sstable::iterators::StorageIterator;
use sstable::{Options, ReadOptions, Table, TableBuilder};

const NUM_KEYS: usize = 100_000;

#[inline(always)]
fn generate_key(i: usize) -> Vec<u8> {
    format!("key{i:08}").into_bytes()
}

fn bench_options() -> Options {
    Options {
        filter_policy: Some(Arc::new(BloomFilterPolicy::new(10))),
        block_cache: Some(Arc::new(ShardedCache::new(8 << 20))),
        ..Options::default()
    }
}

fn build_table(path: &Path, options: Options) -> u64 {
    let file = FsWritableFile::create(path).unwrap();
    let mut builder = TableBuilder::new(options, file);
    for i in 0..NUM_KEYS {
        builder.add(&generate_key(i), format!("value{i}").as_bytes());
    }
    builder.finish().unwrap();
    let size = builder.file_size();
    let mut file = builder.into_file();
    file.sync().unwrap();
    file.close().unwrap();
    size
}

fn build_bench(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    c.bench_function("build 100k keys", |b| {
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            build_table(&dir.path().join(format!("bench{n}.sst")), bench_options())
        });
    });
}

fn read_bench(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("read.sst");
    let options = bench_options();
    build_table(&path, options.clone());
    let (file, size) = FsRandomAccessFile::open(&path).unwrap();
    let table = Arc::new(Table::open(options, Arc::new(file), size).unwrap());

    let mut group = c.benchmark_group("read 100k-key table");
    group.bench_function("random gets", |b| {
        let mut rng = SmallRng::seed_from_u64(42);
        let read = ReadOptions::default();
        b.iter(|| {
            let i = rng.gen_range(0..NUM_KEYS);
            table.get(&read, &generate_key(i)).unwrap().unwrap()
        });
    });
    group.bench_function("absent gets through filter", |b| {
        let mut rng = SmallRng::seed_from_u64(43);
        let read = ReadOptions::default();
        b.iter(|| {
            let i = rng.gen_range(0..NUM_KEYS);
            table.get(&read, format!("missing{i}").as_bytes()).unwrap()
        });
    });
    group.bench_function("full scan", |b| {
        b.iter(|| {
            let mut iter = table.clone().new_iterator(ReadOptions::default());
            let mut count = 0usize;
            iter.seek_to_first();
            while iter.valid() {
                count += 1;
                iter.next();
            }
            count
        });
    });
    group.finish();
}

criterion_group!(benches, build_bench, read_bench);
criterion_main!(benches);
