use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use std::sync::Arc;

use tarndb::common::types::Rid;
use tarndb::index::btree::BPlusTree;
use tarndb::storage::buffer::BufferPoolManager;

// Create a buffer pool over a throwaway database file
fn create_test_environment(buffer_pool_size: usize) -> Arc<BufferPoolManager> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let buffer_pool = Arc::new(BufferPoolManager::new(buffer_pool_size, path).unwrap());

    // Keep the temp file alive for the duration of the benchmark
    std::mem::forget(temp_file);

    buffer_pool
}

fn btree_benchmark(c: &mut Criterion) {
    let buffer_pool_size = 1000;

    let mut group = c.benchmark_group("BPlusTree");

    for size in [100, 500, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("insert", size), size, |b, &size| {
            let buffer_pool = create_test_environment(buffer_pool_size);
            let btree = BPlusTree::<i64>::new("bench", buffer_pool, 64, 64).unwrap();

            let mut rng = rand::thread_rng();
            let keys: Vec<i64> = (0..size).map(|_| rng.gen::<i64>()).collect();
            let mut idx = 0;

            b.iter(|| {
                if idx >= keys.len() {
                    idx = 0;
                }
                let key = keys[idx];
                btree.insert(key, Rid::new(0, idx as u32)).unwrap();
                idx += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("lookup", size), size, |b, &size| {
            let buffer_pool = create_test_environment(buffer_pool_size);
            let btree = BPlusTree::<i64>::new("bench", buffer_pool, 64, 64).unwrap();

            for i in 0..size {
                btree.insert(i as i64, Rid::new(0, i as u32)).unwrap();
            }

            let mut rng = rand::thread_rng();
            b.iter(|| {
                let key = rng.gen_range(0..size) as i64;
                btree.get(&key).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("scan", size), size, |b, &size| {
            let buffer_pool = create_test_environment(buffer_pool_size);
            let btree = BPlusTree::<i64>::new("bench", buffer_pool, 64, 64).unwrap();

            for i in 0..size {
                btree.insert(i as i64, Rid::new(0, i as u32)).unwrap();
            }

            b.iter(|| {
                let mut count = 0usize;
                for item in btree.iter().unwrap() {
                    item.unwrap();
                    count += 1;
                }
                assert_eq!(count, size as usize);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, btree_benchmark);
criterion_main!(benches);
