#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rindex::{
    primitives::{
        array::{ArrayOptions, LongArray, LongQueryBuffer, LongWrite},
        pool::{BufferEvictionPolicy, BufferPool, BufferPoolOptions, BufferReadaheadPolicy},
    },
    storage::btree::{BTreeBlockSize, BTreeContext, BTreeReader, BTreeWriter, PooledBTreeReader},
    types::Result,
};
use tempfile::TempDir;

const CTX: BTreeContext = BTreeContext::new(5, 2, BTreeBlockSize::Bs64);

/// Writes a tree of `[key, key + 1]` records for even keys below `2 * n`.
fn write_tree_file(path: &Path, n: u64) -> Result<()> {
    let mut array = LongArray::map_for_writing(path, CTX.calculate_size(n)?, &ArrayOptions::default())?;
    BTreeWriter::new(&mut array, CTX).write(0, n, |data| {
        for i in 0..n {
            data.set(2 * i, 2 * i);
            data.set(2 * i + 1, 2 * i + 1);
        }
        Ok(())
    })?;
    array.force()
}

fn pool(path: &Path, frames: usize, readahead: BufferReadaheadPolicy) -> Result<Arc<BufferPool>> {
    let options = BufferPoolOptions::default()
        .with_page_words(256)
        .with_frames(frames)
        .with_eviction(BufferEvictionPolicy::Cache)
        .with_readahead(readahead);
    Ok(Arc::new(BufferPool::open(path, options)?))
}

#[test]
fn pooled_and_resident_readers_agree() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tree.dat");
    write_tree_file(&path, 40_000)?;

    let resident = BTreeReader::new(
        Arc::new(LongArray::map_read_only(&path, &ArrayOptions::default())?),
        CTX,
        0,
    )?;
    let pooled = PooledBTreeReader::open(pool(&path, 16, BufferReadaheadPolicy::None)?, CTX, 0)?;
    assert_eq!(pooled.header(), resident.header());

    let mut rng = ChaCha8Rng::seed_from_u64(5);
    for _ in 0..2_000 {
        let key = rng.gen_range(0..90_000);
        assert_eq!(pooled.find_entry(key)?, resident.find_entry(key)?, "key {key}");
    }

    let mut keys: Vec<u64> = (0..500).map(|_| rng.gen_range(0..90_000)).collect();
    keys.sort_unstable();
    assert_eq!(pooled.query_data(&keys, 1)?, resident.query_data(&keys, 1)?);

    let candidates: Vec<u64> = (0..3_000).map(|i| i * 13).collect();
    let mut a = LongQueryBuffer::from_values(&candidates);
    let mut b = LongQueryBuffer::from_values(&candidates);
    pooled.retain_entries(&mut a)?;
    resident.retain_entries(&mut b)?;
    assert_eq!(a.values(), b.values());
    assert!(a.values().iter().all(|v| v % 2 == 0 && *v < 80_000));
    Ok(())
}

#[test]
fn concurrent_lookups_through_a_small_pool() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tree.dat");
    write_tree_file(&path, 20_000)?;
    let pool = pool(&path, 24, BufferReadaheadPolicy::Small)?;
    let reader = PooledBTreeReader::open(Arc::clone(&pool), CTX, 0)?;

    std::thread::scope(|scope| {
        for seed in 0..4u64 {
            let reader = &reader;
            scope.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                for _ in 0..1_000 {
                    let key = 2 * rng.gen_range(0..20_000u64);
                    let offset = reader.find_entry(key).expect("lookup");
                    assert_eq!(offset, key as i64);
                }
            });
        }
    });

    let stats = pool.stats();
    assert!(stats.disk_reads > 0);
    assert!(stats.evictions > 0, "{stats:?}");
    assert!(pool.resident_pages() <= pool.capacity());
    Ok(())
}
