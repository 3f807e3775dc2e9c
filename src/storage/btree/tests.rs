use super::{BTreeBlockSize, BTreeContext, BTreeHeader, BTreeReader, BTreeWriter, PooledBTreeReader};
use crate::primitives::array::{decode_search_miss, LongArray, LongQueryBuffer, LongRead, LongWrite};
use crate::primitives::pool::{BufferPool, BufferPoolOptions};
use crate::types::Result;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tempfile::tempdir;

fn random_keys(seed: u64, count: usize, bound: u64) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut keys = BTreeSet::new();
    while keys.len() < count {
        keys.insert(rng.gen_range(1..bound));
    }
    keys.into_iter().collect()
}

/// Writes `[key, key * 3]` records for sorted `keys` at `offset`.
fn build_tree(ctx: BTreeContext, offset: u64, keys: &[u64]) -> Result<LongArray> {
    let n = keys.len() as u64;
    let mut array = LongArray::allocate(offset + ctx.calculate_size(n)?, &Default::default())?;
    BTreeWriter::new(&mut array, ctx)
        .with_verification(true)
        .write(offset, n, |slice| {
            for (i, &key) in keys.iter().enumerate() {
                slice.set(2 * i as u64, key);
                slice.set(2 * i as u64 + 1, key * 3);
            }
            Ok(())
        })?;
    Ok(array)
}

fn pair_context() -> BTreeContext {
    BTreeContext::new(5, 2, BTreeBlockSize::Bs16)
}

#[test]
fn find_entry_locates_every_key() -> Result<()> {
    let ctx = pair_context();
    let keys = random_keys(7, 5000, 1_000_000);
    let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &keys)?), ctx, 0)?;
    assert!(reader.header().layers >= 3);
    assert_eq!(reader.num_entries(), 5000);

    let data = reader.data();
    for (i, &key) in keys.iter().enumerate() {
        let offset = reader.find_entry(key)?;
        assert_eq!(offset, 2 * i as i64, "key {key}");
        assert_eq!(data.get(offset as u64 + 1), key * 3);
    }
    Ok(())
}

#[test]
fn find_entry_reports_insertion_points() -> Result<()> {
    let ctx = pair_context();
    let keys: Vec<u64> = (1..=600).map(|i| i * 10).collect();
    let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &keys)?), ctx, 0)?;

    let miss = reader.find_entry(255)?;
    assert!(miss < 0);
    assert_eq!(decode_search_miss(miss), 2 * 25);

    let below = reader.find_entry(3)?;
    assert_eq!(decode_search_miss(below), 0);

    let beyond = reader.find_entry(6001)?;
    assert_eq!(decode_search_miss(beyond), 2 * 600);
    Ok(())
}

#[test]
fn trees_can_start_mid_array() -> Result<()> {
    let ctx = pair_context();
    let keys = random_keys(11, 300, 10_000);
    let array = build_tree(ctx, 37, &keys)?;
    let header = BTreeHeader::read(&array, &ctx, 37)?;
    assert_eq!(header.index_offset % ctx.page_size(), 0);
    let reader = BTreeReader::new(Arc::new(array), ctx, 37)?;
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(reader.find_entry(key)?, 2 * i as i64);
    }
    Ok(())
}

#[test]
fn query_data_returns_values_or_zero() -> Result<()> {
    let ctx = pair_context();
    let keys: Vec<u64> = (0..2000).map(|i| i * 2 + 1).collect();
    let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &keys)?), ctx, 0)?;
    let probe: Vec<u64> = (0..4100).collect();
    let values = reader.query_data(&probe, 1)?;
    for (&key, &value) in probe.iter().zip(&values) {
        let expected = if key % 2 == 1 && key < 4000 { key * 3 } else { 0 };
        assert_eq!(value, expected, "key {key}");
    }
    Ok(())
}

#[test]
fn small_trees_have_no_index() -> Result<()> {
    let ctx = pair_context();
    let keys = [4, 8, 15, 16, 23, 42];
    let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &keys)?), ctx, 0)?;
    assert_eq!(reader.header().layers, 0);
    assert_eq!(reader.find_entry(23)?, 8);
    assert_eq!(decode_search_miss(reader.find_entry(50)?), 12);

    let mut buffer = LongQueryBuffer::from_values(&[1, 4, 16, 17, 42, 99]);
    reader.retain_entries(&mut buffer)?;
    assert_eq!(buffer.values(), &[4, 16, 42]);
    Ok(())
}

#[test]
fn empty_tree_answers_every_query() -> Result<()> {
    let ctx = pair_context();
    let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &[])?), ctx, 0)?;
    assert_eq!(reader.num_entries(), 0);
    assert_eq!(decode_search_miss(reader.find_entry(5)?), 0);
    assert_eq!(reader.query_data(&[1, 2], 1)?, vec![0, 0]);

    let mut buffer = LongQueryBuffer::from_values(&[1, 2, 3]);
    reader.retain_entries(&mut buffer)?;
    assert!(buffer.is_empty());

    let mut buffer = LongQueryBuffer::from_values(&[1, 2, 3]);
    reader.reject_entries(&mut buffer)?;
    assert_eq!(buffer.values(), &[1, 2, 3]);
    Ok(())
}

#[test]
fn pooled_reader_matches_resident_reader() -> Result<()> {
    let ctx = pair_context();
    let keys = random_keys(23, 3000, 100_000);
    let array = build_tree(ctx, 0, &keys)?;
    let dir = tempdir()?;
    let path = dir.path().join("tree.dat");
    array.write(&path)?;

    let resident = BTreeReader::new(Arc::new(array), ctx, 0)?;
    let pool = Arc::new(BufferPool::open(
        &path,
        BufferPoolOptions::default().with_page_words(64).with_frames(16),
    )?);
    let pooled = PooledBTreeReader::open(pool, ctx, 0)?;
    assert_eq!(pooled.header(), resident.header());

    let probe: Vec<u64> = (0..100_000).step_by(37).collect();
    for &key in &probe {
        assert_eq!(pooled.find_entry(key)?, resident.find_entry(key)?);
    }
    assert_eq!(pooled.query_data(&probe, 1)?, resident.query_data(&probe, 1)?);

    let mut a = LongQueryBuffer::from_values(&probe);
    let mut b = LongQueryBuffer::from_values(&probe);
    pooled.reject_entries(&mut a)?;
    resident.reject_entries(&mut b)?;
    assert_eq!(a.values(), b.values());
    Ok(())
}

#[test]
fn pooled_reader_rejects_mismatched_context() -> Result<()> {
    let ctx = pair_context();
    let array = build_tree(ctx, 0, &random_keys(3, 500, 10_000))?;
    let dir = tempdir()?;
    let path = dir.path().join("tree.dat");
    array.write(&path)?;
    let pool = Arc::new(BufferPool::open(&path, BufferPoolOptions::default())?);
    let other = BTreeContext::new(5, 2, BTreeBlockSize::Bs64);
    assert!(PooledBTreeReader::open(pool, other, 0).is_err());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn retain_and_reject_partition_the_buffer(
        keys in proptest::collection::btree_set(0u64..20_000, 0..1500),
        probe in proptest::collection::btree_set(0u64..20_000, 0..400),
    ) {
        let ctx = pair_context();
        let keys: Vec<u64> = keys.into_iter().collect();
        let probe: Vec<u64> = probe.into_iter().collect();
        let reader = BTreeReader::new(Arc::new(build_tree(ctx, 0, &keys).unwrap()), ctx, 0).unwrap();
        let present: HashSet<u64> = keys.iter().copied().collect();

        let mut retained = LongQueryBuffer::from_values(&probe);
        reader.retain_entries(&mut retained).unwrap();
        let mut rejected = LongQueryBuffer::from_values(&probe);
        reader.reject_entries(&mut rejected).unwrap();

        let expect_in: Vec<u64> = probe.iter().copied().filter(|v| present.contains(v)).collect();
        let expect_out: Vec<u64> = probe.iter().copied().filter(|v| !present.contains(v)).collect();
        prop_assert_eq!(retained.values(), expect_in.as_slice());
        prop_assert_eq!(rejected.values(), expect_out.as_slice());
    }
}
