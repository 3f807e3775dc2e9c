#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rindex::{
    index::{ConstructionContext, IdentityRewriter, InMemoryJournal, JournalTerm, Preindex},
    primitives::array::ArrayOptions,
    types::Result,
};
use tempfile::TempDir;

/// One shard: documents of `(doc_id, term_ids)`, every term indexed.
type Shard = Vec<(u64, Vec<u64>)>;

fn journal(shard: &Shard) -> InMemoryJournal {
    let mut journal = InMemoryJournal::default();
    for (doc_id, terms) in shard {
        journal.push(*doc_id, terms.iter().map(|&t| JournalTerm::new(t, 1)).collect());
    }
    journal
}

fn expected_postings(shards: &[Shard]) -> BTreeMap<u64, BTreeSet<u64>> {
    let mut expected: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for shard in shards {
        for (doc_id, terms) in shard {
            for &term in terms {
                expected.entry(term).or_default().insert(*doc_id);
            }
        }
    }
    expected
}

fn dedup(mut docs: Vec<u64>) -> Vec<u64> {
    docs.dedup();
    docs
}

fn finalized_bytes(ctx: &ConstructionContext, preindex: &Preindex, dir: &TempDir, tag: &str) -> Result<Vec<u8>> {
    let docs = dir.path().join(format!("{tag}-docs.dat"));
    let words = dir.path().join(format!("{tag}-words.dat"));
    preindex.finalize_index(&docs, &words, ctx.array_options())?;
    let mut bytes = std::fs::read(&words)?;
    bytes.extend(std::fs::read(&docs)?);
    Ok(bytes)
}

fn shard_strategy() -> impl Strategy<Value = Shard> {
    prop::collection::vec(
        (0u64..200, prop::collection::vec(0u64..40, 0..6)),
        0..25,
    )
}

#[test]
fn segments_iterate_in_word_order_with_tiled_spans() -> Result<()> {
    let dir = TempDir::new()?;
    let ctx = ConstructionContext::with_threads(dir.path(), 1)?;
    let shard: Shard = vec![(10, vec![30, 2, 30]), (11, vec![2]), (12, vec![17, 2])];
    let preindex = Preindex::construct(&journal(&shard), &IdentityRewriter, &ctx)?;

    let spans: Vec<(u64, u64, u64)> = preindex
        .segments()
        .iter()
        .map(|segment| (segment.word_id, segment.start, segment.end))
        .collect();
    assert_eq!(spans, vec![(2, 0, 3), (17, 3, 4), (30, 4, 6)]);
    assert_eq!(preindex.segments().total_size(), 6);
    assert_eq!(preindex.documents().len(), 6);
    assert_eq!(preindex.postings(2), Some(vec![10, 11, 12]));
    assert_eq!(preindex.postings(30), Some(vec![10, 10]));
    preindex.delete()?;
    Ok(())
}

#[test]
fn chained_merges_leave_no_temp_files() -> Result<()> {
    let work = TempDir::new()?;
    let ctx = ConstructionContext::with_threads(work.path(), 2)?;
    let shards: Vec<Shard> = (0..4u64)
        .map(|s| (0..30u64).map(|d| (d * 4 + s, vec![d % 7, 100 + s])).collect())
        .collect();

    let mut merged = Preindex::construct(&journal(&shards[0]), &IdentityRewriter, &ctx)?;
    for shard in &shards[1..] {
        let next = Preindex::construct(&journal(shard), &IdentityRewriter, &ctx)?;
        let combined = Preindex::merge(&ctx, &merged, &next)?;
        merged.delete()?;
        next.delete()?;
        merged = combined;
    }

    for (word, docs) in expected_postings(&shards) {
        let expected: Vec<u64> = docs.into_iter().collect();
        assert_eq!(merged.postings(word).map(dedup), Some(expected), "word {word}");
    }
    // one segments pair and one docs file remain
    assert_eq!(std::fs::read_dir(work.path())?.count(), 3);
    merged.delete()?;
    assert_eq!(std::fs::read_dir(work.path())?.count(), 0);
    Ok(())
}

#[test]
fn merged_reference_reopens_with_paged_arrays() -> Result<()> {
    let work = TempDir::new()?;
    let paged = ArrayOptions::default()
        .with_max_single_words(16)
        .with_page_words(8192);
    let ctx = ConstructionContext::with_threads(work.path(), 1)?.with_array_options(paged);
    let left: Shard = (0..40).map(|d| (d, vec![1, 2])).collect();
    let right: Shard = (20..60).map(|d| (d, vec![2, 3])).collect();
    let a = Preindex::construct(&journal(&left), &IdentityRewriter, &ctx)?;
    let b = Preindex::construct(&journal(&right), &IdentityRewriter, &ctx)?;
    let merged = Preindex::merge(&ctx, &a, &b)?;

    let reference = merged.close_to_reference()?;
    let reopened = reference.open(ctx.array_options())?;
    assert_eq!(reopened.postings(1), Some((0..40).collect()));
    assert_eq!(reopened.postings(2), Some((0..60).collect()));
    assert_eq!(reopened.postings(3), Some((20..60).collect()));
    reopened.delete()?;
    a.delete()?;
    b.delete()?;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn merge_order_does_not_change_the_index(shards in prop::collection::vec(shard_strategy(), 3..=3)) {
        let work = TempDir::new().unwrap();
        let ctx = ConstructionContext::with_threads(work.path(), 2).unwrap();
        let build = |shard: &Shard| Preindex::construct(&journal(shard), &IdentityRewriter, &ctx).unwrap();
        let (a, b, c) = (build(&shards[0]), build(&shards[1]), build(&shards[2]));

        // (a + b) + c
        let ab = Preindex::merge(&ctx, &a, &b).unwrap();
        let left = Preindex::merge(&ctx, &ab, &c).unwrap();
        // a + (c + b)
        let cb = Preindex::merge(&ctx, &c, &b).unwrap();
        let right = Preindex::merge(&ctx, &a, &cb).unwrap();

        let expected = expected_postings(&shards);
        for (word, docs) in &expected {
            let docs: Vec<u64> = docs.iter().copied().collect();
            prop_assert_eq!(left.postings(*word).map(dedup), Some(docs));
        }
        prop_assert_eq!(left.segments().len(), expected.len() as u64);

        let left_bytes = finalized_bytes(&ctx, &left, &work, "left").unwrap();
        let right_bytes = finalized_bytes(&ctx, &right, &work, "right").unwrap();
        prop_assert_eq!(left_bytes, right_bytes);
    }
}
