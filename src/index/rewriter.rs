/// Maps a raw document id to the id stored in postings, typically folding a
/// rank into the high bits so postings sort by rank.
pub trait DocIdRewriter: Send + Sync {
    /// Returns the stored id for `doc_id`.
    fn rewrite(&self, doc_id: u64) -> u64;
}

impl<F> DocIdRewriter for F
where
    F: Fn(u64) -> u64 + Send + Sync,
{
    fn rewrite(&self, doc_id: u64) -> u64 {
        self(doc_id)
    }
}

/// Stores document ids unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityRewriter;

impl DocIdRewriter for IdentityRewriter {
    fn rewrite(&self, doc_id: u64) -> u64 {
        doc_id
    }
}
