use std::{fs, io::ErrorKind, path::PathBuf};

use super::{Preindex, PreindexDocuments, PreindexSegments};
use crate::primitives::array::ArrayOptions;
use crate::types::Result;

/// The backing files of a closed [`Preindex`].
///
/// Holding references instead of open preindexes keeps mappings released
/// between construction and merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreindexReference {
    /// Sorted word ids.
    pub word_ids_file: PathBuf,
    /// Posting counts.
    pub counts_file: PathBuf,
    /// Postings.
    pub documents_file: PathBuf,
}

impl PreindexReference {
    /// Maps the files back into a live preindex.
    pub fn open(&self, options: &ArrayOptions) -> Result<Preindex> {
        let segments = PreindexSegments::open(self.word_ids_file.clone(), self.counts_file.clone(), options)?;
        let documents = PreindexDocuments::open(self.documents_file.clone(), options)?;
        Ok(Preindex::from_parts(segments, documents))
    }

    /// Removes the files. Files already gone are ignored.
    pub fn delete(self) -> Result<()> {
        for path in [self.word_ids_file, self.counts_file, self.documents_file] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
