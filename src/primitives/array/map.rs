#![allow(unsafe_code)]

//! Memory-mapped word regions.
//!
//! This is the only module that touches `memmap2`'s unsafe constructors. A
//! mapping is viewed as `[u64]` through `bytemuck`, which checks alignment and
//! length once when the region is created. Callers must not truncate a file
//! while a region over it is alive; every owner in this crate drops its
//! regions before resizing the underlying file.

use std::fs::File;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::types::{words_to_bytes, words_to_usize, IndexError, Result};

#[cfg(not(target_endian = "little"))]
compile_error!("index files store little-endian words and are mapped in place");

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A mapped, word-aligned slice of a file.
pub(crate) struct MappedWords {
    map: Mapping,
}

impl MappedWords {
    /// Maps `words` words of `file` starting at `byte_offset` for reading.
    pub(crate) fn read_only(file: &File, byte_offset: u64, words: u64) -> Result<Self> {
        let len = words_to_usize(words_to_bytes(words)?)?;
        // SAFETY: the mapping is private to this value and the file is not
        // resized by this crate while the mapping is alive.
        let map = unsafe { MmapOptions::new().offset(byte_offset).len(len).map(file)? };
        let region = Self {
            map: Mapping::ReadOnly(map),
        };
        region.check_layout()?;
        Ok(region)
    }

    /// Maps `words` words of `file` starting at `byte_offset` for reading and writing.
    pub(crate) fn read_write(file: &File, byte_offset: u64, words: u64) -> Result<Self> {
        let len = words_to_usize(words_to_bytes(words)?)?;
        // SAFETY: see `read_only`; writes go through `words_mut`, which
        // requires exclusive access to this value.
        let map = unsafe { MmapOptions::new().offset(byte_offset).len(len).map_mut(file)? };
        let region = Self {
            map: Mapping::ReadWrite(map),
        };
        region.check_layout()?;
        Ok(region)
    }

    fn bytes(&self) -> &[u8] {
        match &self.map {
            Mapping::ReadOnly(map) => map,
            Mapping::ReadWrite(map) => map,
        }
    }

    fn check_layout(&self) -> Result<()> {
        bytemuck::try_cast_slice::<u8, u64>(self.bytes())
            .map(|_| ())
            .map_err(|_| IndexError::Corruption("mapped region is not word aligned"))
    }

    pub(crate) fn words(&self) -> &[u64] {
        bytemuck::cast_slice(self.bytes())
    }

    /// Mutable word view.
    ///
    /// Panics on a read-only mapping; writing through one is a programming error.
    pub(crate) fn words_mut(&mut self) -> &mut [u64] {
        match &mut self.map {
            Mapping::ReadWrite(map) => bytemuck::cast_slice_mut(&mut map[..]),
            Mapping::ReadOnly(_) => panic!("write to a read-only mapped array"),
        }
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self.map, Mapping::ReadWrite(_))
    }

    pub(crate) fn flush(&self) -> Result<()> {
        match &self.map {
            Mapping::ReadWrite(map) => map.flush().map_err(IndexError::from),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    #[cfg(unix)]
    pub(crate) fn advise_random(&self) -> Result<()> {
        let advice = memmap2::Advice::Random;
        match &self.map {
            Mapping::ReadWrite(map) => map.advise(advice)?,
            Mapping::ReadOnly(map) => map.advise(advice)?,
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn advise_random(&self) -> Result<()> {
        Ok(())
    }
}
