#![forbid(unsafe_code)]

//! Positioned word access to files that are not mapped.
//!
//! Offsets and lengths are in words. Reads never move a shared cursor, so one
//! handle can serve concurrent readers.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use crate::types::{words_to_bytes, IndexError, Result, WORD_BYTES};

/// Word-granular positioned file access, used by the buffer pool and by
/// bulk transfers into arrays.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` with the words starting at word `word_off`. Reading past
    /// the end of the file is an error.
    fn read_words_at(&self, word_off: u64, dst: &mut [u64]) -> Result<()>;

    /// Stores `src` starting at word `word_off`, extending the file if needed.
    fn write_words_at(&self, word_off: u64, src: &[u64]) -> Result<()>;

    /// File length in words.
    fn len_words(&self) -> Result<u64>;

    /// Cuts or extends the file to `words` words.
    fn set_len_words(&self, words: u64) -> Result<()>;

    /// Flushes data and metadata to disk.
    fn sync_all(&self) -> Result<()>;
}

#[cfg(unix)]
fn read_at(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, dst, off)
}

#[cfg(unix)]
fn write_at(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, src, off)
}

#[cfg(windows)]
fn read_at(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, dst, off)
}

#[cfg(windows)]
fn write_at(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, src, off)
}

/// [`FileIo`] over a shared `std::fs::File`.
#[derive(Clone, Debug)]
pub struct StdFileIo {
    file: Arc<File>,
}

impl StdFileIo {
    /// Opens `path` for reading and writing, creating it when absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file: Arc::new(file) })
    }

    /// Opens an existing file for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file: Arc::new(file) })
    }
}

impl FileIo for StdFileIo {
    fn read_words_at(&self, word_off: u64, dst: &mut [u64]) -> Result<()> {
        let mut off = words_to_bytes(word_off)?;
        let mut buf: &mut [u8] = bytemuck::cast_slice_mut(dst);
        while !buf.is_empty() {
            match read_at(&self.file, buf, off) {
                Ok(0) => {
                    return Err(IndexError::Io(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "word read past end of file",
                    )))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    off += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn write_words_at(&self, word_off: u64, src: &[u64]) -> Result<()> {
        let mut off = words_to_bytes(word_off)?;
        let mut buf: &[u8] = bytemuck::cast_slice(src);
        while !buf.is_empty() {
            match write_at(&self.file, buf, off) {
                Ok(0) => return Err(IndexError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => {
                    buf = &buf[n..];
                    off += n as u64;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn len_words(&self) -> Result<u64> {
        let bytes = self.file.metadata()?.len();
        if bytes % WORD_BYTES != 0 {
            return Err(IndexError::Corruption("file length is not a whole number of words"));
        }
        Ok(bytes / WORD_BYTES)
    }

    fn set_len_words(&self, words: u64) -> Result<()> {
        self.file.set_len(words_to_bytes(words)?)?;
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
