//! Byte sources behind a matrix reader
//!
//! A reader needs two kinds of access to its file: one-off reads of the
//! header, footer and trailer index, and repeated reads of row ranges.
//! `MmapRowStore` maps the whole file up front; `PagedRowStore` keeps only a
//! file handle and serves rows through a byte-bounded LRU cache.

use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use super::{OwnedBytes, RowCache, RowCacheStats};

pub trait RowStore: Send + Sync {
    /// Total length of the underlying file
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a range that is not expected to be requested again
    fn read_raw(&self, range: Range<u64>) -> io::Result<OwnedBytes>;

    /// Read the bytes of one row; may be served from a cache
    fn read_row(&self, range: Range<u64>) -> io::Result<OwnedBytes> {
        self.read_raw(range)
    }

    fn cache_stats(&self) -> Option<RowCacheStats> {
        None
    }
}

fn check_range(range: &Range<u64>, len: u64) -> io::Result<()> {
    if range.start > range.end || range.end > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Range {}..{} exceeds file size {}",
                range.start, range.end, len
            ),
        ));
    }
    Ok(())
}

/// Whole-file memory map; every read is a zero-copy slice
pub struct MmapRowStore {
    bytes: OwnedBytes,
}

impl MmapRowStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self {
                bytes: OwnedBytes::empty(),
            });
        }
        // The file is write-once; nothing truncates it while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            bytes: OwnedBytes::from_mmap(Arc::new(mmap)),
        })
    }

    /// Serve an in-memory image of a matrix file
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: OwnedBytes::new(bytes),
        }
    }
}

impl RowStore for MmapRowStore {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_raw(&self, range: Range<u64>) -> io::Result<OwnedBytes> {
        check_range(&range, self.len())?;
        Ok(self.bytes.slice(range.start as usize..range.end as usize))
    }
}

/// File handle plus LRU row cache bounded by `max_cached_bytes`.
///
/// Uncached reads are positional, so concurrent readers do not contend on
/// the file handle; only the cache is behind a lock.
pub struct PagedRowStore {
    file: File,
    #[cfg(not(unix))]
    seek_lock: Mutex<()>,
    len: u64,
    cache: Mutex<RowCache>,
}

impl PagedRowStore {
    pub fn open(path: &Path, max_cached_bytes: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            #[cfg(not(unix))]
            seek_lock: Mutex::new(()),
            len,
            cache: Mutex::new(RowCache::new(max_cached_bytes)),
        })
    }
}

impl PagedRowStore {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let _guard = self.seek_lock.lock();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

impl RowStore for PagedRowStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_raw(&self, range: Range<u64>) -> io::Result<OwnedBytes> {
        check_range(&range, self.len)?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        self.read_exact_at(&mut buf, range.start)?;
        Ok(OwnedBytes::new(buf))
    }

    fn read_row(&self, range: Range<u64>) -> io::Result<OwnedBytes> {
        if let Some(hit) = self.cache.lock().get(range.start) {
            log::trace!("Row cache HIT at {}", range.start);
            return Ok(hit);
        }
        log::trace!("Row cache MISS at {}", range.start);
        // Failed reads never reach the cache.
        let bytes = self.read_raw(range.clone())?;
        self.cache.lock().insert(range.start, bytes.clone());
        Ok(bytes)
    }

    fn cache_stats(&self) -> Option<RowCacheStats> {
        Some(self.cache.lock().stats())
    }
}
