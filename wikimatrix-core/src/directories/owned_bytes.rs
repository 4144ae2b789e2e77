//! Cheaply clonable byte ranges backed by heap buffers or memory maps

use memmap2::Mmap;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Backing {
    Heap(Arc<Vec<u8>>),
    Mmap(Arc<Mmap>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Heap(v) => v.as_slice(),
            Backing::Mmap(m) => m.as_ref(),
        }
    }
}

/// Owned bytes with cheap cloning (Arc-backed)
#[derive(Debug, Clone)]
pub struct OwnedBytes {
    data: Backing,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Backing::Heap(Arc::new(data)),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Zero-copy view of a whole memory map
    pub fn from_mmap(mmap: Arc<Mmap>) -> Self {
        let len = mmap.len();
        Self {
            data: Backing::Mmap(mmap),
            range: 0..len,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        debug_assert!(end <= self.range.end);
        Self {
            data: self.data.clone(),
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data.bytes()[self.range.clone()]
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::Deref for OwnedBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slicing_shares_buffer() {
        let bytes = OwnedBytes::new((0u8..32).collect());
        let mid = bytes.slice(8..16);
        assert_eq!(mid.len(), 8);
        assert_eq!(mid.as_slice(), &(8u8..16).collect::<Vec<_>>()[..]);
        let inner = mid.slice(2..4);
        assert_eq!(inner.as_slice(), &[10, 11]);
        assert!(OwnedBytes::empty().is_empty());
    }
}
