//! Byte-bounded LRU cache of encoded rows
//!
//! Entries are keyed by their byte offset in the matrix file. Every hit
//! stamps the entry with a fresh access tick; `lru` maps ticks back to
//! offsets so the oldest entry is always the first key of the map.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use super::OwnedBytes;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cached_rows: usize,
    pub resident_bytes: usize,
    pub max_bytes: usize,
}

struct CachedRow {
    data: OwnedBytes,
    tick: u64,
}

pub struct RowCache {
    rows: FxHashMap<u64, CachedRow>,
    lru: BTreeMap<u64, u64>,
    max_bytes: usize,
    resident_bytes: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl RowCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            rows: FxHashMap::default(),
            lru: BTreeMap::new(),
            max_bytes,
            resident_bytes: 0,
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a row and mark it most recently used
    pub fn get(&mut self, offset: u64) -> Option<OwnedBytes> {
        let tick = self.next_tick();
        match self.rows.get_mut(&offset) {
            Some(row) => {
                self.lru.remove(&row.tick);
                row.tick = tick;
                self.lru.insert(tick, offset);
                self.hits += 1;
                Some(row.data.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a row, evicting least recently used rows until it fits.
    ///
    /// Rows larger than the whole budget are not cached.
    pub fn insert(&mut self, offset: u64, data: OwnedBytes) {
        let len = data.len();
        if len > self.max_bytes || self.rows.contains_key(&offset) {
            return;
        }
        while self.resident_bytes + len > self.max_bytes {
            if !self.evict_oldest() {
                break;
            }
        }
        let tick = self.next_tick();
        self.lru.insert(tick, offset);
        self.rows.insert(offset, CachedRow { data, tick });
        self.resident_bytes += len;
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, offset)) = self.lru.pop_first() else {
            return false;
        };
        if let Some(row) = self.rows.remove(&offset) {
            self.resident_bytes -= row.data.len();
            self.evictions += 1;
        }
        true
    }

    pub fn stats(&self) -> RowCacheStats {
        RowCacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            cached_rows: self.rows.len(),
            resident_bytes: self.resident_bytes,
            max_bytes: self.max_bytes,
        }
    }
}
