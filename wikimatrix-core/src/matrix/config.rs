//! Reader and transposer configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default row-cache budget for paged readers
pub const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Default working-set budget for a transpose pass
pub const DEFAULT_TRANSPOSE_BUDGET: usize = 256 * 1024 * 1024;

/// How a reader gets at row bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Map the whole file; row reads are zero-copy slices
    #[default]
    Eager,
    /// Read rows on demand through an LRU cache of at most `max_cached_bytes`
    Paged { max_cached_bytes: usize },
}

impl ReadMode {
    pub fn paged() -> Self {
        ReadMode::Paged {
            max_cached_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

/// How destination rows are split across source scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPlan {
    /// Exactly `n` scans of the source, destination rows assigned by hash
    Fixed(usize),
    /// Count cells per column first, then batch columns so each batch fits
    /// in roughly this many bytes
    MemoryBudget(usize),
}

impl Default for BucketPlan {
    fn default() -> Self {
        BucketPlan::MemoryBudget(DEFAULT_TRANSPOSE_BUDGET)
    }
}

/// Configuration for `Transposer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeConfig {
    pub buckets: BucketPlan,
    /// Threads used to scan the source within one bucket; 1 scans serially
    pub num_threads: usize,
    /// Where the output is staged before being renamed into place; defaults
    /// to the destination's directory
    pub temp_dir: Option<PathBuf>,
}

impl Default for TransposeConfig {
    fn default() -> Self {
        Self {
            buckets: BucketPlan::default(),
            num_threads: num_cpus::get().max(1),
            temp_dir: None,
        }
    }
}

impl TransposeConfig {
    /// Serial transpose with a fixed bucket count
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self {
            buckets: BucketPlan::Fixed(bucket_count),
            num_threads: 1,
            temp_dir: None,
        }
    }

    pub fn with_budget(max_bytes: usize) -> Self {
        Self {
            buckets: BucketPlan::MemoryBudget(max_bytes),
            ..Self::default()
        }
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }
}
