//! Out-of-core transposition
//!
//! The destination row space (the source's column ids) is split into
//! buckets. Each bucket costs one full scan of the source: cells whose column
//! falls in the bucket are gathered per destination row, and once the scan
//! completes those rows are complete and get written. Peak memory is one
//! bucket's cells; I/O is one source scan per bucket.
//!
//! Two bucket plans exist. `BucketPlan::Fixed(n)` hashes destination ids into
//! `n` buckets. `BucketPlan::MemoryBudget(bytes)` first counts the cells of
//! every destination row, then cuts the sorted ids into contiguous batches
//! whose estimated accumulator size fits the budget; the counts are checked
//! again after each batch.

use rayon::prelude::*;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::Serialize;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::config::{BucketPlan, TransposeConfig};
use super::format::{IndexEntry, MatrixHeader};
use super::reader::MatrixReader;
use super::writer::{MatrixSink, MatrixWriter};
use crate::error::{Error, Result};
use crate::structures::MatrixRow;

/// Per-destination-row overhead of the accumulator: map slot, key and Vec header
const ROW_OVERHEAD_BYTES: u64 = 40 + 4 + 2 * 8;

/// One accumulated cell: source row id (4) + code (2)
const CELL_BYTES: u64 = 6;

/// Accumulator hash maps run at roughly this fill ratio
const LOAD_FACTOR: f64 = 0.75;

/// Index entries handed to one parallel scan task
const SCAN_CHUNK_ROWS: usize = 256;

type Accumulator = FxHashMap<i32, Vec<(i32, i16)>>;

/// Outcome of a transpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransposeStats {
    /// Rows in the transposed matrix
    pub num_rows: usize,
    pub num_cells: u64,
    /// Full scans of the source, including the counting pass of a budgeted plan
    pub source_scans: usize,
    /// Largest number of cells held in memory at once
    pub peak_bucket_cells: u64,
}

/// Which destination rows a single pass gathers
#[derive(Debug, Clone)]
enum Bucket {
    Hashed { index: u64, count: u64 },
    /// Inclusive range of destination ids with their expected cell counts
    Range { lo: i32, hi: i32, expected: FxHashMap<i32, u64> },
}

impl Bucket {
    #[inline]
    fn contains(&self, col: i32) -> bool {
        match self {
            Bucket::Hashed { index, count } => FxBuildHasher.hash_one(col) % count == *index,
            Bucket::Range { lo, hi, .. } => (*lo..=*hi).contains(&col),
        }
    }
}

pub struct Transposer<'a> {
    source: &'a MatrixReader,
    config: TransposeConfig,
}

impl<'a> Transposer<'a> {
    pub fn new(source: &'a MatrixReader, config: TransposeConfig) -> Self {
        Self { source, config }
    }

    /// Transpose into a new file at `dest`.
    ///
    /// Output is staged next to `dest` (or in `temp_dir`) and renamed into
    /// place once complete, so a failed run never leaves a file at `dest`.
    pub fn run(&self, dest: impl AsRef<Path>) -> Result<TransposeStats> {
        let dest = dest.as_ref();
        if let Some(source_path) = self.source.path()
            && same_file(source_path, dest)
        {
            return Err(Error::InvalidArgument(format!(
                "cannot transpose {} onto itself",
                dest.display()
            )));
        }
        let staging = self.staging_path(dest);
        let mut writer =
            MatrixWriter::create_with_header(&staging, MatrixHeader::sparse(*self.source.codec()))?;
        let result = self.run_into(&mut writer);
        drop(writer);
        match result {
            Ok(stats) => {
                move_into_place(&staging, dest)?;
                Ok(stats)
            }
            Err(e) => {
                remove_staging(&staging);
                Err(e)
            }
        }
    }

    /// Transpose into an open writer and finish it
    pub fn run_into<W: MatrixSink>(&self, writer: &mut MatrixWriter<W>) -> Result<TransposeStats> {
        let start = Instant::now();
        if self.config.num_threads == 0 {
            return Err(Error::InvalidArgument("num_threads must be at least 1".into()));
        }
        let (buckets, counting_scans) = self.plan()?;
        log::info!(
            "transposing {} source rows in {} bucket(s) with {} thread(s)",
            self.source.num_rows(),
            buckets.len(),
            self.config.num_threads
        );

        let pool = if self.config.num_threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.num_threads)
                    .build()
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?,
            )
        } else {
            None
        };

        let mut stats = TransposeStats {
            num_rows: 0,
            num_cells: 0,
            source_scans: counting_scans,
            peak_bucket_cells: 0,
        };
        let codec = *self.source.codec();
        for (i, bucket) in buckets.iter().enumerate() {
            let mut acc = match &pool {
                Some(pool) => pool.install(|| self.scan_parallel(bucket))?,
                None => self.scan_serial(bucket)?,
            };
            stats.source_scans += 1;
            if let Bucket::Range { expected, .. } = bucket {
                verify_counts(expected, &acc)?;
            }

            let mut dest_ids: Vec<i32> = acc.keys().copied().collect();
            dest_ids.sort_unstable();
            let mut bucket_cells = 0u64;
            for dest_id in &dest_ids {
                let Some(mut cells) = acc.remove(dest_id) else {
                    continue;
                };
                cells.sort_unstable_by_key(|&(row, _)| row);
                bucket_cells += cells.len() as u64;
                let (col_ids, codes): (Vec<i32>, Vec<i16>) = cells.into_iter().unzip();
                let row = MatrixRow::sparse_from_codes(*dest_id, codec, col_ids, codes)
                    .map_err(|e| {
                        Error::CorruptFile(format!("source row ids are not unique: {}", e))
                    })?;
                writer.write_row(&row)?;
            }
            stats.num_rows += dest_ids.len();
            stats.num_cells += bucket_cells;
            stats.peak_bucket_cells = stats.peak_bucket_cells.max(bucket_cells);
            log::info!(
                "bucket {}/{}: {} rows, {} cells",
                i + 1,
                buckets.len(),
                dest_ids.len(),
                bucket_cells
            );
        }

        writer.finish()?;
        log::info!(
            "transpose done: {} rows, {} cells, {} source scans in {:.2?}",
            stats.num_rows,
            stats.num_cells,
            stats.source_scans,
            start.elapsed()
        );
        Ok(stats)
    }

    /// Build the bucket list; returns it with the number of scans spent planning
    fn plan(&self) -> Result<(Vec<Bucket>, usize)> {
        match self.config.buckets {
            BucketPlan::Fixed(0) => Err(Error::InvalidArgument(
                "bucket count must be at least 1".into(),
            )),
            BucketPlan::Fixed(n) => {
                let count = n as u64;
                Ok(((0..count).map(|index| Bucket::Hashed { index, count }).collect(), 0))
            }
            BucketPlan::MemoryBudget(0) => Err(Error::InvalidArgument(
                "memory budget must be positive".into(),
            )),
            BucketPlan::MemoryBudget(max_bytes) => {
                let mut counts: FxHashMap<i32, u64> = FxHashMap::default();
                self.source
                    .for_each_cell(|_, col, _| *counts.entry(col).or_insert(0) += 1)?;
                let buckets = batch_by_budget(counts, max_bytes as u64);
                log::debug!(
                    "counting pass split destination rows into {} batch(es) of at most {} bytes",
                    buckets.len(),
                    max_bytes
                );
                Ok((buckets, 1))
            }
        }
    }

    fn scan_serial(&self, bucket: &Bucket) -> Result<Accumulator> {
        let mut acc = Accumulator::default();
        for entry in self.source.entries() {
            self.scan_into(entry, bucket, &mut acc)?;
        }
        Ok(acc)
    }

    /// Scan chunks of the source on the current rayon pool, one accumulator
    /// per task, merged before the write phase
    fn scan_parallel(&self, bucket: &Bucket) -> Result<Accumulator> {
        self.source
            .entries()
            .par_chunks(SCAN_CHUNK_ROWS)
            .map(|chunk| {
                let mut acc = Accumulator::default();
                for entry in chunk {
                    self.scan_into(entry, bucket, &mut acc)?;
                }
                Ok(acc)
            })
            .try_reduce(Accumulator::default, |left, right| {
                Ok(if left.len() >= right.len() {
                    merge_into(left, right)
                } else {
                    merge_into(right, left)
                })
            })
    }

    fn scan_into(&self, entry: &IndexEntry, bucket: &Bucket, acc: &mut Accumulator) -> Result<()> {
        self.source.scan_entry(entry, &mut |row, col, code| {
            if bucket.contains(col) {
                acc.entry(col).or_default().push((row, code));
            }
        })
    }

    fn staging_path(&self, dest: &Path) -> PathBuf {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "matrix".to_string());
        let staged = format!(".{}.{}.partial", name, std::process::id());
        match &self.config.temp_dir {
            Some(dir) => dir.join(staged),
            None => dest.with_file_name(staged),
        }
    }
}

fn merge_into(mut into: Accumulator, from: Accumulator) -> Accumulator {
    for (col, mut cells) in from {
        into.entry(col).or_default().append(&mut cells);
    }
    into
}

/// Estimated accumulator bytes for one destination row with `cells` cells
fn estimated_row_bytes(cells: u64) -> u64 {
    ROW_OVERHEAD_BYTES + ((cells * CELL_BYTES) as f64 / LOAD_FACTOR) as u64
}

/// Cut sorted destination ids into contiguous batches within `max_bytes`.
///
/// A single row larger than the budget gets a batch of its own.
fn batch_by_budget(counts: FxHashMap<i32, u64>, max_bytes: u64) -> Vec<Bucket> {
    let mut ids: Vec<(i32, u64)> = counts.into_iter().collect();
    ids.sort_unstable_by_key(|&(id, _)| id);

    let mut buckets = Vec::new();
    let mut current: FxHashMap<i32, u64> = FxHashMap::default();
    let mut lo = 0i32;
    let mut hi = 0i32;
    let mut used = 0u64;
    for (id, cells) in ids {
        let bytes = estimated_row_bytes(cells);
        if !current.is_empty() && used + bytes > max_bytes {
            buckets.push(Bucket::Range {
                lo,
                hi,
                expected: std::mem::take(&mut current),
            });
            used = 0;
        }
        if current.is_empty() {
            lo = id;
        }
        hi = id;
        used += bytes;
        current.insert(id, cells);
    }
    if !current.is_empty() {
        buckets.push(Bucket::Range {
            lo,
            hi,
            expected: current,
        });
    }
    buckets
}

/// The source must not change between the counting pass and the batch scans
fn verify_counts(expected: &FxHashMap<i32, u64>, acc: &Accumulator) -> Result<()> {
    if expected.len() != acc.len() {
        return Err(Error::CorruptFile(format!(
            "expected {} destination rows in batch, accumulated {}",
            expected.len(),
            acc.len()
        )));
    }
    for (id, &count) in expected {
        let got = acc.get(id).map_or(0, |cells| cells.len() as u64);
        if got != count {
            return Err(Error::CorruptFile(format!(
                "destination row {} counted {} cells but accumulated {}",
                id, count, got
            )));
        }
    }
    Ok(())
}

/// Rename the staged output onto `dest`, copying when a rename is not possible.
/// The staged file is gone afterwards whether or not the move succeeded.
fn move_into_place(staging: &Path, dest: &Path) -> Result<()> {
    let Err(e) = std::fs::rename(staging, dest) else {
        return Ok(());
    };
    log::debug!("rename of {} failed ({}), copying", staging.display(), e);
    let copied = std::fs::copy(staging, dest);
    remove_staging(staging);
    copied?;
    Ok(())
}

fn remove_staging(staging: &Path) {
    if let Err(e) = std::fs::remove_file(staging)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("failed to remove staged output {}: {}", staging.display(), e);
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Transpose `source` into a new sparse matrix at `dest` using `bucket_count`
/// full scans of the source
pub fn transpose(
    source: &MatrixReader,
    dest: impl AsRef<Path>,
    bucket_count: usize,
) -> Result<TransposeStats> {
    Transposer::new(source, TransposeConfig::with_buckets(bucket_count)).run(dest)
}
