use std::fs::OpenOptions;

use super::{open, random_rows, write_rows};
use crate::error::Error;
use crate::matrix::{MatrixReader, ReadMode};

#[test]
fn test_paged_matches_eager() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paged.wmx");
    let rows = random_rows(3, 200, 300, 0.05);
    write_rows(&path, &rows);

    let eager = open(&path);
    let paged = MatrixReader::open(
        &path,
        ReadMode::Paged {
            max_cached_bytes: 4096,
        },
    )
    .unwrap();
    assert_eq!(paged.mode(), ReadMode::Paged { max_cached_bytes: 4096 });
    assert_eq!(paged.row_ids().collect::<Vec<_>>(), eager.row_ids().collect::<Vec<_>>());

    for _ in 0..2 {
        for (id, _) in &rows {
            assert_eq!(paged.get_row(*id).unwrap(), eager.get_row(*id).unwrap());
        }
    }
    let scanned_paged: Vec<_> = paged.rows().map(|r| r.unwrap()).collect();
    let scanned_eager: Vec<_> = eager.rows().map(|r| r.unwrap()).collect();
    assert_eq!(scanned_paged, scanned_eager);

    let stats = paged.cache_stats().unwrap();
    assert!(stats.resident_bytes <= 4096);
    assert!(stats.evictions > 0);
    assert_eq!(stats.hits + stats.misses, 2 * rows.len() as u64);
}

#[test]
fn test_paged_cache_hits_on_repeat() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hits.wmx");
    let rows = random_rows(4, 20, 30, 0.3);
    write_rows(&path, &rows);

    let reader = MatrixReader::open(&path, ReadMode::paged()).unwrap();
    let id = rows[0].0;
    reader.get_row(id).unwrap().unwrap();
    reader.get_row(id).unwrap().unwrap();
    reader.get_row(id).unwrap().unwrap();
    assert!(reader.get_row(i32::MAX).unwrap().is_none());

    let stats = reader.cache_stats().unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.cached_rows, 1);
}

#[test]
fn test_paged_reader_shared_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.wmx");
    let rows = random_rows(5, 400, 100, 0.05);
    write_rows(&path, &rows);

    let eager = open(&path);
    let paged = MatrixReader::open(
        &path,
        ReadMode::Paged {
            max_cached_bytes: 2048,
        },
    )
    .unwrap();
    std::thread::scope(|scope| {
        for t in 0..4 {
            let paged = &paged;
            let eager = &eager;
            let rows = &rows;
            scope.spawn(move || {
                for (id, _) in rows.iter().skip(t).step_by(3) {
                    assert_eq!(paged.get_row(*id).unwrap(), eager.get_row(*id).unwrap());
                }
            });
        }
    });
    assert!(paged.cache_stats().unwrap().resident_bytes <= 2048);
}

#[test]
fn test_io_failure_does_not_poison_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("io.wmx");
    let rows = random_rows(6, 50, 40, 0.2);
    write_rows(&path, &rows);

    let reader = MatrixReader::open(&path, ReadMode::paged()).unwrap();
    let first = reader.row_ids().next().unwrap();
    let cached = reader.get_row(first).unwrap().unwrap();

    // Cut the file inside the first row; uncached rows now fail to read
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(48).unwrap();
    drop(file);

    let last = reader.row_ids().last().unwrap();
    assert!(matches!(reader.get_row(last), Err(Error::Io(_))));
    let stats = reader.cache_stats().unwrap();
    assert_eq!(stats.cached_rows, 1);
    assert_eq!(reader.get_row(first).unwrap().unwrap(), cached);
}
