//! Matrix operations: info, row, transpose, symmetrize, import, export

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use wikimatrix_core::{
    BucketPlan, InMemoryMatrix, MatrixReader, ReadMode, RowLayout, TransposeConfig, Transposer,
    ValueCodec, open_matrix,
};

#[derive(Debug, Serialize)]
pub struct MatrixInfo {
    pub path: PathBuf,
    pub file_bytes: u64,
    pub rows: usize,
    pub cells: u64,
    pub layout: RowLayout,
    pub dense_num_cols: Option<usize>,
    pub codec: ValueCodec,
    pub min_value: f32,
    pub max_value: f32,
}

pub fn matrix_info(path: &Path) -> Result<MatrixInfo> {
    let reader =
        open_matrix(path).with_context(|| format!("Failed to open matrix: {:?}", path))?;
    Ok(MatrixInfo {
        path: path.to_path_buf(),
        file_bytes: fs::metadata(path)?.len(),
        rows: reader.num_rows(),
        cells: reader.num_cells()?,
        layout: reader.layout(),
        dense_num_cols: reader.dense_width(),
        codec: *reader.codec(),
        min_value: reader.codec().min_value(),
        max_value: reader.codec().max_value(),
    })
}

pub fn show_info(path: &Path, json: bool) -> Result<()> {
    let info = matrix_info(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("Matrix: {:?}", info.path);
    println!("Size: {} bytes", info.file_bytes);
    println!("Rows: {}", info.rows);
    println!("Cells: {}", info.cells);
    match info.dense_num_cols {
        Some(width) => println!("Layout: dense ({} columns)", width),
        None => println!("Layout: sparse"),
    }
    println!(
        "Codec: c1={:e} c2={:e} (range {} .. {})",
        info.codec.c1(),
        info.codec.c2(),
        info.min_value,
        info.max_value
    );
    Ok(())
}

pub fn show_row(path: &Path, row_id: i32, paged: Option<usize>) -> Result<()> {
    let mode = match paged {
        Some(max_cached_bytes) => ReadMode::Paged { max_cached_bytes },
        None => ReadMode::Eager,
    };
    let reader = MatrixReader::open(path, mode)
        .with_context(|| format!("Failed to open matrix: {:?}", path))?;
    let Some(row) = reader.get_row(row_id)? else {
        anyhow::bail!("Row {} not found in {:?}", row_id, path);
    };
    println!("Row {} ({} columns, norm {:.4})", row_id, row.num_cols(), row.norm());
    for (col, value) in row.iter() {
        println!("{}\t{}", col, value);
    }
    Ok(())
}

pub struct TransposeArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub buckets: Option<usize>,
    pub budget_mb: Option<usize>,
    pub threads: Option<usize>,
    pub temp_dir: Option<PathBuf>,
}

impl TransposeArgs {
    fn config(&self) -> TransposeConfig {
        let mut config = TransposeConfig::default();
        if let Some(n) = self.buckets {
            config.buckets = BucketPlan::Fixed(n);
        } else if let Some(mb) = self.budget_mb {
            config.buckets = BucketPlan::MemoryBudget(mb.saturating_mul(1024 * 1024));
        }
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }
        config.temp_dir = self.temp_dir.clone();
        config
    }
}

pub fn transpose_matrix(args: TransposeArgs) -> Result<()> {
    let start = Instant::now();
    let reader = open_matrix(&args.input)
        .with_context(|| format!("Failed to open matrix: {:?}", args.input))?;
    let config = args.config();
    info!(
        "Transposing {:?} ({} rows) with {:?}, {} thread(s)",
        args.input,
        reader.num_rows(),
        config.buckets,
        config.num_threads
    );
    let stats = Transposer::new(&reader, config)
        .run(&args.output)
        .with_context(|| format!("Failed to transpose into {:?}", args.output))?;
    info!(
        "Wrote {:?}: {} rows, {} cells, {} source scans, peak {} cells in {:.2?}",
        args.output,
        stats.num_rows,
        stats.num_cells,
        stats.source_scans,
        stats.peak_bucket_cells,
        start.elapsed()
    );
    Ok(())
}

pub fn symmetrize_matrix(input: &Path, output: &Path, fill: Option<f64>) -> Result<()> {
    let reader =
        open_matrix(input).with_context(|| format!("Failed to open matrix: {:?}", input))?;
    let mut matrix = InMemoryMatrix::from_reader(&reader)?;
    info!(
        "Loaded {} rows, {} cells from {:?}",
        matrix.num_rows(),
        matrix.num_cells(),
        input
    );
    match fill {
        Some(fill) => matrix.symmetrize_with_fill(fill),
        None => matrix.symmetrize(),
    }
    let summary = matrix
        .write_to(output)
        .with_context(|| format!("Failed to write matrix: {:?}", output))?;
    info!(
        "Wrote symmetric matrix {:?}: {} rows, {} cells",
        output, summary.num_rows, summary.num_cells
    );
    Ok(())
}

/// Parse `row<TAB>col<TAB>value` lines; blank lines and `#` comments are skipped
pub fn parse_triples<R: BufRead>(reader: R) -> Result<InMemoryMatrix> {
    let mut matrix = InMemoryMatrix::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(row), Some(col), Some(value), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            anyhow::bail!("Line {}: expected `row col value`, got {:?}", lineno + 1, line);
        };
        let row: i32 = row
            .parse()
            .with_context(|| format!("Line {}: bad row id {:?}", lineno + 1, row))?;
        let col: i32 = col
            .parse()
            .with_context(|| format!("Line {}: bad column id {:?}", lineno + 1, col))?;
        let value: f64 = value
            .parse()
            .with_context(|| format!("Line {}: bad value {:?}", lineno + 1, value))?;
        matrix.set(row, col, value);
    }
    Ok(matrix)
}

pub fn import_triples(input: Option<&Path>, output: &Path, id_map: Option<&Path>) -> Result<()> {
    let mut matrix = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open triples: {:?}", path))?;
            parse_triples(BufReader::new(file))?
        }
        None => parse_triples(io::stdin().lock())?,
    };
    info!(
        "Parsed {} rows, {} cells",
        matrix.num_rows(),
        matrix.num_cells()
    );

    if let Some(id_map) = id_map {
        let raw_ids = matrix.compress_ids();
        let mut out = BufWriter::new(
            File::create(id_map).with_context(|| format!("Failed to create {:?}", id_map))?,
        );
        for (compressed, raw) in raw_ids.iter().enumerate() {
            writeln!(out, "{}\t{}", compressed, raw)?;
        }
        out.flush()?;
        info!("Compressed {} ids, mapping written to {:?}", raw_ids.len(), id_map);
    }

    let summary = matrix
        .write_to(output)
        .with_context(|| format!("Failed to write matrix: {:?}", output))?;
    info!(
        "Wrote {:?}: {} rows, {} bytes",
        output, summary.num_rows, summary.total_bytes
    );
    Ok(())
}

pub fn write_triples<W: Write>(reader: &MatrixReader, out: &mut W) -> Result<()> {
    for row in reader.rows() {
        let row = row?;
        for (col, value) in row.iter() {
            writeln!(out, "{}\t{}\t{}", row.row_id(), col, value)?;
        }
    }
    Ok(())
}

pub fn export_triples(path: &Path) -> Result<()> {
    let reader = open_matrix(path).with_context(|| format!("Failed to open matrix: {:?}", path))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_triples(&reader, &mut out)?;
    out.flush()?;
    Ok(())
}
