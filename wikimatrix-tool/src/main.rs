//! wikimatrix - CLI for quantized matrix files
//!
//! # Commands
//!
//! - `info` - Show row count, layout, codec and size of a matrix
//! - `row` - Print one row
//! - `transpose` - Write the transpose of a matrix to a new file
//! - `symmetrize` - Average `M[i][j]` and `M[j][i]` in memory and write the result
//! - `import` - Build a matrix from tab-separated `row col value` triples
//! - `export` - Dump a matrix as tab-separated triples
//!
//! # Examples
//!
//! ```bash
//! wikimatrix transpose -i cocitation.wmx -o cocitation.t.wmx --budget-mb 512 -j 8
//! wikimatrix row -m cocitation.t.wmx -r 1234 --paged 16777216
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod matrix_ops;

use matrix_ops::TransposeArgs;

#[derive(Parser)]
#[command(name = "wikimatrix")]
#[command(version, about = "Inspect, transpose and convert wikimatrix files")]
#[command(after_help = "Use 'wikimatrix <command> --help' for more information.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show matrix info
    Info {
        /// Path to the matrix file
        #[arg(short, long)]
        matrix: PathBuf,

        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print a single row
    Row {
        /// Path to the matrix file
        #[arg(short, long)]
        matrix: PathBuf,

        /// Row id
        #[arg(short, long, allow_negative_numbers = true)]
        row: i32,

        /// Open in paged mode with this many bytes of row cache
        #[arg(long)]
        paged: Option<usize>,
    },

    /// Transpose a matrix into a new file
    Transpose {
        /// Source matrix
        #[arg(short, long)]
        input: PathBuf,

        /// Destination matrix
        #[arg(short, long)]
        output: PathBuf,

        /// Fixed number of source scans (conflicts with --budget-mb)
        #[arg(short, long, conflicts_with = "budget_mb")]
        buckets: Option<usize>,

        /// Memory budget per scan in MiB (default: 256)
        #[arg(long)]
        budget_mb: Option<usize>,

        /// Threads per scan (default: number of CPUs)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Directory for the staged output (default: next to the output)
        #[arg(short = 't', long)]
        temp_dir: Option<PathBuf>,
    },

    /// Symmetrize a matrix in memory
    Symmetrize {
        /// Source matrix
        #[arg(short, long)]
        input: PathBuf,

        /// Destination matrix
        #[arg(short, long)]
        output: PathBuf,

        /// Value assumed for a missing mirror cell (default: copy the present side)
        #[arg(long, allow_negative_numbers = true)]
        fill: Option<f64>,
    },

    /// Build a sparse matrix from `row<TAB>col<TAB>value` lines
    Import {
        /// Triples file (omit to read stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Destination matrix
        #[arg(short, long)]
        output: PathBuf,

        /// Re-map ids onto 0..n and write the original ids to this file
        #[arg(long)]
        compress_ids: Option<PathBuf>,
    },

    /// Write every cell as `row<TAB>col<TAB>value` to stdout
    Export {
        /// Path to the matrix file
        #[arg(short, long)]
        matrix: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wikimatrix=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { matrix, json } => {
            matrix_ops::show_info(&matrix, json)?;
        }
        Commands::Row { matrix, row, paged } => {
            matrix_ops::show_row(&matrix, row, paged)?;
        }
        Commands::Transpose {
            input,
            output,
            buckets,
            budget_mb,
            threads,
            temp_dir,
        } => {
            matrix_ops::transpose_matrix(TransposeArgs {
                input,
                output,
                buckets,
                budget_mb,
                threads,
                temp_dir,
            })?;
        }
        Commands::Symmetrize {
            input,
            output,
            fill,
        } => {
            matrix_ops::symmetrize_matrix(&input, &output, fill)?;
        }
        Commands::Import {
            input,
            output,
            compress_ids,
        } => {
            matrix_ops::import_triples(input.as_deref(), &output, compress_ids.as_deref())?;
        }
        Commands::Export { matrix } => {
            matrix_ops::export_triples(&matrix)?;
        }
    }

    Ok(())
}
