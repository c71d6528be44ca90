use anyhow::Result;
use clap::{Parser, Subcommand};
use llcpload::{
    config::PipelineConfig,
    decode::{self, ConvertOptions, OutputFormat},
    warehouse,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "llcpload")]
#[command(about = "Convert the LLCP fixed-width survey extract and load it into the health warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode the fixed-width .ASC extract into a table
    Convert {
        /// Fixed-width extract (.ASC or .zip)
        #[arg(long)]
        asc: PathBuf,

        /// Codebook HTML, as a path or http(s) URL
        #[arg(long)]
        codebook: String,

        /// Output table path
        #[arg(long)]
        out: PathBuf,

        /// Rows per write batch
        #[arg(long, default_value_t = 50_000)]
        chunksize: usize,

        /// Stop after this many rows
        #[arg(long)]
        max_rows: Option<usize>,

        /// Also write the extracted layout as JSON
        #[arg(long)]
        layout_json: Option<PathBuf>,

        /// Output format (default: from the output extension, else csv)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Load a cleaned survey CSV into the star schema
    Load {
        /// Cleaned survey CSV
        #[arg(long)]
        csv: PathBuf,

        /// Pipeline config (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// SQLite warehouse (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Year stamped on every fact (overrides config)
        #[arg(long)]
        record_year: Option<i32>,
    },
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) dispatch ─────────────────────────────────────────────────
    match Cli::parse().command {
        Command::Convert {
            asc,
            codebook,
            out,
            chunksize,
            max_rows,
            layout_json,
            format,
        } => {
            let opts = ConvertOptions {
                chunksize,
                max_rows,
                format,
                layout_json,
            };
            let summary = decode::convert(&asc, &codebook, &out, &opts)?;
            info!(
                fields = summary.fields,
                rows = summary.rows,
                batches = summary.batches,
                "conversion finished"
            );
        }
        Command::Load {
            csv,
            config,
            database,
            record_year,
        } => {
            let mut cfg = match config {
                Some(path) => PipelineConfig::load(path)?,
                None => PipelineConfig::default(),
            };
            if let Some(db) = database {
                cfg.database = db;
            }
            if let Some(year) = record_year {
                cfg.record_year = year;
            }
            let report = warehouse::load(&csv, &cfg)?;
            info!(
                written = report.facts_written,
                skipped = report.facts_skipped,
                "load finished"
            );
        }
    }
    Ok(())
}
