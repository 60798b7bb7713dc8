use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use nanotube_length_lib::aggregate::concat_length_tables;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Merge per-image nanotube length tables into one table")]
struct Args {
    /// Directory holding the *_lengths.csv tables
    #[clap(short, long, default_value = ".")]
    dir: PathBuf,

    /// Only merge tables whose names start with this prefix
    #[clap(short, long)]
    prefix: Option<String>,

    /// Directory for the combined table (defaults to --dir)
    #[clap(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let summary = concat_length_tables(&args.dir, args.prefix.as_deref(), args.output.as_deref())
        .with_context(|| format!("Failed to merge length tables in {}", args.dir.display()))?;

    println!(
        "{} rows from {} tables written to {}",
        summary.rows,
        summary.tables,
        summary.output.display()
    );

    Ok(())
}
