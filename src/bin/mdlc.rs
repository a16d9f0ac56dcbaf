use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mdlc::{compile_file, Calibration, DriverOptions};
use tracing::Level;

/// expands a templated model file (.mdl) into one literal equation per line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input filename
    input: PathBuf,

    /// Output filename (defaults to stdout)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// CSV file of calibration values used by `if` conditions
    #[arg(short, long)]
    calibration: Option<PathBuf>,

    /// Record of the calibration file holding the values
    #[arg(long, default_value_t = 2)]
    calibration_row: usize,

    /// Order equations by dependency
    #[arg(short, long)]
    sort: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Args::parse();
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let calibration = match &cli.calibration {
        Some(path) => Calibration::from_csv_path(path, cli.calibration_row)?,
        None => Calibration::new(),
    };
    let options = DriverOptions {
        order_equations: cli.sort,
    };
    let equations = compile_file(&cli.input, &calibration, options)?;

    let mut out: Box<dyn Write> = match &cli.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for equation in &equations {
        writeln!(out, "{}", equation)?;
    }
    out.flush()?;
    Ok(())
}
