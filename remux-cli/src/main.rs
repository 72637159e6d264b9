use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod processor;
mod utils;

use cli::CliArgs;
use error::AppError;
use processor::RemuxJob;
use utils::format_bytes;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&args.log_file)?;

    let multi_writer = MakeWriterExt::and(std::io::stderr, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("tsremux {} - MPEG capture remuxer", env!("CARGO_PKG_VERSION"));

    let job = RemuxJob::from_args(args)?;
    info!(
        input = %job.input,
        output = %job.output.display(),
        format = %job.args.format,
        chunk = job.chunk_size,
        "Starting remux"
    );

    let summary = processor::process(&job)?;

    println!("Read:     {}", format_bytes(summary.bytes_read));
    println!("Written:  {}", format_bytes(summary.bytes_written));
    if summary.dropped > 0 {
        println!("Dropped:  {}", format_bytes(summary.dropped));
    }
    for file in &summary.files {
        println!("Output:   {}", file.display());
    }
    Ok(())
}
