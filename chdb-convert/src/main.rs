use std::path::PathBuf;

use chdb_convert::{Error, Layout, convert_file, prefix_bar};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chdb-convert")]
#[command(about = "Convert a sorted NTLM hash list into a compact hash database")]
struct Args {
    /// Sorted text file, one hash per line (HIBP NTLM "ordered by hash" format)
    source: PathBuf,

    /// Database file to write (overwritten if it exists)
    destination: PathBuf,

    /// Write the 2^24-slot header read by older chdb readers
    #[arg(long)]
    legacy: bool,

    /// Disable progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let layout = if args.legacy { Layout::Legacy } else { Layout::Standard };

    println!("Converting {:?} to {:?}", args.source, args.destination);

    let count = if args.no_progress {
        convert_file(&args.source, &args.destination, layout, ())?
    } else {
        convert_file(&args.source, &args.destination, layout, prefix_bar())?
    };

    println!(
        "Converted {} records from {:?} to {:?}",
        count, args.source, args.destination
    );
    Ok(())
}
