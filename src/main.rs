use std::{fs::File, io::BufReader, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tinirdb::{EmitStrategies, EmitStrategy, Options, RdbParseError, RdbParser};

#[derive(Parser)]
#[command(name = "tinirdb", version, about = "Inspect Redis-compatible RDB snapshot files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every record in a snapshot file, one per line
    Dump {
        /// Path to the snapshot file
        path: PathBuf,
        /// Emit a record for ResizeDB opcodes instead of absorbing them
        #[arg(long)]
        resize_db: bool,
        /// Verify the trailing CRC64 checksum
        #[arg(long)]
        verify_checksum: bool,
        /// Print only the collected slice of each collection
        #[arg(long)]
        slice_only: bool,
    },
}

fn main() -> ExitCode {
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Dump {
            path,
            resize_db,
            verify_checksum,
            slice_only,
        } => {
            let mut options = Options {
                emit_resize_db: resize_db,
                verify_checksum,
                ..Default::default()
            };
            if slice_only {
                options.strategies = EmitStrategies::uniform(EmitStrategy::SliceOnly);
            }
            dump(&path, options)
        }
    }
}

fn dump(path: &PathBuf, options: Options) -> ExitCode {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("cannot open {}: {err}", path.display());
            return ExitCode::from(2);
        }
    };

    let mut parser = RdbParser::with_options(BufReader::new(file), options);
    loop {
        match parser.next_record() {
            Ok(Some(record)) => println!("{record}"),
            Ok(None) => return ExitCode::SUCCESS,
            // a short read means a malformed file, not an I/O failure
            Err(RdbParseError::Io(err)) if err.kind() != std::io::ErrorKind::UnexpectedEof => {
                eprintln!("read error: {err}");
                return ExitCode::from(2);
            }
            Err(err) => {
                eprintln!("parse error: {err}");
                return ExitCode::from(1);
            }
        }
    }
}

fn setup_logging() {
    #[cfg(debug_assertions)]
    tracing_subscriber::fmt()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    #[cfg(not(debug_assertions))]
    tracing_subscriber::fmt()
        .event_format(tracing_subscriber::fmt::format::json().flatten_event(true))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
