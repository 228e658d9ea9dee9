use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use mrdconv::error::{ConvertError, Result};
use mrdconv::{ContainerWriter, ConversionConfig, ConvertOptions, Converter, LegacyWalk, Snapshot};

/// Convert a scanner raw-data container into the raw-data interchange format.
#[derive(clap::Parser, Debug)]
#[command(name = "mrdconv", version, about)]
struct Args {
    /// raw-data container snapshot (.json or .json.gz)
    #[arg(value_name = "INPUT", required_unless_present = "input")]
    positional: Option<PathBuf>,
    /// raw-data container snapshot, instead of the positional argument
    #[arg(short, long, conflicts_with = "positional")]
    input: Option<PathBuf>,
    /// destination container; a ".gz" suffix compresses it
    #[arg(short, long, default_value = "output.mrd")]
    output: PathBuf,
    /// stylesheet applied to the header
    #[arg(long)]
    stylesheet: Option<PathBuf>,
    /// sequence mapping configuration document
    #[arg(long)]
    config: Option<PathBuf>,
    /// print the header and exit
    #[arg(short, long)]
    string: bool,
    /// replace identifying header fields by this token
    #[arg(long, value_name = "TOKEN")]
    anonymize: Option<String>,
    /// walk legacy containers by raw view position
    #[arg(long)]
    by_view: bool,
    /// also store one k-space volume per echo and phase
    #[arg(long)]
    kspace_volumes: bool,
    /// debug logging
    #[arg(long)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    let input = args
        .input
        .or(args.positional)
        .ok_or_else(|| ConvertError::SourceOpen("no input given".to_string()))?;
    debug!("reading {}", input.display());
    let source = Snapshot::from_file(&input)?;

    let config = match &args.config {
        Some(path) => Some(ConversionConfig::from_file(path)?),
        None => None,
    };
    let options = ConvertOptions {
        anonymize: args.anonymize,
        stylesheet: args.stylesheet,
        config,
        walk: if args.by_view {
            LegacyWalk::Views
        } else {
            LegacyWalk::Blocks
        },
        kspace_volumes: args.kspace_volumes,
    };
    let converter = Converter::new(&source, options);

    if args.string {
        println!("{}", converter.header_xml()?.into_value());
        return Ok(());
    }

    let mut sink = ContainerWriter::create(&args.output)?;
    let summary = converter.write_to(&mut sink)?;
    let path = sink.finish()?;
    info!(
        "{} -> {}: {} acquisitions",
        input.display(),
        path.display(),
        summary.acquisitions
    );
    Ok(())
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        eprintln!("mrdconv: {}", e);
        process::exit(1);
    }
}
