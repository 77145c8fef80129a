use std::{error::Error, io, path::PathBuf, process::ExitCode};

use clap::Parser;
use eventasm::{assemble_file, Config, EngineKind, Number, Options, Registry, RomFile};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Event script
    source: PathBuf,

    /// Image to patch
    rom: PathBuf,

    /// Definition file, or a directory of them
    #[arg(short, long)]
    raws: PathBuf,

    /// Extension of the definition files when `--raws` is a directory
    #[arg(long, default_value = "txt")]
    ext: String,

    /// Output image (default: patch the input in place)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pre-defined symbols (repeatable)
    #[arg(short = 'D', long, value_name="KEY1=val", value_parser = eventasm::parse_defines::<String, i64>)]
    define: Vec<(String, i64)>,

    /// Search directories for included files
    #[arg(short = 'I', long)]
    include: Vec<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `classic` or `colorz` (default: from the config)
    #[arg(short, long)]
    engine: Option<EngineKind>,

    /// Offset written to before the first `ORG`
    #[arg(long, default_value = "0")]
    origin: Number,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let registry = if args.raws.is_dir() {
        Registry::load_dir(&args.raws, &args.ext)?
    } else {
        Registry::load_file(&args.raws)?
    };
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let origin = u32::try_from(args.origin.0).map_err(|_| "origin is out of range")?;
    let options = Options {
        include_dirs: args.include,
        defines: args.define,
        origin,
        engine: args.engine,
    };

    let mut rom = RomFile::open(&args.rom)?;
    tracing::trace!("assembling {}", args.source.display());
    let outcome = assemble_file(&args.source, &registry, &mut rom, &config, &options);
    outcome.log.emit();
    if !outcome.success {
        Err(format!("{}: assembly failed, image not written", args.source.display()))?;
    }

    match &args.output {
        Some(path) => rom.save_as(path)?,
        None => rom.save()?,
    }
    Ok(())
}
