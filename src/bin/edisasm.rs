use std::{
    error::Error,
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use eventasm::{
    disasm::DEFAULT_SIZE_LIMIT, disassemble, Config, DisassembleRequest, DisassemblyMode, Number,
    Registry, RomFile,
};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Image to read
    rom: PathBuf,

    /// Offset (or address) to start decoding at
    offset: Number,

    /// Definition file, or a directory of them
    #[arg(short, long)]
    raws: PathBuf,

    /// Extension of the definition files when `--raws` is a directory
    #[arg(long, default_value = "txt")]
    ext: String,

    /// `structure` or `to-end`
    #[arg(short, long, default_value_t = DisassemblyMode::Structure)]
    mode: DisassemblyMode,

    /// Bytes decoded per block before giving up on a terminator
    #[arg(short, long, default_value_t = DEFAULT_SIZE_LIMIT)]
    size_limit: usize,

    /// Only use codes from this group for the first block
    #[arg(short, long)]
    group: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

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
    let offset = u32::try_from(args.offset.0).map_err(|_| "offset is out of range")?;
    let mut request = DisassembleRequest::new(offset, args.mode);
    request.size_limit = args.size_limit;
    request.group = args.group;

    let rom = RomFile::open(&args.rom)?;
    let (text, outcome) = disassemble(&rom, &registry, &config, &request);
    drop(rom);
    outcome.log.emit();

    let mut output: Box<dyn Write> = match args.output {
        Some(path) => Box::new(BufWriter::new(
            File::options()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| format!("cant open file: {e}"))?,
        )),
        None => Box::new(io::stdout()),
    };
    output.write_all(text.as_bytes())?;
    output.flush()?;

    if !outcome.success {
        Err("disassembly finished with errors")?;
    }
    Ok(())
}
