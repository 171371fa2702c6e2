use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};
use os::{LoaderInfo, MacOs, OutputMode, SessionConfig};
use types::ArchFamily;
use vm::{EngineRef, SimEngine};

/// Runs shellcode or a Mach-O entry point on the reference engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Guest architecture (x8664, arm64)
    #[arg(short, long, default_value = "x8664")]
    arch: String,

    /// Shellcode as a hex string
    #[arg(short, long, conflicts_with = "macho")]
    shellcode: Option<String>,

    /// Mach-O executable to take the entry point from
    #[arg(short, long)]
    macho: Option<PathBuf>,

    /// Guest root filesystem
    #[arg(short, long, default_value = "/")]
    rootfs: PathBuf,

    /// Output mode (off, default, debug, dump)
    #[arg(short, long, default_value = "default")]
    output: String,

    /// Stop after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Stop address, hex
    #[arg(long)]
    stop: Option<String>,
}

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(output: OutputMode) -> Result<()> {
    let level = match output {
        OutputMode::Off => LevelFilter::Off,
        OutputMode::Default => LevelFilter::Info,
        OutputMode::Debug => LevelFilter::Debug,
        OutputMode::Dump => LevelFilter::Trace,
    };
    log::set_boxed_logger(Box::new(StderrLogger { level }))
        .map_err(|e| anyhow::anyhow!("logger already installed: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

fn parse_hex_u64(value: &str) -> Result<u64> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex address: {}", value))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let output = OutputMode::from_name(&args.output)
        .with_context(|| format!("unknown output mode: {}", args.output))?;
    init_logging(output)?;

    let arch = ArchFamily::from_name(&args.arch)
        .with_context(|| format!("unknown architecture: {}", args.arch))?;

    let (mut config, loader) = match (&args.shellcode, &args.macho) {
        (Some(code), _) => {
            let bytes = hex::decode(code.trim_start_matches("0x")).context("shellcode is not valid hex")?;
            (SessionConfig::shellcode(bytes), LoaderInfo::default())
        }
        (None, Some(path)) => {
            let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
            let loader = LoaderInfo::from_macho(&bytes)?;
            println!("entry 0x{:x}, image end 0x{:x}", loader.entry_point, loader.vm_end_addr);
            (SessionConfig::binary(&args.rootfs, path), loader)
        }
        (None, None) => anyhow::bail!("pass either --shellcode or --macho"),
    };

    config = config.with_output(output);
    config.rootfs = args.rootfs.clone();
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(stop) = &args.stop {
        config = config.with_stop_address(parse_hex_u64(stop)?);
    }

    let engine: EngineRef = Rc::new(RefCell::new(SimEngine::new(arch)));
    let mut macos = MacOs::new(engine, loader, config);
    macos.load()?;
    let result = macos.run();

    if let Some(report) = macos.last_fault() {
        println!("fault at 0x{:x}: {}", report.pc, report.error);
    }
    result?;

    match macos.exit_code() {
        Some(code) => println!("guest exited with {}", code),
        None => println!("guest stopped at 0x{:x}", macos.engine().borrow().pc()),
    }
    Ok(())
}
