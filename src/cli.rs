// Command-line front end for pkgdelta.
//
// `create` builds a delta from two package archives, `inspect` prints an
// archive's metadata and manifest, `config` prints build details.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::archive::compression::PayloadCompression;
use crate::archive::{PackageArchive, PackageFile};
use crate::config::{OverwritePolicy, ProducerOptions};
use crate::producer::DeltaProducer;

const DEFAULT_LEVEL: u32 = 6;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Delta package producer.
#[derive(Parser, Debug)]
#[command(
    name = "pkgdelta",
    version,
    about = "Build delta packages between two releases of a package",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output results as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Produce a delta package from an old and a new release.
    Create(CreateArgs),
    /// Print an archive's metadata and manifest.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    /// Reuse the new package's compression.
    Inherit,
    None,
    Lzma,
    Zlib,
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Package the delta upgrades from.
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,

    /// Package the delta upgrades to.
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,

    /// Directory to write the delta into (default: system temp dir).
    #[arg(long, short = 'o', value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,

    /// Fail instead of replacing an existing delta.
    #[arg(long = "no-overwrite")]
    no_overwrite: bool,

    /// Payload compression for the delta.
    #[arg(long, value_enum, default_value_t = CompressionArg::Inherit)]
    compression: CompressionArg,

    /// Zlib compression level (0-9).
    #[arg(
        long,
        short = 'l',
        value_parser = clap::value_parser!(u32).range(0..=9),
        default_value_t = DEFAULT_LEVEL
    )]
    level: u32,

    /// Tag used in log messages.
    #[arg(long, default_value = "pkgdelta")]
    label: String,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Archive to inspect.
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Output {
    quiet: bool,
    json: bool,
}

fn resolve_compression(
    arg: CompressionArg,
    level: u32,
) -> Result<Option<PayloadCompression>, String> {
    match arg {
        CompressionArg::Inherit => Ok(None),
        CompressionArg::None => Ok(Some(PayloadCompression::None)),
        #[cfg(feature = "lzma")]
        CompressionArg::Lzma => Ok(Some(PayloadCompression::Lzma)),
        #[cfg(not(feature = "lzma"))]
        CompressionArg::Lzma => Err("LZMA requires the 'lzma' feature".into()),
        #[cfg(feature = "zlib")]
        CompressionArg::Zlib => Ok(Some(PayloadCompression::Zlib { level })),
        #[cfg(not(feature = "zlib"))]
        CompressionArg::Zlib => {
            let _ = level;
            Err("Zlib requires the 'zlib' feature".into())
        }
    }
}

fn resolve_producer_options(args: &CreateArgs) -> Result<ProducerOptions, String> {
    let mut options = ProducerOptions::default();
    if let Some(ref dir) = args.output_dir {
        options.output_dir = dir.clone();
    }
    if args.no_overwrite {
        options.overwrite = OverwritePolicy::Fail;
    }
    options.compression = resolve_compression(args.compression, args.level)?;
    Ok(options)
}

fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_create(args: &CreateArgs, out: &Output) -> i32 {
    let options = match resolve_producer_options(args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("pkgdelta: create: {e}");
            return 1;
        }
    };

    let mut producer =
        match DeltaProducer::with_options(args.label.clone(), &args.old, &args.new, options) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("pkgdelta: create: {e}");
                return 1;
            }
        };

    let result = producer.create();
    let code = match result {
        Ok(path) => {
            if out.json {
                let stats = producer.stats();
                let difference = producer.difference();
                let json = serde_json::json!({
                    "path": path.display().to_string(),
                    "name": producer.descriptor().identity.name,
                    "base_release": producer.descriptor().base_release,
                    "target_release": producer.descriptor().target_release,
                    "entries": stats.map(|s| s.entries),
                    "payload_bytes": stats.map(|s| s.payload_bytes),
                    "archive_size": stats.map(|s| s.archive_size),
                    "added": difference.map(|d| d.added.len()),
                    "changed": difference.map(|d| d.changed.len()),
                    "unchanged": difference.map(|d| d.unchanged.len()),
                    "removed": difference.map(|d| d.removed.len()),
                });
                println!("{json:#}");
            } else if !out.quiet {
                println!("{}", path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("pkgdelta: create: {e}");
            1
        }
    };

    producer.close();
    code
}

fn cmd_inspect(args: &InspectArgs, out: &Output) -> i32 {
    let pkg = match PackageFile::open(&args.file) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("pkgdelta: inspect: {}: {e}", args.file.display());
            return 1;
        }
    };

    let meta = pkg.metadata();
    if out.json {
        let entries: Vec<_> = pkg
            .manifest()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "path": e.path,
                    "size": e.size,
                    "sha256": e.content_id.to_string(),
                })
            })
            .collect();
        let delta = pkg.delta_info().map(|d| {
            serde_json::json!({
                "base_release": d.base_release,
                "removed": d.removed,
            })
        });
        let json = serde_json::json!({
            "metadata": meta,
            "compression": pkg.compression_id(),
            "delta": delta,
            "entries": entries,
        });
        println!("{json:#}");
        return 0;
    }

    println!("name:         {}", meta.name);
    println!("version:      {}", meta.version);
    println!("release:      {}", meta.release);
    println!("architecture: {}", meta.architecture);
    if !meta.summary.is_empty() {
        println!("summary:      {}", meta.summary);
    }
    if let Some(delta) = pkg.delta_info() {
        println!("delta from:   release {}", delta.base_release);
        for path in &delta.removed {
            println!("  - {path}");
        }
    }
    println!(
        "entries:      {} ({} bytes)",
        pkg.manifest().len(),
        pkg.manifest().total_size()
    );
    if !out.quiet {
        for e in pkg.manifest() {
            println!("  {} {:>10} {}", e.content_id, e.size, e.path);
        }
    }
    0
}

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("pkgdelta version {version}");

    let lzma = cfg!(feature = "lzma") as u8;
    let zlib = cfg!(feature = "zlib") as u8;

    eprintln!("COMPRESSION_LZMA={lzma}");
    eprintln!("COMPRESSION_ZLIB={zlib}");
    eprintln!("FORMAT_VERSION={}", crate::archive::format::FORMAT_VERSION);
    eprintln!("DEFAULT_OUTPUT_DIR={}", std::env::temp_dir().display());

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.quiet, cli.verbose)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let out = Output {
        quiet: cli.quiet,
        json: cli.json_output,
    };

    let exit_code = match &cli.command {
        Cmd::Create(args) => cmd_create(args, &out),
        Cmd::Inspect(args) => cmd_inspect(args, &out),
        Cmd::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
