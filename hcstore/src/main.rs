mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hcstore_core::{Release, Store, StorePaths};
use log::info;
use output::{
    CompressOutput, DecompressOutput, DeleteOutput, InitOutput, LedgerAction, LsOutput,
    OutputWriter, StatOutput, StatsOutput, VerifyOutput,
};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit code when `verify` finds inconsistencies.
const EXIT_INCONSISTENT: u8 = 2;

/// hcstore - A deduplicating, Huffman-compressed content store
#[derive(Parser)]
#[command(name = "hcstore")]
#[command(about = "Deduplicating Huffman-compressed file store", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to HCSTORE_ROOT env var or ./hcstore)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Name catalog file (defaults to <root>/catalog.txt)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Blob pool file (defaults to <root>/pool.bin)
    #[arg(long, global = true)]
    pool: Option<PathBuf>,

    /// Hash ledger file (defaults to <root>/hash_index.txt)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log progress (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init,

    /// Compress a file into the store
    Compress {
        /// File to compress
        input: PathBuf,

        /// Logical name (defaults to the input path as given)
        #[arg(long)]
        name: Option<String>,
    },

    /// Restore a stored file
    Decompress {
        /// Logical name
        name: String,

        /// Destination path, or "-" for stdout (defaults to recovered_<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove a name from the store
    Delete {
        /// Logical name
        name: String,
    },

    /// List catalog records
    Ls,

    /// Show blob header details for a name
    Stat {
        /// Logical name
        name: String,
    },

    /// Show pool usage
    Stats,

    /// Check catalog, ledger and pool consistency
    Verify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let out = OutputWriter::new(cli.json);
    match run(&cli, &out) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            out.write_error(&err, 1);
            ExitCode::FAILURE
        }
    }
}

/// Resolved store configuration: root plus per-file overrides.
struct Location {
    root: PathBuf,
    paths: StorePaths,
    overridden: bool,
}

impl Location {
    fn resolve(cli: &Cli) -> Self {
        // Root: CLI arg > HCSTORE_ROOT env var > ./hcstore default
        let root = cli
            .root
            .clone()
            .or_else(|| std::env::var("HCSTORE_ROOT").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./hcstore"));

        let mut paths = StorePaths::in_dir(&root);
        let overridden = cli.catalog.is_some() || cli.pool.is_some() || cli.ledger.is_some();
        if let Some(catalog) = &cli.catalog {
            paths.catalog = catalog.clone();
        }
        if let Some(pool) = &cli.pool {
            paths.pool = pool.clone();
        }
        if let Some(ledger) = &cli.ledger {
            paths.ledger = ledger.clone();
        }

        Self {
            root,
            paths,
            overridden,
        }
    }

    fn open(&self) -> Result<Store> {
        if self.overridden {
            return Ok(Store::with_paths(self.paths.clone()));
        }
        Store::open(&self.root)
            .with_context(|| format!("Failed to open store at {}", self.root.display()))
    }
}

fn run(cli: &Cli, out: &OutputWriter) -> Result<u8> {
    let location = Location::resolve(cli);

    match &cli.command {
        Commands::Init => cmd_init(&location, out),
        Commands::Compress { input, name } => cmd_compress(&location, out, input, name.as_deref()),
        Commands::Decompress { name, output } => {
            cmd_decompress(&location, out, name, output.as_deref())
        }
        Commands::Delete { name } => cmd_delete(&location, out, name),
        Commands::Ls => cmd_ls(&location, out),
        Commands::Stat { name } => cmd_stat(&location, out, name),
        Commands::Stats => cmd_stats(&location, out),
        Commands::Verify => cmd_verify(&location, out),
    }
}

fn cmd_init(location: &Location, out: &OutputWriter) -> Result<u8> {
    let store = if location.overridden {
        Store::create(location.paths.clone())
    } else {
        Store::init(&location.root)
    }
    .with_context(|| format!("Failed to initialize store at {}", location.root.display()))?;

    let paths = store.paths();
    let data = InitOutput {
        success: true,
        result_code: 0,
        catalog: paths.catalog.display().to_string(),
        pool: paths.pool.display().to_string(),
        ledger: paths.ledger.display().to_string(),
    };
    out.write(&data, || {
        format!(
            "Initialized hcstore\nCatalog: {}\nPool: {}\nLedger: {}\n",
            data.catalog, data.pool, data.ledger
        )
    })?;
    Ok(0)
}

fn cmd_compress(
    location: &Location,
    out: &OutputWriter,
    input: &Path,
    name: Option<&str>,
) -> Result<u8> {
    let store = location.open()?;
    let outcome = store
        .compress_file(input, name)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    let record = &outcome.record;
    let data = CompressOutput {
        success: true,
        result_code: 0,
        name: record.name.clone(),
        hash: record.hash,
        offset: record.offset,
        original_size: outcome.original_size,
        compressed_size: record.compressed_size,
        duplicate: record.duplicate,
        refcount: outcome.refcount,
    };
    out.write(&data, || {
        if data.duplicate {
            format!(
                "{} {}\nDuplicate: reusing blob at offset {} ({} bytes), refcount {}\n",
                data.hash, data.name, data.offset, data.compressed_size, data.refcount
            )
        } else {
            format!(
                "{} {}\nWrote blob at offset {} ({} -> {} bytes)\n",
                data.hash, data.name, data.offset, data.original_size, data.compressed_size
            )
        }
    })?;
    Ok(0)
}

/// Default restore target: `recovered_<file name>` in the current directory.
fn default_output(name: &str) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    PathBuf::from(format!("recovered_{}", base))
}

fn cmd_decompress(
    location: &Location,
    out: &OutputWriter,
    name: &str,
    output: Option<&Path>,
) -> Result<u8> {
    let store = location.open()?;

    if output == Some(Path::new("-")) {
        let stdout = io::stdout();
        store
            .decompress_to(name, stdout.lock())
            .with_context(|| format!("Failed to decompress {}", name))?;
        return Ok(0);
    }

    let dest = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(name));
    let restored = store
        .decompress(name)
        .with_context(|| format!("Failed to decompress {}", name))?;
    fs::write(&dest, &restored).with_context(|| format!("Failed to write {}", dest.display()))?;
    info!("wrote {} bytes to {}", restored.len(), dest.display());

    let data = DecompressOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
        destination: dest.display().to_string(),
        bytes_written: restored.len() as u64,
    };
    out.write(&data, || {
        format!(
            "Restored {} to {} ({} bytes)\n",
            data.name, data.destination, data.bytes_written
        )
    })?;
    Ok(0)
}

/// Map a ledger release to its output form, logging freed space.
fn ledger_action(release: &Release) -> LedgerAction {
    match release {
        Release::Decremented(entry) => LedgerAction::Decremented {
            refcount: entry.refcount,
        },
        Release::Freed(entry) => {
            info!(
                "{} bytes at pool offset {} are now unreferenced",
                entry.length, entry.offset
            );
            LedgerAction::Freed {
                offset: entry.offset,
                length: entry.length,
            }
        }
        Release::Missing => LedgerAction::Missing,
    }
}

fn cmd_delete(location: &Location, out: &OutputWriter, name: &str) -> Result<u8> {
    let store = location.open()?;
    let outcome = store
        .delete(name)
        .with_context(|| format!("Failed to delete {}", name))?;

    let data = DeleteOutput {
        success: true,
        result_code: 0,
        name: outcome.record.name.clone(),
        hash: outcome.record.hash,
        ledger: ledger_action(&outcome.release),
    };
    out.write(&data, || {
        let detail = match &data.ledger {
            LedgerAction::Decremented { refcount } => {
                format!("refcount for {} now {}", data.hash, refcount)
            }
            LedgerAction::Freed { offset, length } => {
                format!("blob at offset {} ({} bytes) no longer referenced", offset, length)
            }
            LedgerAction::Missing => format!("no ledger entry for {}", data.hash),
        };
        format!("Deleted {}\n{}\n", data.name, detail)
    })?;
    Ok(0)
}

fn cmd_ls(location: &Location, out: &OutputWriter) -> Result<u8> {
    let store = location.open()?;
    let records = store.list().with_context(|| "Failed to read catalog")?;

    let data = LsOutput {
        success: true,
        result_code: 0,
        records,
    };
    out.write(&data, || {
        if data.records.is_empty() {
            return "No files stored\n".to_string();
        }
        let mut text = String::new();
        for record in &data.records {
            let _ = writeln!(text, "{}", record.to_line());
        }
        text
    })?;
    Ok(0)
}

fn cmd_stat(location: &Location, out: &OutputWriter, name: &str) -> Result<u8> {
    let store = location.open()?;
    let stat = store
        .stat(name)
        .with_context(|| format!("Failed to stat {}", name))?;

    let data = StatOutput {
        success: true,
        result_code: 0,
        name: stat.record.name.clone(),
        hash: stat.record.hash,
        offset: stat.record.offset,
        compressed_size: stat.record.compressed_size,
        original_size: stat.original_size,
        code_count: stat.code_count,
        payload_bits: stat.payload_bits,
        ratio: stat.ratio,
        duplicate: stat.record.duplicate,
    };
    out.write(&data, || {
        format!(
            "Name: {}\nHash: {}\nOffset: {}\nSize: {} bytes\nCompressed: {} bytes ({:.1}%)\nCodes: {}\nPayload bits: {}\nDuplicate: {}\n",
            data.name,
            data.hash,
            data.offset,
            data.original_size,
            data.compressed_size,
            data.ratio * 100.0,
            data.code_count,
            data.payload_bits,
            if data.duplicate { "yes" } else { "no" }
        )
    })?;
    Ok(0)
}

fn cmd_stats(location: &Location, out: &OutputWriter) -> Result<u8> {
    let store = location.open()?;
    let stats = store.stats().with_context(|| "Failed to collect stats")?;

    let data = StatsOutput {
        success: true,
        result_code: 0,
        pool_bytes: stats.pool_bytes,
        catalog_records: stats.catalog_records,
        ledger_entries: stats.ledger_entries,
        live_bytes: stats.live_bytes,
        dead_bytes: stats.dead_bytes,
    };
    out.write(&data, || {
        format!(
            "Files: {}\nBlobs: {}\nPool: {} bytes\nLive: {} bytes\nDead: {} bytes\n",
            data.catalog_records,
            data.ledger_entries,
            data.pool_bytes,
            data.live_bytes,
            data.dead_bytes
        )
    })?;
    Ok(0)
}

fn cmd_verify(location: &Location, out: &OutputWriter) -> Result<u8> {
    let store = location.open()?;
    let report = store.verify().with_context(|| "Failed to verify store")?;

    let code = if report.is_consistent() {
        0
    } else {
        EXIT_INCONSISTENT
    };
    let data = VerifyOutput {
        success: report.is_consistent(),
        result_code: code,
        records_checked: report.records_checked,
        entries_checked: report.entries_checked,
        problems: report.problems,
    };
    out.write(&data, || {
        let mut text = format!(
            "Checked {} catalog records, {} ledger entries\n",
            data.records_checked, data.entries_checked
        );
        if data.problems.is_empty() {
            text.push_str("OK\n");
        }
        for problem in &data.problems {
            let _ = writeln!(text, "problem: {}", problem);
        }
        text
    })?;
    Ok(code)
}
