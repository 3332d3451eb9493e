//! Text and JSON rendering of command results.
//!
//! Every command builds one DTO below and hands it to [`OutputWriter::write`]
//! along with a closure producing the text form. Errors always go to stderr.

use anyhow::Result;
use hcstore_core::{CatalogRecord, Hash, Problem};
use serde::Serialize;
use std::io::{self, Write};

/// Selected by `--json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Renders command DTOs to stdout and errors to stderr.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Print `data` as pretty JSON, or the string built by `text_fn` in text mode.
    ///
    /// `data` is one of the DTOs below, each with `success` and `result_code`.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        let mut handle = self.stdout.lock();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut handle, data)?;
                writeln!(handle)?;
            }
            OutputFormat::Text => handle.write_all(text_fn().as_bytes())?,
        }
        handle.flush()?;
        Ok(())
    }

    /// Report a failed command on stderr, including the `anyhow` context chain.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Any failed command.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub catalog: String,
    pub pool: String,
    pub ledger: String,
}

/// Output for `compress` command.
#[derive(Debug, Serialize)]
pub struct CompressOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub hash: Hash,
    pub offset: u64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub duplicate: bool,
    pub refcount: u64,
}

/// Output for `decompress` command.
#[derive(Debug, Serialize)]
pub struct DecompressOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub destination: String,
    pub bytes_written: u64,
}

/// Ledger effect of a delete.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedgerAction {
    Decremented { refcount: u64 },
    Freed { offset: u64, length: u64 },
    Missing,
}

/// Output for `delete` command.
#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub hash: Hash,
    pub ledger: LedgerAction,
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub records: Vec<CatalogRecord>,
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub hash: Hash,
    pub offset: u64,
    pub compressed_size: u64,
    pub original_size: u64,
    pub code_count: u64,
    pub payload_bits: u64,
    pub ratio: f64,
    pub duplicate: bool,
}

/// Output for `stats` command.
#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub success: bool,
    pub result_code: u8,
    pub pool_bytes: u64,
    pub catalog_records: usize,
    pub ledger_entries: usize,
    pub live_bytes: u64,
    pub dead_bytes: u64,
}

/// Output for `verify` command.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    pub records_checked: usize,
    pub entries_checked: usize,
    pub problems: Vec<Problem>,
}
