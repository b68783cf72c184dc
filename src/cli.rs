//! Command-line interface parsing for invoicedesk
//!
//! This module handles parsing of CLI arguments using clap and reading the
//! JSON inputs the subcommands operate on.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::fields::FieldMap;
use crate::format::Locale;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// An argument that should be JSON is not
    #[error("Invalid JSON in {what}: {source}")]
    InvalidJson {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// An input file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Invoice desk - cache, normalize and format invoice data
#[derive(Parser, Debug)]
#[command(name = "invoicedesk")]
#[command(about = "Invoice data normalization and cached access to the invoice server")]
#[command(version)]
pub struct Cli {
    /// Base URL of the invoice server (overrides INVOICEDESK_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Cache directory (overrides INVOICEDESK_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or modify the response cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// GET a JSON endpoint through the cache
    Fetch(FetchArgs),

    /// Print the normalized invoice record for a JSON payload
    Extract(ExtractArgs),

    /// Print form element values for a JSON payload
    Fill(InputArgs),

    /// Format an amount for display
    FormatAmount(FormatAmountArgs),
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print a cached value
    Get { key: String },

    /// Store a JSON value
    Put {
        key: String,
        /// JSON literal to store
        value: String,
        /// Time-to-live in minutes
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Remove a single entry
    Clear { key: String },

    /// Remove every entry whose key starts with one of the prefixes
    ///
    /// Without prefixes, clears cached invoice, folder and supplier data.
    ClearPrefix { prefixes: Vec<String> },
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// API path (e.g. /api/invoices) or absolute URL
    pub path: String,

    /// Cache key
    #[arg(long)]
    pub key: String,

    /// Time-to-live in minutes
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Bypass the cache for this read
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// JSON file to read, `-` for stdin
    #[arg(default_value = "-")]
    pub input: String,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Canonicalize the invoice date
    #[arg(long)]
    pub validate: bool,

    /// JSON file with a custom field map (`[{"target": ..., "sources": [...]}]`)
    #[arg(long, value_name = "FILE")]
    pub map: Option<String>,
}

#[derive(Args, Debug)]
pub struct FormatAmountArgs {
    pub amount: String,

    #[arg(long, default_value = "de-DE", value_parser = parse_locale_arg)]
    pub locale: Locale,

    #[arg(long, default_value = "EUR")]
    pub currency: String,
}

fn parse_locale_arg(s: &str) -> Result<Locale, String> {
    s.parse::<Locale>().map_err(|e| e.to_string())
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        config
    }
}

/// Parses a JSON literal given on the command line
pub fn parse_json_arg(what: &str, s: &str) -> Result<Value, CliError> {
    serde_json::from_str(s).map_err(|source| CliError::InvalidJson {
        what: what.to_string(),
        source,
    })
}

fn read_text(path: &str) -> Result<String, CliError> {
    let read_error = |source| CliError::Read {
        path: path.to_string(),
        source,
    };

    if path == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).map_err(read_error)?;
        Ok(text)
    } else {
        fs::read_to_string(path).map_err(read_error)
    }
}

/// Reads a JSON document from a file or stdin
pub fn read_json_input(path: &str) -> Result<Value, CliError> {
    parse_json_arg(path, &read_text(path)?)
}

/// Reads a custom field map from a file
pub fn read_field_map(path: &str) -> Result<FieldMap, CliError> {
    serde_json::from_str(&read_text(path)?).map_err(|source| CliError::InvalidJson {
        what: path.to_string(),
        source,
    })
}
