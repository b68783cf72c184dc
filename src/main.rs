//! Invoice Desk CLI - normalize invoice payloads and read the invoice server through the cache

use std::collections::BTreeMap;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use invoicedesk::cache::ExpiringCache;
use invoicedesk::cli::{
    parse_json_arg, read_field_map, read_json_input, CacheCommand, Cli, Command,
};
use invoicedesk::config::AppConfig;
use invoicedesk::fields::{
    fill_invoice_form, validate_invoice_data, FieldMap, FieldResolver, FormFieldMap,
};
use invoicedesk::format::format_currency;

/// Logs go to stderr so stdout stays machine-readable
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("invoicedesk=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_cache(
    cache: &ExpiringCache,
    command: CacheCommand,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        CacheCommand::Get { key } => match cache.get(&key) {
            Some(value) => print_json(&value)?,
            None => {
                eprintln!("No cached entry for '{key}'");
                return Ok(false);
            }
        },
        CacheCommand::Put { key, value, ttl } => {
            let value = parse_json_arg("value", &value)?;
            cache.try_put(&key, &value, ttl.unwrap_or(cache.default_ttl_minutes()))?;
        }
        CacheCommand::Clear { key } => cache.clear(&key),
        CacheCommand::ClearPrefix { prefixes } => {
            let removed = if prefixes.is_empty() {
                cache.clear_invoice_cache()
            } else {
                cache.clear_by_prefixes(&prefixes[..])
            };
            println!("{removed}");
        }
    }
    Ok(true)
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let config: AppConfig = cli.config();

    match cli.command {
        Command::Cache(command) => run_cache(&config.cache()?, command),
        Command::Fetch(args) => {
            let cache = config.cache()?;
            let ttl = args.ttl.unwrap_or(cache.default_ttl_minutes());
            let value = cache
                .fetch_with_cache(&config.url(&args.path), &args.key, ttl, args.force)
                .await?;
            print_json(&value)?;
            Ok(true)
        }
        Command::Extract(args) => {
            let input = read_json_input(&args.input.input)?;
            let map = match &args.map {
                Some(path) => read_field_map(path)?,
                None => FieldMap::default(),
            };
            let mut record = FieldResolver::new(map).extract(&input);
            if args.validate {
                record = validate_invoice_data(&record);
            }
            print_json(&record)?;
            Ok(true)
        }
        Command::Fill(args) => {
            let input = read_json_input(&args.input)?;
            let mut form: BTreeMap<String, String> = BTreeMap::new();
            fill_invoice_form(&mut form, &FormFieldMap::invoice_form(), &input);
            for (element_id, value) in &form {
                println!("{element_id}={value}");
            }
            Ok(true)
        }
        Command::FormatAmount(args) => {
            println!(
                "{}",
                format_currency(&Value::String(args.amount), args.locale, &args.currency)
            );
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
