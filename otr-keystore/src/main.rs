//! Command-line interface for OTR key stores and fingerprint tables

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use otr_keystore::{
    parse_keys, parse_table, serialize, write_table, KeyMap, KeystoreError, OtrFingerprinter,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "otrkeys")]
#[command(about = "Read and rewrite OTR private key stores and fingerprint tables")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the accounts in a private key store
    Keys {
        /// Private key S-expression file
        file: PathBuf,
        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<String>,
    },
    /// List the records in a fingerprint table
    Fingerprints {
        /// Tab-separated fingerprint file
        file: PathBuf,
        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Parse a private key store and write it back out
    RewriteKeys {
        input: PathBuf,
        output: PathBuf,
    },
    /// Parse a fingerprint table and write it expanded over account aliases
    RewriteFingerprints {
        input: PathBuf,
        output: PathBuf,
        /// Account alias to write rows for; repeatable. Defaults to the
        /// configured accounts
        #[arg(short, long = "account")]
        accounts: Vec<String>,
    },
    /// Store default settings in the configuration file
    Config {
        /// Account alias; repeatable
        #[arg(short, long = "account")]
        accounts: Vec<String>,
        /// Default output format (text, json)
        #[arg(short, long)]
        format: Option<String>,
    },
}

#[derive(Serialize)]
struct KeySummary<'a> {
    name: &'a str,
    resource: &'a str,
    protocol: &'a str,
    fingerprint: &'a str,
    has_secret: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())?;
    init_logging(cli.verbose || config.verbose)?;

    let result = match cli.command {
        Commands::Keys { file, format } => {
            keys_command(&file, format.as_deref().unwrap_or(&config.output_format))
        }
        Commands::Fingerprints { file, format } => {
            fingerprints_command(&file, format.as_deref().unwrap_or(&config.output_format))
        }
        Commands::RewriteKeys { input, output } => rewrite_keys_command(&input, &output),
        Commands::RewriteFingerprints { input, output, accounts } => {
            let accounts = if accounts.is_empty() { &config.accounts } else { &accounts };
            rewrite_fingerprints_command(&input, &output, accounts)
        }
        Commands::Config { accounts, format } => {
            config_command(config, cli.config.as_deref(), accounts, format)
        }
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(marked) = e.downcast_ref::<KeystoreError>().and_then(KeystoreError::marked_line) {
                eprintln!("{}", marked);
            }
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn load_keys(path: &Path) -> Result<KeyMap> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key store: {}", path.display()))?;
    Ok(parse_keys(&content, &OtrFingerprinter)?)
}

fn keys_command(file: &Path, format: &str) -> Result<()> {
    let keys = load_keys(file)?;

    match format {
        "json" => {
            let summaries: Vec<KeySummary> = keys
                .values()
                .map(|record| KeySummary {
                    name: &record.name,
                    resource: &record.resource,
                    protocol: &record.protocol,
                    fingerprint: &record.fingerprint,
                    has_secret: record.has_secret(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        "text" => {
            for record in keys.values() {
                let secret = if record.has_secret() { "private" } else { "public" };
                println!(
                    "{}\t{}\t{}\t{}",
                    record.fingerprint,
                    record.protocol,
                    secret,
                    record.full_name()
                );
            }
        }
        other => bail!("Unknown output format: {}", other),
    }

    Ok(())
}

fn fingerprints_command(file: &Path, format: &str) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read fingerprint table: {}", file.display()))?;
    let records = parse_table(&content)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        "text" => {
            for record in records.values() {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.fingerprint,
                    record.protocol,
                    record.verification.as_deref().unwrap_or("-"),
                    record.name
                );
            }
        }
        other => bail!("Unknown output format: {}", other),
    }

    Ok(())
}

fn rewrite_keys_command(input: &Path, output: &Path) -> Result<()> {
    let keys = load_keys(input)?;
    let text = serialize(&keys)?;

    fs::write(output, text)
        .with_context(|| format!("Failed to write key store: {}", output.display()))?;

    let written = keys.values().filter(|k| k.has_secret()).count();
    info!("Wrote {} of {} accounts to {}", written, keys.len(), output.display());
    Ok(())
}

fn rewrite_fingerprints_command(input: &Path, output: &Path, accounts: &[String]) -> Result<()> {
    if accounts.is_empty() {
        bail!("No account aliases given; pass --account or set `accounts` in the config file");
    }

    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read fingerprint table: {}", input.display()))?;
    let records = parse_table(&content)?;
    let text = write_table(&records, accounts);

    fs::write(output, &text)
        .with_context(|| format!("Failed to write fingerprint table: {}", output.display()))?;

    info!("Wrote {} rows to {}", text.lines().count(), output.display());
    Ok(())
}

fn config_command(
    mut config: CliConfig,
    path: Option<&Path>,
    accounts: Vec<String>,
    format: Option<String>,
) -> Result<()> {
    if !accounts.is_empty() {
        config.accounts = accounts;
    }
    if let Some(format) = format {
        config.output_format = format;
    }
    config.save(path)?;
    info!("Saved configuration");
    Ok(())
}
