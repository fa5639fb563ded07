//! Command-line interface for dynhost.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynhost_core::{Loader, LoaderConfig, Plugin, RecordStatus, SymbolKind};
use serde::Serialize;

/// Load shared-library plugins and inspect their exports.
#[derive(Parser, Debug)]
#[command(name = "dynhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Open one or more plugins and list their exports.
    Open {
        /// Plugin paths, in load order.
        #[arg(required = true)]
        paths: Vec<String>,
        /// Only report these symbols (repeatable).
        #[arg(short, long)]
        symbol: Vec<String>,
    },
    /// Print the effective loader configuration.
    Config,
}

#[derive(Debug, Serialize)]
struct SymbolReport {
    name: String,
    kind: Option<SymbolKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PluginReport {
    requested: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    symbols: Vec<SymbolReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenReport {
    plugins: Vec<PluginReport>,
    registry: Vec<RegistryEntry>,
}

#[derive(Debug, Serialize)]
struct RegistryEntry {
    identity: String,
    status: RecordStatus,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.json);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "dynhost=debug" } else { "dynhost=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LoaderConfig> {
    let config = match path {
        Some(path) => {
            tracing::debug!("Loading configuration from {}", path.display());
            LoaderConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => LoaderConfig::default(),
    };
    config
        .with_env_overrides()
        .context("applying environment overrides")
}

/// Returns whether every requested plugin and symbol resolved.
fn run(args: Args) -> Result<bool> {
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Config => {
            let rendered = if args.json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)?
            };
            println!("{rendered}");
            Ok(true)
        }
        Command::Open { paths, symbol } => {
            tracing::debug!("Opening {} plugin(s)", paths.len());
            let loader = Loader::from_config(config);
            let plugins: Vec<PluginReport> = paths
                .iter()
                .map(|path| report_plugin(&loader, path, &symbol))
                .collect();
            let ok = plugins
                .iter()
                .all(|p| p.error.is_none() && p.symbols.iter().all(|s| s.error.is_none()));
            let opened = plugins.iter().filter(|p| p.error.is_none()).count();
            tracing::info!("Opened {} of {} plugin(s)", opened, plugins.len());
            if !ok {
                tracing::warn!("Not every requested plugin and symbol resolved");
            }

            let report = OpenReport {
                plugins,
                registry: loader
                    .registry()
                    .snapshot()
                    .into_iter()
                    .map(|(identity, status)| RegistryEntry { identity, status })
                    .collect(),
            };

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(ok)
        }
    }
}

fn report_plugin(loader: &Loader, path: &str, wanted: &[String]) -> PluginReport {
    match loader.open(path) {
        Ok(plugin) => PluginReport {
            requested: path.to_string(),
            identity: Some(plugin.identity().to_string()),
            module: Some(plugin.module_path().to_string()),
            symbols: report_symbols(&plugin, wanted),
            error: None,
        },
        Err(e) => PluginReport {
            requested: path.to_string(),
            identity: None,
            module: None,
            symbols: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

fn report_symbols(plugin: &Plugin, wanted: &[String]) -> Vec<SymbolReport> {
    if wanted.is_empty() {
        let mut all: Vec<SymbolReport> = plugin
            .symbols()
            .iter()
            .map(|(name, sym)| SymbolReport {
                name: name.to_string(),
                kind: Some(sym.kind()),
                error: None,
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        return all;
    }

    wanted
        .iter()
        .map(|name| match plugin.lookup(name) {
            Ok(sym) => SymbolReport {
                name: name.clone(),
                kind: Some(sym.kind()),
                error: None,
            },
            Err(e) => {
                tracing::debug!("Lookup of {} failed: {}", name, e);
                SymbolReport {
                    name: name.clone(),
                    kind: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}

fn print_report(report: &OpenReport) {
    for plugin in &report.plugins {
        match (&plugin.error, &plugin.module) {
            (Some(error), _) => println!("✗ {}: {}", plugin.requested, error),
            (None, Some(module)) => {
                println!("✓ {} (module {})", plugin.requested, module);
                for symbol in &plugin.symbols {
                    match (&symbol.kind, &symbol.error) {
                        (Some(kind), _) => println!("    {:<24} {}", symbol.name, kind),
                        (None, Some(error)) => println!("    {:<24} {}", symbol.name, error),
                        (None, None) => println!("    {}", symbol.name),
                    }
                }
            }
            (None, None) => println!("? {}", plugin.requested),
        }
    }

    println!();
    println!("Registry:");
    for entry in &report.registry {
        let status = match entry.status {
            RecordStatus::Loading => "loading",
            RecordStatus::Loaded => "loaded",
            RecordStatus::Failed => "failed",
        };
        println!("    {:<8} {}", status, entry.identity);
    }
}
