//! CLI for the solcraft library
//!
//! Compiles Solidity sources through an external solc and writes ABI and
//! bytecode artifacts.

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use serde::Serialize;
use solcraft::{
    looks_like_path, save_artifacts, ArtifactOptions, CompiledContract, Compiler, CompilerConfig,
    Error, OptimizerConfig, SourceSpec,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Solidity source-to-bytecode compiler
#[derive(Parser, Debug)]
#[command(name = "solcraft")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Common compilation settings
#[derive(Parser, Debug, Clone)]
struct CompileSettings {
    /// Contract to pick out of the result; required when the compilation
    /// holds more than one contract
    #[arg(short, long)]
    contract: Option<String>,

    /// Path to the solc binary (defaults to $SOLC, then PATH)
    #[arg(long)]
    solc: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target EVM version passed to solc (e.g. shanghai)
    #[arg(long)]
    evm_version: Option<String>,

    /// Enable the solc optimizer
    #[arg(long)]
    optimize: bool,

    /// Optimizer runs, used together with --optimize
    #[arg(long, default_value_t = 200)]
    optimizer_runs: u32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile Solidity sources to ABI and creation bytecode
    Compile {
        /// Inline Solidity text, one or more file paths, or a directory
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Write a Rust artifact module per contract into this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Also write the raw ABI next to each artifact module
        #[arg(long)]
        emit_abi: bool,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        compile: CompileSettings,
    },

    /// Print a contract's ABI
    Abi {
        /// Inline Solidity text, one or more file paths, or a directory
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        compile: CompileSettings,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Output {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        data: SuccessData,
    },

    #[serde(rename = "error")]
    Error { error_type: String, message: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command")]
enum SuccessData {
    #[serde(rename = "compile")]
    Compile {
        #[serde(skip_serializing_if = "Option::is_none")]
        solc_version: Option<String>,
        files: usize,
        contracts: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        contract_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bytecode_size: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        out_dir: Option<String>,
        written: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Compile {
            inputs,
            out_dir,
            emit_abi,
            json,
            compile,
        } => run_compile(inputs, out_dir, emit_abi, json, compile),
        Commands::Abi {
            inputs,
            compact,
            compile,
        } => run_abi(inputs, compact, compile),
    };

    if let Err(e) = result {
        output_error(e);
        std::process::exit(1);
    }
}

fn run_compile(
    inputs: Vec<String>,
    out_dir: Option<PathBuf>,
    emit_abi: bool,
    json: bool,
    settings: CompileSettings,
) -> Result<()> {
    let spec = resolve_spec(&inputs, settings.contract.as_deref())?;
    let compiler = Compiler::with_config(build_config(&settings)?);
    let output = compiler.compile(&spec).context("Compilation failed")?;

    // A named contract must resolve; otherwise take the shortcut when the
    // result is unambiguous and fall back to listing everything.
    let selected = match spec.contract_name.as_deref() {
        Some(name) => Some(output.select(Some(name))?.clone()),
        None => output.unit().cloned(),
    };

    let mut written = Vec::new();
    if let Some(out_dir) = &out_dir {
        let options = ArtifactOptions {
            emit_abi_json: emit_abi,
            ..ArtifactOptions::default()
        };
        match &selected {
            Some(unit) => {
                let saved = save_artifacts(unit, out_dir, &options)?;
                written.push(saved.module);
            }
            None => {
                // Save every contract; on duplicate names the first file wins.
                let mut seen = BTreeSet::new();
                for (file, unit) in output.units() {
                    if !seen.insert(unit.contract_name.clone()) {
                        tracing::warn!(
                            "Skipping duplicate contract name {} from {}",
                            unit.contract_name,
                            file
                        );
                        continue;
                    }
                    let saved = save_artifacts(unit, out_dir, &options)?;
                    written.push(saved.module);
                }
            }
        }
    }

    if json {
        let payload = Output::Success {
            data: SuccessData::Compile {
                solc_version: output.solc_version.clone(),
                files: output.file_count(),
                contracts: output.contract_count(),
                contract_name: selected.as_ref().map(|unit| unit.contract_name.clone()),
                bytecode_size: selected.as_ref().map(|unit| unit.bytecode.len() / 2),
                out_dir: out_dir.as_ref().map(|dir| dir.display().to_string()),
                written: written.iter().map(|path| path.display().to_string()).collect(),
            },
        };
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        match &selected {
            Some(unit) => {
                println!("✅ Successfully compiled {}", unit.contract_name);
                println!("   - ABI entries: {}", unit.abi.len());
                println!("   - Bytecode: {} bytes", unit.bytecode.len() / 2);
            }
            None => {
                println!(
                    "✅ Successfully compiled {} contract(s) across {} file(s)",
                    output.contract_count(),
                    output.file_count()
                );
                for (file, unit) in output.units() {
                    println!("   - {} ({})", unit.contract_name, file);
                }
            }
        }
        if let Some(version) = &output.solc_version {
            println!("🛠️  Compiler: solc {}", version);
        }
        for path in &written {
            println!("📄 Wrote {}", path.display());
        }
    }

    Ok(())
}

fn run_abi(inputs: Vec<String>, compact: bool, settings: CompileSettings) -> Result<()> {
    let spec = resolve_spec(&inputs, settings.contract.as_deref())?;
    let compiler = Compiler::with_config(build_config(&settings)?);
    let contract = CompiledContract::compile_with(&compiler, &spec)?;

    let abi = contract.abi_json();
    let rendered = if compact {
        serde_json::to_string(&abi)?
    } else {
        serde_json::to_string_pretty(&abi)?
    };
    println!("{rendered}");

    Ok(())
}

/// Turn CLI inputs into a source spec. An existing path always wins over the
/// textual heuristic, so a file named without a `.sol` suffix still compiles.
fn resolve_spec(inputs: &[String], contract: Option<&str>) -> Result<SourceSpec> {
    let spec = if inputs.len() == 1 {
        let input = &inputs[0];
        if Path::new(input).exists() {
            SourceSpec::path(input)
        } else {
            SourceSpec::parse(input)?
        }
    } else {
        let mut paths = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !Path::new(input).exists() && !looks_like_path(input) {
                return Err(eyre::eyre!(
                    "With multiple inputs every argument must be a path, got inline source text"
                ));
            }
            paths.push(PathBuf::from(input));
        }
        SourceSpec::paths(paths)
    };

    Ok(match contract {
        Some(name) => spec.contract(name),
        None => spec,
    })
}

/// Start from the config file when given, then let flags override it.
fn build_config(settings: &CompileSettings) -> Result<CompilerConfig> {
    let mut config = match &settings.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };

    if let Some(solc) = &settings.solc {
        config.solc = Some(solc.clone());
    }
    if let Some(evm_version) = &settings.evm_version {
        config.evm_version = Some(evm_version.clone());
    }
    if settings.optimize {
        config.optimizer = OptimizerConfig {
            enabled: true,
            runs: settings.optimizer_runs,
        };
    }

    Ok(config)
}

fn error_type(error: &eyre::Report) -> &'static str {
    match error.downcast_ref::<Error>() {
        Some(Error::Compilation { .. }) => "compilation_failed",
        Some(Error::RetriesExhausted { .. }) => "retries_exhausted",
        Some(Error::VersionMismatch { .. }) => "version_mismatch",
        Some(Error::AmbiguousContract { .. }) => "ambiguous_contract",
        Some(Error::ContractNotFound(_)) => "contract_not_found",
        Some(Error::NoContracts) => "no_contracts",
        Some(Error::InvalidSource(_)) => "invalid_source",
        Some(Error::Config(_)) => "invalid_config",
        Some(Error::Invoke { .. }) | Some(Error::SolcTerminated { .. }) => "solc_error",
        Some(_) => "compiler_error",
        None => "unknown_error",
    }
}

fn output_error(error: eyre::Report) {
    let output = Output::Error {
        error_type: error_type(&error).to_string(),
        message: error.to_string(),
    };

    eprintln!("{}", serde_json::to_string(&output).unwrap());
}
