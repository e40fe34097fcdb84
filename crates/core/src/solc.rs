//! Boundary to the external `solc` binary.
//!
//! Everything here speaks solc's standard-JSON protocol: the compiler gets
//! one request on stdin and answers with one JSON document on stdout, so a
//! single process round-trip covers any number of sources. Retry policy and
//! diagnostic handling live a level up in [`crate::compiler`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::OptimizerConfig;
use crate::error::{Error, Result};

/// Per-contract output requested from solc: exactly what a
/// [`crate::CompilationUnit`] needs.
const OUTPUT_SELECTION: &[&str] = &["abi", "evm.bytecode.object"];

/// Raw per-file, per-contract mapping as solc reports it. `BTreeMap` keeps
/// key iteration deterministic, which "first file wins" lookups rely on.
pub type RawContracts = BTreeMap<String, BTreeMap<String, SolcContract>>;

/// Handle to a solc executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solc {
    path: PathBuf,
}

impl Default for Solc {
    fn default() -> Self {
        Self::new()
    }
}

impl Solc {
    /// Use `solc` from `PATH`.
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("solc"),
        }
    }

    /// Use an explicit binary.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Honor the `SOLC` environment variable, falling back to `PATH` lookup.
    pub fn from_env() -> Self {
        match std::env::var_os("SOLC") {
            Some(path) => Self::at(PathBuf::from(path)),
            None => Self::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query `solc --version` and return the full version token, e.g.
    /// `0.8.22+commit.4fc1097e.Linux.g++`.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.path)
            .arg("--version")
            .output()
            .map_err(|source| Error::Invoke {
                solc: self.path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::SolcTerminated {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(parse_version_line(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Check the binary against a semver requirement, returning the full
    /// version string on success. Commit metadata after `+` is ignored for
    /// the comparison.
    pub fn ensure_version(&self, required: &semver::VersionReq) -> Result<String> {
        let full = self.version()?;
        let core = full.split('+').next().unwrap_or(full.as_str()).trim();
        match core.trim_start_matches('v').parse::<semver::Version>() {
            Ok(version) if required.matches(&version) => Ok(full),
            _ => Err(Error::VersionMismatch {
                required: required.clone(),
                found: full,
            }),
        }
    }

    /// Run one `--standard-json` round-trip.
    pub fn compile(&self, input: &SolcInput) -> Result<SolcOutput> {
        tracing::debug!(
            solc = %self.path.display(),
            sources = input.sources.len(),
            "invoking solc --standard-json"
        );

        let mut child = Command::new(&self.path)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Invoke {
                solc: self.path.clone(),
                source,
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(&serde_json::to_vec(input)?)
                .map_err(|source| Error::Invoke {
                    solc: self.path.clone(),
                    source,
                })?;
        }

        let output = child.wait_with_output().map_err(|source| Error::Invoke {
            solc: self.path.clone(),
            source,
        })?;

        // solc exits zero even when it reports compile errors; a non-zero
        // status means the invocation itself went wrong.
        if !output.status.success() {
            return Err(Error::SolcTerminated {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Extract the version token from `solc --version` output.
fn parse_version_line(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Version: "))
        .map(str::trim)
        .unwrap_or_else(|| stdout.trim())
        .to_string()
}

/// A `--standard-json` compilation request.
#[derive(Debug, Clone, Serialize)]
pub struct SolcInput {
    pub language: String,
    pub sources: BTreeMap<String, SolcSource>,
    pub settings: SolcSettings,
}

impl SolcInput {
    /// Request holding one labeled in-memory source.
    pub fn from_source(label: impl Into<String>, source: impl Into<String>) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            label.into(),
            SolcSource {
                content: source.into(),
            },
        );
        Self::with_sources(sources)
    }

    /// Request built from files on disk. Sources are keyed by the path
    /// strings as given, so imports between the listed files resolve
    /// against those names.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut sources = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|source| Error::Source {
                path: path.to_path_buf(),
                source,
            })?;
            sources.insert(
                path.to_string_lossy().into_owned(),
                SolcSource { content },
            );
        }
        Ok(Self::with_sources(sources))
    }

    fn with_sources(sources: BTreeMap<String, SolcSource>) -> Self {
        Self {
            language: "Solidity".to_string(),
            sources,
            settings: SolcSettings::default(),
        }
    }
}

/// One source unit in a request.
#[derive(Debug, Clone, Serialize)]
pub struct SolcSource {
    pub content: String,
}

/// Settings block of a request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    pub optimizer: OptimizerConfig,
    pub output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Default for SolcSettings {
    fn default() -> Self {
        let mut per_contract = BTreeMap::new();
        per_contract.insert(
            "*".to_string(),
            OUTPUT_SELECTION.iter().map(|s| s.to_string()).collect(),
        );
        let mut per_file = BTreeMap::new();
        per_file.insert("*".to_string(), per_contract);
        Self {
            evm_version: None,
            optimizer: OptimizerConfig::default(),
            output_selection: per_file,
        }
    }
}

/// Reply to a `--standard-json` request. Unknown keys (source maps, AST,
/// metadata) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolcOutput {
    #[serde(default)]
    pub errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    pub contracts: RawContracts,
}

impl SolcOutput {
    /// True when at least one diagnostic has error severity.
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(SolcDiagnostic::is_error)
    }
}

/// One compiled contract as solc encodes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolcContract {
    #[serde(default)]
    pub abi: Vec<Value>,
    #[serde(default)]
    pub evm: SolcEvm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolcEvm {
    #[serde(default)]
    pub bytecode: SolcBytecode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolcBytecode {
    /// Creation bytecode as an unprefixed hex string.
    #[serde(default)]
    pub object: String,
}

/// One entry of solc's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcDiagnostic {
    #[serde(default)]
    pub severity: Severity,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl SolcDiagnostic {
    /// The message solc formatted with source context, falling back to the
    /// bare message.
    pub fn display_message(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Diagnostic severity. Missing severity is treated as fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}
