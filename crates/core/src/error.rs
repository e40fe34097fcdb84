//! Error types shared across compilation, resolution and artifact emission.

use std::path::PathBuf;
use std::process::ExitStatus;

use crate::solc::SolcDiagnostic;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One compiler-version group of fatal diagnostics.
///
/// solc reports errors as a flat list; the invoker stamps them with the
/// version of the binary that produced them so sinks and callers can tell
/// output of different toolchains apart.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    /// Version of the compiler that produced the diagnostics, when known.
    pub compiler_version: Option<String>,
    /// Error-severity diagnostics, in the order solc emitted them.
    pub diagnostics: Vec<SolcDiagnostic>,
}

impl CompileFailure {
    /// Header line used when reporting this group, e.g. `Solc 0.8.22: 2 error(s)`.
    pub fn headline(&self) -> String {
        format!(
            "Solc {}: {} error(s)",
            self.compiler_version.as_deref().unwrap_or("<unknown>"),
            self.diagnostics.len()
        )
    }
}

/// Everything that can go wrong between a source input and a scaffolded
/// compilation result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Spawning or talking to the solc process failed at the OS level.
    #[error("Failed to invoke `{}`: {source}", .solc.display())]
    Invoke {
        solc: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file could not be read before the compiler was ever reached.
    #[error("Failed to read source `{}`: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// solc exited without producing a standard-JSON reply.
    #[error("solc exited with {status}: {stderr}")]
    SolcTerminated { status: ExitStatus, stderr: String },

    /// A standard-JSON payload could not be encoded or decoded.
    #[error("Malformed standard-JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The transient-permission retry budget ran out.
    #[error("Compilation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<Error>,
    },

    /// The compiler rejected the sources. All diagnostics were handed to the
    /// sink before this was returned.
    #[error("Compilation reported {} error(s)", error_count(.failures))]
    Compilation { failures: Vec<CompileFailure> },

    /// The configured version requirement is not satisfied by the binary.
    #[error("solc {found} does not satisfy required version `{required}`")]
    VersionMismatch {
        required: semver::VersionReq,
        found: String,
    },

    /// No contract name was given and the output has no unambiguous shortcut.
    #[error(
        "Cannot pick a contract out of {files} file(s) holding {contracts} contract(s); \
         pass an explicit contract name"
    )]
    AmbiguousContract { files: usize, contracts: usize },

    /// The requested contract name is absent from every compiled file.
    #[error("Contract `{0}` not found in compilation output")]
    ContractNotFound(String),

    /// Compilation succeeded but produced no contracts at all.
    #[error("Compilation produced no contracts")]
    NoContracts,

    /// No usable source text or path could be derived from the input.
    #[error("Invalid source input: {0}")]
    InvalidSource(String),

    /// A contract's bytecode is not a hex string.
    #[error("Invalid bytecode hex for `{contract}`: {source}")]
    Bytecode {
        contract: String,
        #[source]
        source: hex::FromHexError,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Writing an artifact file failed.
    #[error("Failed to write artifact `{}`: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deployment through the ethers bridge failed.
    #[cfg(feature = "ethers")]
    #[error("Deployment failed: {0}")]
    Deploy(String),
}

fn error_count(failures: &[CompileFailure]) -> usize {
    failures.iter().map(|f| f.diagnostics.len()).sum()
}

impl Error {
    /// True for the narrow class of OS failures worth retrying: the kernel
    /// refused access to the compiler binary or to a source file. Matches
    /// both the POSIX ("permission denied") and Windows ("operation not
    /// permitted") spellings on top of the portable error kind.
    pub fn is_transient_permission(&self) -> bool {
        let io = match self {
            Error::Invoke { source, .. } | Error::Source { source, .. } => source,
            _ => return false,
        };
        if io.kind() == std::io::ErrorKind::PermissionDenied {
            return true;
        }
        let message = io.to_string().to_ascii_lowercase();
        message.contains("permission denied") || message.contains("operation not permitted")
    }

    /// All failure groups when this is a [`Error::Compilation`], empty
    /// otherwise.
    pub fn compile_failures(&self) -> &[CompileFailure] {
        match self {
            Error::Compilation { failures } => failures,
            _ => &[],
        }
    }
}
