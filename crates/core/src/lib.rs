//! Solidity compilation library: drive an external solc, scaffold its
//! per-file output, and turn a single contract into deployable artifacts.
pub mod artifacts;
pub mod compiler;
pub mod config;
pub mod contract;
pub mod error;
pub mod output;
pub mod solc;
pub mod source;

pub use artifacts::{save_artifacts, ArtifactOptions, SavedArtifacts};
pub use compiler::{Clock, Compiler, DiagnosticSink, SystemClock, TracingSink};
pub use config::{CompilerConfig, CompilerConfigBuilder, OptimizerConfig, RetryConfig};
pub use contract::CompiledContract;
pub use error::{CompileFailure, Error, Result};
pub use output::{CompilationUnit, CompileOutput, FileOutput};
pub use solc::{RawContracts, Severity, Solc, SolcDiagnostic, SolcInput, SolcOutput};
pub use source::{looks_like_path, SourceKind, SourceSpec, INLINE_LABEL};
