//! Compilation driver: version gate, transient-failure retry, diagnostic
//! routing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CompilerConfig, RetryConfig};
use crate::error::{CompileFailure, Error, Result};
use crate::output::CompileOutput;
use crate::solc::{Severity, Solc, SolcDiagnostic, SolcInput};
use crate::source::{SourceKind, SourceSpec, INLINE_LABEL};

/// Time source for retry pacing. Injected so tests can observe backoff
/// instead of waiting it out.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Receiver for solc diagnostics. Every diagnostic in a reply goes through
/// the sink, warnings included, before the compile call returns.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &SolcDiagnostic);
}

/// Default sink: forwards each diagnostic to `tracing` at the level
/// matching its severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &SolcDiagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::error!("{}", diagnostic.display_message()),
            Severity::Warning => tracing::warn!("{}", diagnostic.display_message()),
            Severity::Info => tracing::info!("{}", diagnostic.display_message()),
        }
    }
}

/// Drives solc for one or more sources and scaffolds the result.
pub struct Compiler {
    solc: Solc,
    config: CompilerConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("solc", &self.solc)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    /// Compiler with default configuration, finding solc via `$SOLC` or
    /// `PATH`.
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        let solc = match &config.solc {
            Some(path) => Solc::at(path),
            None => Solc::from_env(),
        };
        Self {
            solc,
            config,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    /// Override the solc handle.
    pub fn with_solc(mut self, solc: Solc) -> Self {
        self.solc = solc;
        self
    }

    /// Override the retry time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override where diagnostics are delivered.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn solc(&self) -> &Solc {
        &self.solc
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile whatever `spec` describes: inline text, a file, a
    /// directory, or a set of files.
    pub fn compile(&self, spec: &SourceSpec) -> Result<CompileOutput> {
        match &spec.kind {
            SourceKind::Inline { source } => self.compile_source(source),
            SourceKind::Path { path } if path.is_dir() => self.compile_dir(path),
            SourceKind::Path { path } => self.compile_files(std::slice::from_ref(path)),
            SourceKind::Paths { paths } => self.compile_files(paths),
        }
    }

    /// Compile in-memory Solidity text, keyed under [`INLINE_LABEL`].
    pub fn compile_source(&self, source: &str) -> Result<CompileOutput> {
        self.compile_labeled(INLINE_LABEL, source)
    }

    /// Compile in-memory Solidity text under an explicit source name. Error
    /// locations and the output are keyed by that name.
    pub fn compile_labeled(&self, label: &str, source: &str) -> Result<CompileOutput> {
        if source.trim().is_empty() {
            return Err(Error::InvalidSource("source text is empty".to_string()));
        }
        tracing::info!("Compiling {} bytes of inline source as {label}", source.len());
        self.run(|| Ok(SolcInput::from_source(label, source)))
    }

    /// Compile the given files in one solc run, so imports between them
    /// resolve.
    pub fn compile_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<CompileOutput> {
        if paths.is_empty() {
            return Err(Error::InvalidSource("no source files were given".to_string()));
        }
        tracing::info!("Compiling {} source file(s)", paths.len());
        self.run(|| SolcInput::from_files(paths))
    }

    /// Compile every `.sol` file found under a directory.
    pub fn compile_dir(&self, dir: &Path) -> Result<CompileOutput> {
        let files = collect_sources(dir)?;
        if files.is_empty() {
            return Err(Error::InvalidSource(format!(
                "no .sol files under {}",
                dir.display()
            )));
        }
        tracing::info!(
            "Compiling {} source file(s) from {}",
            files.len(),
            dir.display()
        );
        self.run(|| SolcInput::from_files(&files))
    }

    fn run(&self, build_input: impl Fn() -> Result<SolcInput>) -> Result<CompileOutput> {
        let start = Instant::now();

        // Reading sources and probing the version sit inside the retry
        // scope: they can hit the same transient permission failures as the
        // compile itself.
        let (version, reply) = retry_transient(&self.config.retry, self.clock.as_ref(), || {
            let version = self.resolve_version()?;
            let mut input = build_input()?;
            input.settings.optimizer = self.config.optimizer.clone();
            input.settings.evm_version = self.config.evm_version.clone();
            let reply = self.solc.compile(&input)?;
            Ok((version, reply))
        })?;

        for diagnostic in &reply.errors {
            self.sink.report(diagnostic);
        }

        let fatal: Vec<SolcDiagnostic> = reply
            .errors
            .iter()
            .filter(|diagnostic| diagnostic.is_error())
            .cloned()
            .collect();
        if !fatal.is_empty() {
            return Err(Error::Compilation {
                failures: vec![CompileFailure {
                    compiler_version: version,
                    diagnostics: fatal,
                }],
            });
        }

        let output = CompileOutput::from_raw(&reply.contracts, version);
        tracing::info!(
            "Compiled {} contract(s) across {} file(s) in {:.2}s",
            output.contract_count(),
            output.file_count(),
            start.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    /// Resolve the compiler version. A pinned requirement must be met; an
    /// unpinned probe is best-effort.
    fn resolve_version(&self) -> Result<Option<String>> {
        match &self.config.required_version {
            Some(required) => self.solc.ensure_version(required).map(Some),
            None => Ok(self.solc.version().ok()),
        }
    }
}

/// Run `operation`, pausing and retrying on transient permission failures.
/// Anything else fails immediately. `max_attempts` counts the first try.
pub(crate) fn retry_transient<T>(
    retry: &RetryConfig,
    clock: &dyn Clock,
    mut operation: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient_permission() => {
                if attempts >= retry.max_attempts {
                    return Err(Error::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                tracing::warn!(
                    "Attempt {attempts}/{} failed: {err}; retrying in {:?}",
                    retry.max_attempts,
                    retry.backoff()
                );
                clock.sleep(retry.backoff());
            }
            Err(err) => return Err(err),
        }
    }
}

/// All `.sol` files under `dir`, in path order.
fn collect_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf());
            Error::Source {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_sol = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sol"));
        if is_sol {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solc::fixtures::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    impl RecordingClock {
        fn recorded(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        reports: Mutex<Vec<(Severity, String)>>,
    }

    impl DiagnosticSink for CollectingSink {
        fn report(&self, diagnostic: &SolcDiagnostic) {
            self.reports
                .lock()
                .unwrap()
                .push((diagnostic.severity, diagnostic.display_message().to_string()));
        }
    }

    fn denied() -> Error {
        Error::Invoke {
            solc: PathBuf::from("solc"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }
    }

    #[test]
    fn retry_succeeds_on_final_attempt() {
        let clock = RecordingClock::default();
        let mut calls = 0;
        let value = retry_transient(&RetryConfig::default(), &clock, || {
            calls += 1;
            if calls < 10 {
                Err(denied())
            } else {
                Ok(calls)
            }
        })
        .unwrap();

        assert_eq!(value, 10);
        assert_eq!(clock.recorded(), vec![Duration::from_secs(1); 9]);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let clock = RecordingClock::default();
        let mut calls = 0;
        let err = retry_transient(&RetryConfig::default(), &clock, || -> Result<()> {
            calls += 1;
            Err(denied())
        })
        .unwrap_err();

        match err {
            Error::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 10);
                assert!(last.is_transient_permission());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls, 10);
        assert_eq!(clock.recorded().len(), 9);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let clock = RecordingClock::default();
        let mut calls = 0;
        let err = retry_transient(&RetryConfig::default(), &clock, || -> Result<()> {
            calls += 1;
            Err(Error::NoContracts)
        })
        .unwrap_err();

        assert!(matches!(err, Error::NoContracts));
        assert_eq!(calls, 1);
        assert!(clock.recorded().is_empty());
    }

    #[test]
    fn empty_inputs_are_rejected_up_front() {
        let compiler = Compiler::new().with_solc(Solc::at("/nonexistent/solc"));

        assert!(matches!(
            compiler.compile_source("   \n"),
            Err(Error::InvalidSource(_))
        ));

        let no_files: [&Path; 0] = [];
        assert!(matches!(
            compiler.compile_files(&no_files),
            Err(Error::InvalidSource(_))
        ));
    }

    #[test]
    fn directory_without_sources_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let compiler = Compiler::new().with_solc(Solc::at("/nonexistent/solc"));
        let err = compiler.compile_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[test]
    fn source_collection_finds_nested_sol_files() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let sources = dir.path().join("contracts");
        std::fs::create_dir_all(sources.join("nested"))?;
        std::fs::write(sources.join("simple-contract.sol"), SIMPLE_SOURCE)?;
        std::fs::write(
            sources.join("nested").join("child-contract.sol"),
            "contract ChildContract {}",
        )?;
        std::fs::write(sources.join("README.md"), "not a source")?;

        let collected = collect_sources(&sources)?;
        assert_eq!(collected.len(), 2);
        assert!(collected
            .iter()
            .all(|path| path.extension().is_some_and(|ext| ext == "sol")));
        Ok(())
    }

    #[cfg(unix)]
    fn stub_compiler(solc: PathBuf) -> Compiler {
        Compiler::new().with_solc(Solc::at(solc))
    }

    #[cfg(unix)]
    #[test]
    fn inline_source_compiles_via_stub() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let solc = stub_solc(dir.path(), &simple_standard_json(INLINE_LABEL));
        let output = stub_compiler(solc).compile_source(SIMPLE_SOURCE)?;

        assert_eq!(output.solc_version.as_deref(), Some(SIMPLE_VERSION));
        let unit = output.unit().ok_or_else(|| eyre::eyre!("expected a unit"))?;
        assert_eq!(unit.contract_name, SIMPLE_CONTRACT);
        assert_eq!(unit.abi.len(), 3);
        assert_eq!(unit.bytecode, SIMPLE_BYTECODE);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn labeled_source_keys_the_output() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let solc = stub_solc(dir.path(), &simple_standard_json("my-label.sol"));
        let output = stub_compiler(solc).compile_labeled("my-label.sol", SIMPLE_SOURCE)?;

        assert!(output.file("my-label.sol").is_some());
        assert!(output.unit().is_some());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn compile_errors_are_fatal_and_reported_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let (solc, log) = stub_solc_counting(dir.path(), &parser_error_json(INLINE_LABEL));
        let clock = Arc::new(RecordingClock::default());
        let sink = Arc::new(CollectingSink::default());
        let compiler = Compiler::new()
            .with_solc(Solc::at(solc))
            .with_clock(clock.clone())
            .with_sink(sink.clone());

        let err = compiler.compile_source("garbage").unwrap_err();
        match &err {
            Error::Compilation { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(
                    failures[0].compiler_version.as_deref(),
                    Some(SIMPLE_VERSION)
                );
                assert_eq!(failures[0].diagnostics.len(), 1);
            }
            other => panic!("expected Compilation, got {other:?}"),
        }

        // One invocation, no backoff: a compile error is not transient.
        assert_eq!(count_calls(&log), 1);
        assert!(clock.recorded().is_empty());

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Error);
        assert!(reports[0].1.contains("ParserError"));
    }

    #[cfg(unix)]
    #[test]
    fn warnings_reach_sink_without_failing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut payload: serde_json::Value =
            serde_json::from_str(&simple_standard_json(INLINE_LABEL)).unwrap();
        payload["errors"] = serde_json::json!([{
            "severity": "warning",
            "type": "Warning",
            "component": "general",
            "message": "Source file does not specify required compiler version!"
        }]);
        let solc = stub_solc(dir.path(), &payload.to_string());
        let sink = Arc::new(CollectingSink::default());
        let compiler = Compiler::new()
            .with_solc(Solc::at(solc))
            .with_sink(sink.clone());

        let output = compiler.compile_source(SIMPLE_SOURCE).unwrap();
        assert!(output.unit().is_some());

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Warning);
    }

    #[cfg(unix)]
    #[test]
    fn unexecutable_solc_exhausts_retries() {
        let dir = tempfile::TempDir::new().unwrap();
        let solc = stub_unexecutable(dir.path());
        let clock = Arc::new(RecordingClock::default());
        let compiler = Compiler::new()
            .with_solc(Solc::at(solc))
            .with_clock(clock.clone());

        let err = compiler.compile_source(SIMPLE_SOURCE).unwrap_err();
        match err {
            Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 10),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(clock.recorded(), vec![Duration::from_secs(1); 9]);
    }

    #[cfg(unix)]
    #[test]
    fn version_pin_rejects_stub_before_compiling() {
        let dir = tempfile::TempDir::new().unwrap();
        let (solc, log) = stub_solc_counting(dir.path(), &simple_standard_json(INLINE_LABEL));
        let config = CompilerConfig::builder()
            .solc(&solc)
            .required_version("^0.7".parse().unwrap())
            .build()
            .unwrap();

        let err = Compiler::with_config(config)
            .compile_source(SIMPLE_SOURCE)
            .unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
        // The compile step never ran.
        assert_eq!(count_calls(&log), 0);
    }

    #[cfg(unix)]
    #[test]
    fn spec_dispatch_handles_directories() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let sources = dir.path().join("contracts");
        std::fs::create_dir_all(&sources)?;
        let file = sources.join("simple-contract.sol");
        std::fs::write(&file, SIMPLE_SOURCE)?;

        let payload = simple_standard_json(&file.to_string_lossy());
        let compiler = stub_compiler(stub_solc(dir.path(), &payload));

        let output = compiler.compile(&SourceSpec::path(&sources))?;
        assert_eq!(output.file_count(), 1);
        assert!(output.unit().is_some());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn multi_file_output_has_no_root_shortcut() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let first = dir.path().join("simple-contract.sol");
        let second = dir.path().join("child-contract.sol");
        std::fs::write(&first, SIMPLE_SOURCE)?;
        std::fs::write(&second, "contract ChildContract {}")?;

        let payload = serde_json::json!({
            "contracts": {
                (first.to_string_lossy()): {
                    SIMPLE_CONTRACT: {
                        "abi": simple_abi_value(),
                        "evm": { "bytecode": { "object": SIMPLE_BYTECODE } }
                    }
                },
                (second.to_string_lossy()): {
                    "ChildContract": {
                        "abi": [],
                        "evm": { "bytecode": { "object": "ff" } }
                    }
                }
            }
        })
        .to_string();
        let compiler = stub_compiler(stub_solc(dir.path(), &payload));

        let output = compiler.compile_files(&[&first, &second])?;
        assert!(output.unit().is_none());
        assert_eq!(output.contract_count(), 2);
        assert_eq!(output.select(Some("ChildContract"))?.bytecode, "ff");
        Ok(())
    }

    #[test]
    #[ignore = "needs solc on PATH"]
    fn real_solc_compiles_simple_contract() {
        let output = Compiler::new().compile_source(SIMPLE_SOURCE).unwrap();
        let unit = output.unit().unwrap();
        assert_eq!(unit.contract_name, SIMPLE_CONTRACT);
        assert!(!unit.bytecode.is_empty());
        assert!(output.solc_version.is_some());
    }
}
