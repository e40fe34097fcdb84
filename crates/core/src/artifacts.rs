//! Artifact writing: embed a compiled contract into a Rust source module.
//!
//! The generated module carries two string constants, `<NAME>_ABI` and
//! `<NAME>_BYTECODE`, so downstream crates can deploy a contract without
//! shipping JSON files or invoking solc at build time.

use std::path::{Path, PathBuf};

use convert_case::{Case, Casing};
use tracing::info;

use crate::error::{Error, Result};
use crate::output::CompilationUnit;

/// Options for saving a contract's artifact module
#[derive(Debug, Clone)]
pub struct ArtifactOptions {
    /// Whether to pretty-print the embedded ABI JSON
    pub pretty_json: bool,
    /// Whether to also write the raw ABI next to the module as
    /// `<contract>.abi.json`
    pub emit_abi_json: bool,
}

impl Default for ArtifactOptions {
    fn default() -> Self {
        Self {
            pretty_json: true,
            emit_abi_json: false,
        }
    }
}

/// Paths written by [`save_artifacts`]
#[derive(Debug, Clone)]
pub struct SavedArtifacts {
    /// Path to the generated Rust module
    pub module: PathBuf,
    /// Path to the raw ABI JSON file, when requested
    pub abi_json: Option<PathBuf>,
}

/// Saves the artifact module for one compiled contract.
///
/// `target` may be a directory, in which case the module lands there under
/// [`default_module_name`], or an explicit file path. Missing parent
/// directories are created.
pub fn save_artifacts(
    unit: &CompilationUnit,
    target: &Path,
    options: &ArtifactOptions,
) -> Result<SavedArtifacts> {
    let module_path = resolve_module_path(unit, target);

    if let Some(parent) = module_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Artifact {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let rendered = render_module(unit, options.pretty_json)?;
    std::fs::write(&module_path, rendered).map_err(|source| Error::Artifact {
        path: module_path.clone(),
        source,
    })?;
    info!("Saved artifact module to: {}", module_path.display());

    let mut saved = SavedArtifacts {
        module: module_path,
        abi_json: None,
    };

    if options.emit_abi_json {
        let abi_path = saved.module.with_file_name(format!(
            "{}.abi.json",
            unit.contract_name.to_case(Case::Snake)
        ));
        let abi = if options.pretty_json {
            serde_json::to_string_pretty(&unit.abi)?
        } else {
            serde_json::to_string(&unit.abi)?
        };
        std::fs::write(&abi_path, abi).map_err(|source| Error::Artifact {
            path: abi_path.clone(),
            source,
        })?;
        info!("Saved ABI to: {}", abi_path.display());
        saved.abi_json = Some(abi_path);
    }

    Ok(saved)
}

/// File name used when the save target is a directory, e.g.
/// `simple_contract_artifacts.rs` for `SimpleContract`.
pub fn default_module_name(contract_name: &str) -> String {
    format!("{}_artifacts.rs", contract_name.to_case(Case::Snake))
}

/// Render the module source: a doc header plus the two constants.
pub fn render_module(unit: &CompilationUnit, pretty_json: bool) -> Result<String> {
    let prefix = unit.contract_name.to_case(Case::Snake).to_ascii_uppercase();
    let abi = if pretty_json {
        serde_json::to_string_pretty(&unit.abi)?
    } else {
        serde_json::to_string(&unit.abi)?
    };

    Ok(format!(
        "//! Compilation artifacts for `{name}`. Generated by solcraft; do not edit.\n\
         \n\
         /// JSON ABI of `{name}`.\n\
         pub const {prefix}_ABI: &str = r#\"{abi}\"#;\n\
         \n\
         /// Creation bytecode of `{name}` as unprefixed hex.\n\
         pub const {prefix}_BYTECODE: &str = \"{bytecode}\";\n",
        name = unit.contract_name,
        bytecode = unit.bytecode,
    ))
}

fn resolve_module_path(unit: &CompilationUnit, target: &Path) -> PathBuf {
    let names_a_directory = target.is_dir() || target.to_string_lossy().ends_with(['/', '\\']);
    if names_a_directory {
        target.join(default_module_name(&unit.contract_name))
    } else {
        target.to_path_buf()
    }
}
