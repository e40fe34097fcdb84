//! Caller-facing description of what to compile.
//!
//! Whether a string is inline Solidity or a path on disk is decided exactly
//! once, here at the boundary; the rest of the pipeline only ever sees the
//! tagged [`SourceSpec`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Source-unit name used for inline code compiled through [`SourceSpec`].
pub const INLINE_LABEL: &str = "source.sol";

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceKind {
    /// Solidity source held in memory.
    #[serde(rename = "inline")]
    Inline { source: String },
    /// A single file on disk.
    #[serde(rename = "path")]
    Path { path: PathBuf },
    /// Several files compiled together; imports resolve between them.
    #[serde(rename = "paths")]
    Paths { paths: Vec<PathBuf> },
}

/// A compile request: the source plus an optional target contract used to
/// disambiguate multi-contract output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
}

impl SourceSpec {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Inline {
                source: source.into(),
            },
            contract_name: None,
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Path { path: path.into() },
            contract_name: None,
        }
    }

    pub fn paths(paths: Vec<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Paths { paths },
            contract_name: None,
        }
    }

    /// Tag the request with the contract to resolve after compilation.
    pub fn contract(mut self, name: impl Into<String>) -> Self {
        self.contract_name = Some(name.into());
        self
    }

    /// Classify one input string: a path when it clearly looks like one,
    /// inline source otherwise. Empty input is rejected before the compiler
    /// is ever involved.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(Error::InvalidSource(
                "neither source text nor a path was given".into(),
            ));
        }
        if looks_like_path(input) {
            Ok(Self::path(input.trim()))
        } else {
            Ok(Self::inline(input))
        }
    }
}

/// Conservative path detector: single-line strings that are rooted (`/`,
/// `./`, `../`, `~/`), carry a Windows drive prefix, or are a
/// whitespace-free token ending in `.sol`. Anything else is treated as
/// source text and left for the compiler to judge.
pub fn looks_like_path(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.contains('\n') {
        return false;
    }
    if trimmed.starts_with('/')
        || trimmed.starts_with("./")
        || trimmed.starts_with("../")
        || trimmed.starts_with("~/")
    {
        return true;
    }
    if has_drive_prefix(trimmed) {
        return true;
    }
    !trimmed.contains(char::is_whitespace) && trimmed.to_ascii_lowercase().ends_with(".sol")
}

fn has_drive_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(drive), Some(':'), Some('/' | '\\')) if drive.is_ascii_alphabetic()
    )
}
