//! High-level entry point: one contract, compiled and picked out.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifacts::{save_artifacts, ArtifactOptions, SavedArtifacts};
use crate::compiler::Compiler;
use crate::error::Result;
use crate::output::{CompilationUnit, CompileOutput};
use crate::source::SourceSpec;

/// A single contract resolved out of a compilation, with the full output
/// kept alongside for anything else the run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledContract {
    unit: CompilationUnit,
    output: CompileOutput,
}

impl CompiledContract {
    /// Compile `input` with a default [`Compiler`]. The input may be inline
    /// Solidity text or a path, telling the two apart the way
    /// [`SourceSpec::parse`] does.
    pub fn from_source(input: &str) -> Result<Self> {
        Self::from_spec(&SourceSpec::parse(input)?)
    }

    /// Compile a spec with a default [`Compiler`].
    pub fn from_spec(spec: &SourceSpec) -> Result<Self> {
        Self::compile_with(&Compiler::new(), spec)
    }

    /// Compile with an explicit compiler, then resolve the contract `spec`
    /// names. Without a name the output must be unambiguous.
    pub fn compile_with(compiler: &Compiler, spec: &SourceSpec) -> Result<Self> {
        let output = compiler.compile(spec)?;
        Self::from_output(output, spec.contract_name.as_deref())
    }

    /// Resolve a contract out of an existing compilation.
    pub fn from_output(output: CompileOutput, contract_name: Option<&str>) -> Result<Self> {
        let unit = output.select(contract_name)?.clone();
        Ok(Self { unit, output })
    }

    pub fn name(&self) -> &str {
        &self.unit.contract_name
    }

    pub fn abi(&self) -> &[Value] {
        &self.unit.abi
    }

    /// The ABI as one JSON array value.
    pub fn abi_json(&self) -> Value {
        self.unit.abi_json()
    }

    /// Creation bytecode as unprefixed hex.
    pub fn bytecode(&self) -> &str {
        &self.unit.bytecode
    }

    pub fn bytecode_bytes(&self) -> Result<Vec<u8>> {
        self.unit.bytecode_bytes()
    }

    pub fn unit(&self) -> &CompilationUnit {
        &self.unit
    }

    /// The whole compilation this contract came from.
    pub fn output(&self) -> &CompileOutput {
        &self.output
    }

    pub fn solc_version(&self) -> Option<&str> {
        self.output.solc_version.as_deref()
    }

    /// Write the artifact module for this contract with default options.
    pub fn save_artifacts(&self, target: &Path) -> Result<SavedArtifacts> {
        save_artifacts(&self.unit, target, &ArtifactOptions::default())
    }

    /// Write the artifact module with explicit options.
    pub fn save_artifacts_with(
        &self,
        target: &Path,
        options: &ArtifactOptions,
    ) -> Result<SavedArtifacts> {
        save_artifacts(&self.unit, target, options)
    }
}

#[cfg(feature = "ethers")]
mod eth {
    //! Bridge into the ethers stack: typed ABI, deployment factory, and a
    //! one-call deploy.

    use std::sync::Arc;

    use ethers::abi::{Abi, Tokenize};
    use ethers::contract::{Contract, ContractFactory};
    use ethers::providers::Middleware;
    use ethers::types::Bytes;

    use super::CompiledContract;
    use crate::error::{Error, Result};
    use crate::output::CompilationUnit;

    impl CompilationUnit {
        /// The ABI parsed into ethers' typed representation.
        pub fn ethers_abi(&self) -> Result<Abi> {
            Ok(serde_json::from_value(self.abi_json())?)
        }

        /// Creation bytecode as an ethers byte blob.
        pub fn ethers_bytecode(&self) -> Result<Bytes> {
            Ok(Bytes::from(self.bytecode_bytes()?))
        }

        /// Deployment factory bound to `client`.
        pub fn factory<M: Middleware>(&self, client: Arc<M>) -> Result<ContractFactory<M>> {
            Ok(ContractFactory::new(
                self.ethers_abi()?,
                self.ethers_bytecode()?,
                client,
            ))
        }
    }

    impl CompiledContract {
        /// Deployment factory bound to `client`.
        pub fn factory<M: Middleware>(&self, client: Arc<M>) -> Result<ContractFactory<M>> {
            self.unit().factory(client)
        }

        /// Deploy through `client` with the given constructor arguments and
        /// wait for the address.
        pub async fn deploy<M, T>(&self, client: Arc<M>, args: T) -> Result<Contract<M>>
        where
            M: Middleware + 'static,
            T: Tokenize,
        {
            let deployer = self
                .factory(client)?
                .deploy(args)
                .map_err(|e| Error::Deploy(e.to_string()))?;
            deployer
                .send()
                .await
                .map_err(|e| Error::Deploy(e.to_string()))
        }
    }
}
