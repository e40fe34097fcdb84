//! Scaffolded view over solc's nested per-file, per-contract output.
//!
//! solc reports `file → contract → {abi, bytecode}`. A caller that compiled
//! a single contract should not need to know either key, so on top of the
//! intact nested mapping the scaffold carries shortcut units wherever they
//! are unambiguous: per file when the file holds exactly one contract, and
//! on the whole output when exactly one file was produced. Shortcuts are
//! never guessed; an ambiguous layer simply has none and reads as missing.
//!
//! The scaffold is built bottom-up in one pass and immutable afterwards.
//! Building it twice from the same raw mapping yields structurally equal
//! values, and re-scaffolding the nested layer of an existing output
//! reproduces it unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::solc::{RawContracts, SolcContract};

/// One contract's compiled interface and code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Contract name as declared in the source.
    pub contract_name: String,
    /// JSON ABI entries (constructor, functions, events).
    pub abi: Vec<Value>,
    /// Creation bytecode as an unprefixed lowercase hex string.
    pub bytecode: String,
}

impl CompilationUnit {
    fn from_solc(contract_name: &str, contract: &SolcContract) -> Self {
        Self {
            contract_name: contract_name.to_string(),
            abi: contract.abi.clone(),
            bytecode: contract.evm.bytecode.object.clone(),
        }
    }

    /// The ABI as one JSON array value.
    pub fn abi_json(&self) -> Value {
        Value::Array(self.abi.clone())
    }

    /// Creation bytecode decoded from hex. A leading `0x` is tolerated.
    pub fn bytecode_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(self.bytecode.trim_start_matches("0x")).map_err(|source| Error::Bytecode {
            contract: self.contract_name.clone(),
            source,
        })
    }

    /// 4-byte selector per external function, keyed by canonical signature.
    pub fn function_selectors(&self) -> BTreeMap<String, String> {
        use sha3::{Digest, Keccak256};

        let mut selectors = BTreeMap::new();
        for entry in &self.abi {
            if entry.get("type").and_then(Value::as_str) != Some("function") {
                continue;
            }
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let inputs = entry
                .get("inputs")
                .and_then(Value::as_array)
                .map(|inputs| {
                    inputs
                        .iter()
                        .filter_map(|input| input.get("type").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            let signature = format!("{name}({inputs})");
            let hash = Keccak256::digest(signature.as_bytes());
            selectors.insert(signature, format!("0x{}", hex::encode(&hash[..4])));
        }
        selectors
    }
}

/// Every contract found in one source file, plus the shortcut unit when the
/// file is unambiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    /// All contracts in the file, keyed by contract name.
    pub contracts: BTreeMap<String, CompilationUnit>,
    /// Set iff the file holds exactly one contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<CompilationUnit>,
}

impl FileOutput {
    fn scaffold(contracts: BTreeMap<String, CompilationUnit>) -> Self {
        let unit = if contracts.len() == 1 {
            contracts.values().next().cloned()
        } else {
            None
        };
        Self { contracts, unit }
    }

    /// Fully-qualified lookup by contract name.
    pub fn contract(&self, name: &str) -> Option<&CompilationUnit> {
        self.contracts.get(name)
    }

    /// Shortcut unit; absent when the file holds zero or several contracts.
    pub fn unit(&self) -> Option<&CompilationUnit> {
        self.unit.as_ref()
    }

    pub fn abi(&self) -> Option<&[Value]> {
        self.unit().map(|unit| unit.abi.as_slice())
    }

    pub fn bytecode(&self) -> Option<&str> {
        self.unit().map(|unit| unit.bytecode.as_str())
    }
}

/// Scaffolded compilation result: the full nested mapping plus unambiguous
/// shortcuts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
    /// Per-file output, keyed by source name, iterated in lexicographic
    /// order.
    pub files: BTreeMap<String, FileOutput>,
    /// Set iff the compilation produced exactly one file holding exactly
    /// one contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<CompilationUnit>,
    /// Version of the compiler that produced this output, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solc_version: Option<String>,
}

impl CompileOutput {
    /// Scaffold solc's raw mapping. The nested entries are carried over
    /// untouched; shortcuts are only added where unambiguous.
    pub fn from_raw(raw: &RawContracts, solc_version: Option<String>) -> Self {
        let files = raw
            .iter()
            .map(|(file, contracts)| {
                let units = contracts
                    .iter()
                    .map(|(name, contract)| {
                        (name.clone(), CompilationUnit::from_solc(name, contract))
                    })
                    .collect();
                (file.clone(), units)
            })
            .collect();
        Self::from_units(files, solc_version)
    }

    /// Scaffold prebuilt units. Purely structural: the same input always
    /// produces the same output, so feeding an output's own nested layer
    /// back in is a no-op.
    pub fn from_units(
        files: BTreeMap<String, BTreeMap<String, CompilationUnit>>,
        solc_version: Option<String>,
    ) -> Self {
        let files: BTreeMap<String, FileOutput> = files
            .into_iter()
            .map(|(file, contracts)| (file, FileOutput::scaffold(contracts)))
            .collect();
        let unit = if files.len() == 1 {
            files.values().next().and_then(|file| file.unit.clone())
        } else {
            None
        };
        Self {
            files,
            unit,
            solc_version,
        }
    }

    /// Root shortcut unit; absent unless the whole compilation is a single
    /// file with a single contract.
    pub fn unit(&self) -> Option<&CompilationUnit> {
        self.unit.as_ref()
    }

    pub fn abi(&self) -> Option<&[Value]> {
        self.unit().map(|unit| unit.abi.as_slice())
    }

    pub fn bytecode(&self) -> Option<&str> {
        self.unit().map(|unit| unit.bytecode.as_str())
    }

    pub fn file(&self, file: &str) -> Option<&FileOutput> {
        self.files.get(file)
    }

    /// Fully-qualified lookup, always available.
    pub fn contract(&self, file: &str, name: &str) -> Option<&CompilationUnit> {
        self.files.get(file).and_then(|output| output.contract(name))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn contract_count(&self) -> usize {
        self.files.values().map(|file| file.contracts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.contract_count() == 0
    }

    /// Every unit with the file it came from, in file key order.
    pub fn units(&self) -> impl Iterator<Item = (&str, &CompilationUnit)> {
        self.files.iter().flat_map(|(file, output)| {
            output
                .contracts
                .values()
                .map(move |unit| (file.as_str(), unit))
        })
    }

    /// First file (in key order) declaring `name`.
    pub fn find_contract(&self, name: &str) -> Option<&CompilationUnit> {
        self.files.values().find_map(|file| file.contract(name))
    }

    /// Resolve the unit a caller means: an explicit name is searched across
    /// all files, no name requires the root shortcut; anything else refuses
    /// to guess.
    pub fn select(&self, contract_name: Option<&str>) -> Result<&CompilationUnit> {
        match contract_name {
            Some(name) => self
                .find_contract(name)
                .ok_or_else(|| Error::ContractNotFound(name.to_string())),
            None => {
                if let Some(unit) = self.unit() {
                    return Ok(unit);
                }
                if self.is_empty() {
                    return Err(Error::NoContracts);
                }
                Err(Error::AmbiguousContract {
                    files: self.file_count(),
                    contracts: self.contract_count(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solc::fixtures::{
        simple_abi_value, SIMPLE_ABI, SIMPLE_BYTECODE, SIMPLE_CONTRACT, SIMPLE_FILE,
    };
    use serde_json::json;

    fn raw_unit(abi: Value, bytecode: &str) -> SolcContract {
        serde_json::from_value(json!({
            "abi": abi,
            "evm": { "bytecode": { "object": bytecode } }
        }))
        .unwrap()
    }

    fn simple_raw() -> RawContracts {
        let mut contracts = BTreeMap::new();
        contracts.insert(
            SIMPLE_CONTRACT.to_string(),
            raw_unit(serde_json::from_str(SIMPLE_ABI).unwrap(), SIMPLE_BYTECODE),
        );
        let mut raw = BTreeMap::new();
        raw.insert(SIMPLE_FILE.to_string(), contracts);
        raw
    }

    fn two_file_raw() -> RawContracts {
        let mut raw = simple_raw();
        let mut contracts = BTreeMap::new();
        contracts.insert(
            "ChildContract".to_string(),
            raw_unit(json!([{ "type": "constructor", "inputs": [] }]), "ff"),
        );
        raw.insert("child-contract.sol".to_string(), contracts);
        raw
    }

    #[test]
    fn single_contract_gets_every_shortcut() {
        let output = CompileOutput::from_raw(&simple_raw(), Some("0.8.22".into()));

        let qualified = output.contract(SIMPLE_FILE, SIMPLE_CONTRACT).unwrap();
        let per_file = output.file(SIMPLE_FILE).unwrap().unit().unwrap();
        let root = output.unit().unwrap();

        assert_eq!(qualified, per_file);
        assert_eq!(qualified, root);
        assert_eq!(output.abi().unwrap().len(), 3);
        assert_eq!(output.bytecode(), Some(SIMPLE_BYTECODE));
        assert!(output
            .bytecode()
            .unwrap()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn two_files_have_no_root_shortcut() {
        let output = CompileOutput::from_raw(&two_file_raw(), None);

        assert!(output.unit().is_none());
        assert!(output.abi().is_none());
        assert!(output.bytecode().is_none());
        // Per-file shortcuts survive, and the qualified paths always work.
        assert!(output.file(SIMPLE_FILE).unwrap().unit().is_some());
        assert!(output
            .contract("child-contract.sol", "ChildContract")
            .is_some());
    }

    #[test]
    fn two_contracts_in_one_file_have_no_shortcuts() {
        let mut contracts = BTreeMap::new();
        contracts.insert("A".to_string(), raw_unit(json!([]), "aa"));
        contracts.insert("B".to_string(), raw_unit(json!([]), "bb"));
        let mut raw = BTreeMap::new();
        raw.insert("pair.sol".to_string(), contracts);

        let output = CompileOutput::from_raw(&raw, None);
        assert!(output.file("pair.sol").unwrap().unit().is_none());
        assert!(output.unit().is_none());
        assert_eq!(output.contract("pair.sol", "A").unwrap().bytecode, "aa");
        assert_eq!(output.contract("pair.sol", "B").unwrap().bytecode, "bb");
    }

    #[test]
    fn zero_contract_file_reads_as_missing_everywhere() {
        let mut raw = RawContracts::new();
        raw.insert("empty.sol".to_string(), BTreeMap::new());

        let output = CompileOutput::from_raw(&raw, None);
        assert_eq!(output.file_count(), 1);
        assert!(output.is_empty());
        assert!(output.file("empty.sol").unwrap().unit().is_none());
        assert!(output.unit().is_none());
        assert!(output.file("empty.sol").unwrap().contracts.is_empty());
    }

    #[test]
    fn scaffolding_is_deterministic() {
        let raw = two_file_raw();
        assert_eq!(
            CompileOutput::from_raw(&raw, Some("0.8.22".into())),
            CompileOutput::from_raw(&raw, Some("0.8.22".into()))
        );
    }

    #[test]
    fn rescaffolding_nested_entries_is_stable() {
        let output = CompileOutput::from_raw(&two_file_raw(), Some("0.8.22".into()));

        let nested: BTreeMap<String, BTreeMap<String, CompilationUnit>> = output
            .files
            .iter()
            .map(|(file, file_output)| (file.clone(), file_output.contracts.clone()))
            .collect();
        let again = CompileOutput::from_units(nested, output.solc_version.clone());

        assert_eq!(again, output);
    }

    #[test]
    fn find_contract_first_file_wins() {
        let mut raw = RawContracts::new();
        for file in ["a.sol", "b.sol"] {
            let mut contracts = BTreeMap::new();
            contracts.insert(
                "Token".to_string(),
                raw_unit(json!([]), if file == "a.sol" { "aa" } else { "bb" }),
            );
            raw.insert(file.to_string(), contracts);
        }

        let output = CompileOutput::from_raw(&raw, None);
        assert_eq!(output.find_contract("Token").unwrap().bytecode, "aa");
    }

    #[test]
    fn select_by_name_searches_all_files() {
        let output = CompileOutput::from_raw(&two_file_raw(), None);
        let unit = output.select(Some("ChildContract")).unwrap();
        assert_eq!(unit.contract_name, "ChildContract");

        match output.select(Some("Missing")) {
            Err(Error::ContractNotFound(name)) => assert_eq!(name, "Missing"),
            other => panic!("expected ContractNotFound, got {other:?}"),
        }
    }

    #[test]
    fn select_without_name_needs_the_shortcut() {
        let unambiguous = CompileOutput::from_raw(&simple_raw(), None);
        assert_eq!(
            unambiguous.select(None).unwrap().contract_name,
            SIMPLE_CONTRACT
        );

        let ambiguous = CompileOutput::from_raw(&two_file_raw(), None);
        match ambiguous.select(None) {
            Err(Error::AmbiguousContract { files, contracts }) => {
                assert_eq!(files, 2);
                assert_eq!(contracts, 2);
            }
            other => panic!("expected AmbiguousContract, got {other:?}"),
        }

        let empty = CompileOutput::from_raw(&RawContracts::new(), None);
        assert!(matches!(empty.select(None), Err(Error::NoContracts)));
    }

    #[test]
    fn units_iterate_in_file_key_order() {
        let output = CompileOutput::from_raw(&two_file_raw(), None);
        let names: Vec<&str> = output
            .units()
            .map(|(_, unit)| unit.contract_name.as_str())
            .collect();
        // "child-contract.sol" sorts before "simple-contract.sol".
        assert_eq!(names, vec!["ChildContract", SIMPLE_CONTRACT]);
    }

    #[test]
    fn selectors_match_deployed_dispatch_table() {
        let output = CompileOutput::from_raw(&simple_raw(), None);
        let selectors = output.unit().unwrap().function_selectors();

        // The same selectors are visible in the fixture bytecode's dispatch
        // comparisons (80 63 23fd0e40 14 … 63 6ffd773c 14).
        assert_eq!(selectors["myNumber()"], "0x23fd0e40");
        assert_eq!(selectors["setMyNumber(uint256)"], "0x6ffd773c");
        assert_eq!(selectors.len(), 2);
    }

    #[test]
    fn bytecode_decodes_and_rejects_bad_hex() {
        let unit = CompilationUnit {
            contract_name: "A".into(),
            abi: vec![],
            bytecode: "0x60806040".into(),
        };
        assert_eq!(unit.bytecode_bytes().unwrap(), vec![0x60, 0x80, 0x60, 0x40]);

        let bad = CompilationUnit {
            contract_name: "A".into(),
            abi: vec![],
            bytecode: "zz".into(),
        };
        match bad.bytecode_bytes() {
            Err(Error::Bytecode { contract, .. }) => assert_eq!(contract, "A"),
            other => panic!("expected Bytecode error, got {other:?}"),
        }
    }

    #[test]
    fn abi_json_wraps_entries() {
        let output = CompileOutput::from_raw(&simple_raw(), None);
        assert_eq!(output.unit().unwrap().abi_json(), simple_abi_value());
    }
}
