//! The list of compliance programs to run and the signatures they are checked
//! against.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

/// Root of the RISC-V architectural test suite, relative to the working
/// directory.
pub const SUITE_ROOT: &str = "riscv_test_suite";

/// `(name, enabled)` of every program in the built-in suite.
const RISCV_ARCH_TESTS: &[(&str, bool)] = &[
    ("add-01", true),
    ("addi-01", true),
    ("and-01", true),
    ("andi-01", true),
    ("auipc-01", true),
    ("beq-01", true),
    ("bge-01", true),
    ("bgeu-01", true),
    ("blt-01", true),
    ("bltu-01", true),
    ("bne-01", true),
    ("ebreak", true),
    ("ecall", true),
    ("fence-01", true),
    ("jal-01", true),
    ("jalr-01", true),
    ("lb-align-01", true),
    ("lbu-align-01", true),
    ("lh-align-01", true),
    ("lhu-align-01", true),
    ("lui-01", true),
    ("lw-align-01", true),
    ("misalign-beq-01", true),
    ("misalign-bge-01", true),
    ("misalign-bgeu-01", true),
    ("misalign-blt-01", true),
    ("misalign-bltu-01", true),
    ("misalign-bne-01", true),
    ("misalign-jal-01", true),
    ("misalign-lh-01", true),
    ("misalign-lhu-01", true),
    ("misalign-lw-01", true),
    ("misalign-sh-01", true),
    ("misalign-sw-01", true),
    ("misalign1-jalr-01", true),
    ("misalign2-jalr-01", true),
    ("mul-01", true),
    ("mulh-01", true),
    ("mulhu-01", true),
    ("mulhsu-01", true),
    ("or-01", true),
    ("ori-01", true),
    ("sb-align-01", true),
    ("sh-align-01", true),
    ("sll-01", true),
    ("slli-01", true),
    ("slt-01", true),
    ("slti-01", true),
    ("sltiu-01", true),
    ("sltu-01", true),
    ("sra-01", true),
    ("srai-01", true),
    ("srl-01", true),
    ("srli-01", true),
    ("sub-01", true),
    ("sw-align-01", true),
    ("xor-01", true),
    ("xori-01", true),
];

/// Programs whose signature is known to differ: the core traps on misaligned
/// branch and jump targets where the reference model does not.
const RISCV_EXPECTED_TO_FAIL: &[&str] = &[
    "misalign-beq-01",
    "misalign-bge-01",
    "misalign-bgeu-01",
    "misalign-blt-01",
    "misalign-bltu-01",
    "misalign-bne-01",
    "misalign-jal-01",
    "misalign2-jalr-01",
];

fn default_enabled() -> bool {
    true
}

/// A single compliance program, identified by its program path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    /// Memory image handed to the simulator.
    pub program: PathBuf,
    /// Golden signature the dump is compared against.
    pub reference: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TestCase {
    pub fn new(program: impl Into<PathBuf>, reference: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            program: program.into(),
            reference: reference.into(),
            enabled,
        }
    }
}

/// On-disk form of a catalog.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    tests: Vec<TestCase>,
    #[serde(default)]
    expected_to_fail: Vec<PathBuf>,
}

/// Ordered, read-only set of test cases plus the programs whose mismatch is
/// accepted.
#[derive(Debug, Clone)]
pub struct Catalog {
    cases: Vec<TestCase>,
    expected_to_fail: BTreeSet<PathBuf>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate program paths.
    pub fn new(
        cases: Vec<TestCase>,
        expected_to_fail: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Self> {
        {
            let mut seen = BTreeSet::new();
            for case in &cases {
                anyhow::ensure!(
                    seen.insert(case.program.as_path()),
                    "duplicate test program `{}` in catalog",
                    case.program.display()
                );
            }
        }
        Ok(Self {
            cases,
            expected_to_fail: expected_to_fail.into_iter().collect(),
        })
    }

    /// The RISC-V architectural tests shipped with the core.
    pub fn builtin() -> Self {
        let root = Path::new(SUITE_ROOT);
        let program = |name: &str| root.join("test_programs").join(format!("{name}.mem"));
        let cases = RISCV_ARCH_TESTS
            .iter()
            .map(|&(name, enabled)| TestCase {
                program: program(name),
                reference: root.join("signatures").join(format!("{name}.signature")),
                enabled,
            })
            .collect();
        Self {
            cases,
            expected_to_fail: RISCV_EXPECTED_TO_FAIL.iter().map(|name| program(name)).collect(),
        }
    }

    /// Load a catalog from a JSON file.
    ///
    /// ```json
    /// {
    ///   "tests": [{ "program": "a.mem", "reference": "a.signature", "enabled": true }],
    ///   "expected_to_fail": ["a.mem"]
    /// }
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read catalog `{}`", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("invalid catalog `{}`", path.display()))?;
        Self::new(file.tests, file.expected_to_fail)
    }

    /// Keep only the cases whose program path matches `pattern`.
    pub fn filter(&self, pattern: &Regex) -> Self {
        Self {
            cases: self
                .cases
                .iter()
                .filter(|case| pattern.is_match(&case.program.to_string_lossy()))
                .cloned()
                .collect(),
            expected_to_fail: self.expected_to_fail.clone(),
        }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Whether a signature mismatch of `program` is an accepted outcome.
    pub fn is_expected_failure(&self, program: &Path) -> bool {
        self.expected_to_fail.contains(program)
    }
}
