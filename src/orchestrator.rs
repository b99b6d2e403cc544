//! Walks the catalog, runs the simulator on every enabled program and scores
//! the resulting dumps.
//!
//! Each case ends in exactly one of these states:
//!
//! - program missing: not scored, counted as missing;
//! - skipped: the case is disabled, the simulator is not run;
//! - reference missing: the simulator ran but there is nothing to compare
//!   against, not scored, counted as missing;
//! - dump missing: the simulator produced no dump, scored as a failure;
//! - compared: the dump was checked against the reference. A mismatch of a
//!   program listed as expected-to-fail is scored as a pass.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use serde::Serialize;

use crate::{
    catalog::{Catalog, TestCase},
    compare::{compare_dump, Comparison, HexValue},
    driver::{dump_path, Driver, RunStatus},
    report::Reporter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Skip,
    Fail,
}

/// Why a case failed, or for an expected failure, how it mismatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    Mismatch {
        line: usize,
        reference: HexValue,
        dut: HexValue,
    },
    DumpMissing {
        dump: PathBuf,
    },
    /// The dump or the reference could not be read or parsed.
    BadData {
        message: String,
    },
    TimedOut {
        after: Duration,
    },
    ExitStatus {
        code: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub program: PathBuf,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    /// The mismatch was accepted because the program is expected to fail.
    pub expected_failure: bool,
}

impl ExecutionResult {
    fn pass(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            outcome: Outcome::Pass,
            detail: None,
            expected_failure: false,
        }
    }

    fn skip(program: &Path) -> Self {
        Self {
            outcome: Outcome::Skip,
            ..Self::pass(program)
        }
    }

    fn fail(program: &Path, detail: Detail) -> Self {
        Self {
            outcome: Outcome::Fail,
            detail: Some(detail),
            ..Self::pass(program)
        }
    }
}

/// Terminal state of a single case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseState {
    ProgramMissing,
    ReferenceMissing,
    Scored(ExecutionResult),
}

/// Counters of a run. Cases whose inputs are missing only count as `missing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub missing: usize,
    /// Size of the catalog.
    pub total: usize,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Skip => self.skipped += 1,
            Outcome::Fail => self.failed += 1,
        }
    }

    /// Every catalog entry passed, missing and skipped ones included.
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: Vec<ExecutionResult>,
}

#[derive(Debug, Default, Clone)]
pub struct RunOption {
    check_exit_status: bool,
}

impl RunOption {
    /// Fail cases whose simulator exited unsuccessfully even if the dump
    /// matches.
    pub fn set_check_exit_status(mut self, check: bool) -> Self {
        self.check_exit_status = check;
        self
    }
}

pub struct Orchestrator<'a, D, R> {
    catalog: &'a Catalog,
    driver: D,
    reporter: R,
    dump_dir: PathBuf,
    option: RunOption,
}

impl<'a, D: Driver, R: Reporter> Orchestrator<'a, D, R> {
    pub fn new(catalog: &'a Catalog, driver: D, reporter: R, dump_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            driver,
            reporter,
            dump_dir: dump_dir.into(),
            option: RunOption::default(),
        }
    }

    pub fn set_option(mut self, option: RunOption) -> Self {
        self.option = option;
        self
    }

    pub fn into_parts(self) -> (D, R) {
        (self.driver, self.reporter)
    }

    /// Process every case in catalog order, then report the summary.
    pub fn run(&mut self) -> Result<RunReport> {
        let catalog = self.catalog;
        let mut summary = RunSummary::new(catalog.len());
        let mut results = Vec::new();

        for case in catalog.cases() {
            match self.run_case(case)? {
                CaseState::ProgramMissing => {
                    summary.missing += 1;
                    self.reporter.missing(&case.program)?;
                }
                CaseState::ReferenceMissing => {
                    summary.missing += 1;
                    self.reporter.missing(&case.reference)?;
                }
                CaseState::Scored(result) => {
                    summary.record(result.outcome);
                    self.reporter.case(&result)?;
                    results.push(result);
                }
            }
        }

        tracing::info!("run finished: {:?}", summary);
        self.reporter.summary(&summary)?;
        Ok(RunReport { summary, results })
    }

    pub fn run_case(&mut self, case: &TestCase) -> Result<CaseState> {
        let program = case.program.as_path();
        if !program.is_file() {
            tracing::warn!("program not found: {}", program.display());
            return Ok(CaseState::ProgramMissing);
        }
        if !case.enabled {
            return Ok(CaseState::Scored(ExecutionResult::skip(program)));
        }

        let status = self.driver.run(program, &self.dump_dir)?;

        if !case.reference.is_file() {
            tracing::warn!("reference not found: {}", case.reference.display());
            return Ok(CaseState::ReferenceMissing);
        }
        if let RunStatus::TimedOut(after) = status {
            return Ok(CaseState::Scored(ExecutionResult::fail(
                program,
                Detail::TimedOut { after },
            )));
        }
        let dump = dump_path(&self.dump_dir, program);
        if !dump.is_file() {
            return Ok(CaseState::Scored(ExecutionResult::fail(
                program,
                Detail::DumpMissing { dump },
            )));
        }

        let mut result = match compare_dump(&case.reference, &dump) {
            Ok(Comparison::Match) => ExecutionResult::pass(program),
            Ok(Comparison::Mismatch {
                line,
                reference,
                dut,
            }) => {
                let detail = Detail::Mismatch {
                    line,
                    reference,
                    dut,
                };
                if self.catalog.is_expected_failure(program) {
                    tracing::info!("{}: accepted known mismatch at line {line}", program.display());
                    ExecutionResult {
                        detail: Some(detail),
                        expected_failure: true,
                        ..ExecutionResult::pass(program)
                    }
                } else {
                    ExecutionResult::fail(program, detail)
                }
            }
            Err(err) => {
                tracing::error!("{}: {err}", program.display());
                ExecutionResult::fail(
                    program,
                    Detail::BadData {
                        message: err.to_string(),
                    },
                )
            }
        };

        if self.option.check_exit_status && result.outcome == Outcome::Pass && !status.success() {
            if let RunStatus::Exited { code } = status {
                result = ExecutionResult::fail(program, Detail::ExitStatus { code });
            }
        }
        Ok(CaseState::Scored(result))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::report::Console;

    /// Writes canned dumps instead of running a simulator.
    struct FakeDriver {
        dumps: HashMap<PathBuf, String>,
        status: RunStatus,
        runs: Vec<PathBuf>,
    }

    impl FakeDriver {
        fn new() -> Self {
            Self {
                dumps: HashMap::new(),
                status: RunStatus::Exited { code: Some(0) },
                runs: Vec::new(),
            }
        }

        fn dump(mut self, program: &Path, content: &str) -> Self {
            self.dumps.insert(program.to_path_buf(), content.into());
            self
        }
    }

    impl Driver for FakeDriver {
        fn run(&mut self, program: &Path, dump_dir: &Path) -> Result<RunStatus> {
            self.runs.push(program.to_path_buf());
            if let Some(content) = self.dumps.get(program) {
                std::fs::write(dump_path(dump_dir, program), content)?;
            }
            Ok(self.status)
        }
    }

    /// A scratch suite with programs under `progs/` and signatures under
    /// `sigs/`.
    struct Suite {
        dir: tempfile::TempDir,
    }

    impl Suite {
        fn new() -> Result<Self> {
            let dir = tempfile::tempdir()?;
            for sub in ["progs", "sigs", "out"] {
                std::fs::create_dir(dir.path().join(sub))?;
            }
            Ok(Self { dir })
        }

        fn program(&self, name: &str) -> PathBuf {
            self.dir.path().join("progs").join(format!("{name}.mem"))
        }

        fn signature(&self, name: &str) -> PathBuf {
            self.dir.path().join("sigs").join(format!("{name}.signature"))
        }

        fn out(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        /// Create program and signature files, return the case.
        fn case(&self, name: &str, signature: &str, enabled: bool) -> Result<TestCase> {
            std::fs::write(self.program(name), "00000013\n")?;
            std::fs::write(self.signature(name), signature)?;
            Ok(TestCase::new(self.program(name), self.signature(name), enabled))
        }
    }

    fn run(
        suite: &Suite,
        catalog: &Catalog,
        driver: FakeDriver,
        option: RunOption,
    ) -> Result<(RunReport, FakeDriver, String)> {
        let mut orch = Orchestrator::new(catalog, driver, Console::new(Vec::new(), false), suite.out())
            .set_option(option);
        let report = orch.run()?;
        let (driver, console) = orch.into_parts();
        Ok((report, driver, String::from_utf8(console.into_inner())?))
    }

    #[test]
    fn test_pass_and_skip() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n2\n", true)?;
        let b = suite.case("b", "1\n", false)?;
        let catalog = Catalog::new(vec![a.clone(), b.clone()], Vec::new())?;
        let driver = FakeDriver::new().dump(&a.program, "1\n2\n");

        let (report, driver, out) = run(&suite, &catalog, driver, RunOption::default())?;
        assert_eq!(
            report.summary,
            RunSummary {
                passed: 1,
                skipped: 1,
                failed: 0,
                missing: 0,
                total: 2,
            }
        );
        assert!(!report.summary.all_passed());
        assert_eq!(driver.runs, [a.program.clone()]);
        assert!(out.contains(&format!("TEST PASS : {}", a.program.display())));
        assert!(out.contains(&format!("TEST SKIP : {}", b.program.display())));
        assert!(out.contains("Total: passed 1, skipped 1, failed 0\n"));
        assert!(!out.contains("passed ALL"));
        Ok(())
    }

    #[test]
    fn test_disabled_never_runs() -> Result<()> {
        let suite = Suite::new()?;
        let cases = vec![suite.case("a", "1\n", false)?, suite.case("b", "1\n", false)?];
        let catalog = Catalog::new(cases, Vec::new())?;

        let (report, driver, _) = run(&suite, &catalog, FakeDriver::new(), RunOption::default())?;
        assert!(driver.runs.is_empty());
        assert_eq!(report.summary.skipped, 2);
        Ok(())
    }

    #[test]
    fn test_missing_program_not_scored() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n", true)?;
        let ghost = TestCase::new(suite.program("ghost"), suite.signature("ghost"), true);
        let catalog = Catalog::new(vec![ghost.clone(), a.clone()], Vec::new())?;
        let driver = FakeDriver::new().dump(&a.program, "1\n");

        let (report, driver, out) = run(&suite, &catalog, driver, RunOption::default())?;
        let s = report.summary;
        assert_eq!((s.passed, s.skipped, s.failed, s.missing), (1, 0, 0, 1));
        assert_eq!(driver.runs, [a.program.clone()]);
        assert_eq!(report.results.len(), 1);
        assert!(out.contains(&format!(
            "No such file or directory: {}",
            ghost.program.display()
        )));
        assert!(out.contains("Total: passed 1, skipped 0, failed 0, missing 1\n"));
        Ok(())
    }

    #[test]
    fn test_missing_reference_not_scored() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n", true)?;
        std::fs::remove_file(&a.reference)?;
        let catalog = Catalog::new(vec![a.clone()], Vec::new())?;
        let driver = FakeDriver::new().dump(&a.program, "1\n");

        let (report, driver, _) = run(&suite, &catalog, driver, RunOption::default())?;
        // the simulator still runs before the reference is looked up
        assert_eq!(driver.runs.len(), 1);
        let s = report.summary;
        assert_eq!((s.passed, s.skipped, s.failed, s.missing), (0, 0, 0, 1));
        Ok(())
    }

    #[test]
    fn test_dump_missing() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n", true)?;
        let catalog = Catalog::new(vec![a.clone()], Vec::new())?;

        let (report, _, out) = run(&suite, &catalog, FakeDriver::new(), RunOption::default())?;
        assert_eq!(report.summary.failed, 1);
        let dump = suite.out().join("a.mem");
        assert_eq!(
            report.results[0].detail,
            Some(Detail::DumpMissing { dump: dump.clone() })
        );
        assert!(out.contains(&format!("TEST FAIL : {}", a.program.display())));
        assert!(out.contains(&format!("-- Dump file not generated: {}", dump.display())));
        Ok(())
    }

    #[test]
    fn test_mismatch_and_expected_failure() -> Result<()> {
        let suite = Suite::new()?;
        let bad = suite.case("bad", "a\nb\nc\n", true)?;
        let known = suite.case("known", "a\nb\nc\n", true)?;
        let catalog = Catalog::new(vec![bad.clone(), known.clone()], vec![known.program.clone()])?;
        let driver = FakeDriver::new()
            .dump(&bad.program, "a\n1\nc\n")
            .dump(&known.program, "a\n1\nc\n");

        let (report, _, out) = run(&suite, &catalog, driver, RunOption::default())?;
        let s = report.summary;
        assert_eq!((s.passed, s.failed), (1, 1));

        let mismatch = Some(Detail::Mismatch {
            line: 2,
            reference: HexValue::from(0xb_u64),
            dut: HexValue::from(0x1_u64),
        });
        assert_eq!(report.results[0].outcome, Outcome::Fail);
        assert_eq!(report.results[0].detail, mismatch);
        assert_eq!(report.results[1].outcome, Outcome::Pass);
        assert!(report.results[1].expected_failure);
        assert_eq!(report.results[1].detail, mismatch);

        assert!(out.contains("-- Signature at line 2 differs from golden reference.\n"));
        assert!(out.contains("-- Signature: 0x1. Golden reference: 0xb\n"));
        assert!(out.contains(&format!("TEST PASS : {}", known.program.display())));
        Ok(())
    }

    #[test]
    fn test_all_passed_banner() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "ff\n", true)?;
        let b = suite.case("b", "0\n1\n", true)?;
        let catalog = Catalog::new(vec![a.clone(), b.clone()], Vec::new())?;
        let driver = FakeDriver::new()
            .dump(&a.program, "000000ff\n")
            .dump(&b.program, "0\n1\n2\n");

        let (report, _, out) = run(&suite, &catalog, driver, RunOption::default())?;
        assert!(report.summary.all_passed());
        assert!(out.contains("passed ALL"));
        Ok(())
    }

    #[test]
    fn test_malformed_dump_fails_case() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n2\n", true)?;
        let b = suite.case("b", "1\n", true)?;
        let catalog = Catalog::new(vec![a.clone(), b.clone()], Vec::new())?;
        let driver = FakeDriver::new()
            .dump(&a.program, "1\nxyz\n")
            .dump(&b.program, "1\n");

        let (report, _, out) = run(&suite, &catalog, driver, RunOption::default())?;
        let s = report.summary;
        assert_eq!((s.passed, s.failed), (1, 1));
        assert!(matches!(report.results[0].detail, Some(Detail::BadData { .. })));
        assert!(out.contains("not a hexadecimal value: `xyz`"));
        Ok(())
    }

    #[test]
    fn test_timeout_fails_case() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n", true)?;
        let catalog = Catalog::new(vec![a.clone()], Vec::new())?;
        let mut driver = FakeDriver::new().dump(&a.program, "1\n");
        driver.status = RunStatus::TimedOut(Duration::from_secs(3));

        let (report, _, out) = run(&suite, &catalog, driver, RunOption::default())?;
        assert_eq!(report.summary.failed, 1);
        assert!(out.contains("-- Simulator timed out after 3s"));
        Ok(())
    }

    #[test]
    fn test_exit_status_policy() -> Result<()> {
        let suite = Suite::new()?;
        let a = suite.case("a", "1\n", true)?;
        let catalog = Catalog::new(vec![a.clone()], Vec::new())?;
        let crashed = || {
            let mut driver = FakeDriver::new().dump(&a.program, "1\n");
            driver.status = RunStatus::Exited { code: Some(3) };
            driver
        };

        // by default only the dump counts
        let (report, _, _) = run(&suite, &catalog, crashed(), RunOption::default())?;
        assert_eq!(report.summary.passed, 1);

        let strict = RunOption::default().set_check_exit_status(true);
        let (report, _, out) = run(&suite, &catalog, crashed(), strict)?;
        assert_eq!(report.summary.failed, 1);
        assert_eq!(
            report.results[0].detail,
            Some(Detail::ExitStatus { code: Some(3) })
        );
        assert!(out.contains("-- Simulator exited with code 3"));
        Ok(())
    }

    #[test]
    fn test_counts_add_up() -> Result<()> {
        let suite = Suite::new()?;
        let cases = vec![
            suite.case("p", "1\n", true)?,
            suite.case("s", "1\n", false)?,
            suite.case("f", "1\n", true)?,
            TestCase::new(suite.program("m"), suite.signature("m"), true),
        ];
        let driver = FakeDriver::new()
            .dump(&cases[0].program, "1\n")
            .dump(&cases[2].program, "2\n");
        let catalog = Catalog::new(cases, Vec::new())?;

        let (report, _, _) = run(&suite, &catalog, driver, RunOption::default())?;
        let s = report.summary;
        assert_eq!(s.passed + s.skipped + s.failed, report.results.len());
        assert_eq!(s.passed + s.skipped + s.failed + s.missing, catalog.len());
        assert!(!s.is_success());
        Ok(())
    }
}
