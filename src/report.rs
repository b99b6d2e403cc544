//! Console and JSON output of a run.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use ansi_term::Colour;
use anyhow::{Context, Result};

use crate::orchestrator::{Detail, ExecutionResult, Outcome, RunReport, RunSummary};

const RULE: &str =
    "------------------------------------------------------------------------------------------";

/// Receives results as soon as each case is resolved.
pub trait Reporter {
    /// An input file of a case does not exist.
    fn missing(&mut self, path: &Path) -> io::Result<()>;
    fn case(&mut self, result: &ExecutionResult) -> io::Result<()>;
    fn summary(&mut self, summary: &RunSummary) -> io::Result<()>;
}

/// Human readable lines explaining a failure.
pub fn detail_lines(detail: &Detail) -> Vec<String> {
    match detail {
        Detail::Mismatch {
            line,
            reference,
            dut,
        } => vec![
            format!("Signature at line {line} differs from golden reference."),
            format!("Signature: {dut}. Golden reference: {reference}"),
        ],
        Detail::DumpMissing { dump } => {
            vec![format!("Dump file not generated: {}", dump.display())]
        }
        Detail::BadData { message } => vec![format!("Malformed data: {message}")],
        Detail::TimedOut { after } => vec![format!("Simulator timed out after {after:?}")],
        Detail::ExitStatus { code: Some(code) } => {
            vec![format!("Simulator exited with code {code}")]
        }
        Detail::ExitStatus { code: None } => vec!["Simulator terminated by signal".into()],
    }
}

/// Plain text report, one line per case.
///
/// ```text
/// TEST PASS : riscv_test_suite/test_programs/add-01.mem
/// TEST FAIL : riscv_test_suite/test_programs/sub-01.mem
/// -- Signature at line 2 differs from golden reference.
/// -- Signature: 0x1. Golden reference: 0xb
/// Total: passed 1, skipped 0, failed 1
/// ```
pub struct Console<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(&self, outcome: Outcome) -> String {
        let (text, colour) = match outcome {
            Outcome::Pass => ("PASS", Colour::Green),
            Outcome::Skip => ("SKIP", Colour::Yellow),
            Outcome::Fail => ("FAIL", Colour::Red),
        };
        if self.color {
            colour.paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}

impl<W: Write> Reporter for Console<W> {
    fn missing(&mut self, path: &Path) -> io::Result<()> {
        writeln!(self.out, "No such file or directory: {}", path.display())
    }

    fn case(&mut self, result: &ExecutionResult) -> io::Result<()> {
        let label = self.label(result.outcome);
        writeln!(self.out, "TEST {label} : {}", result.program.display())?;
        if result.outcome == Outcome::Fail {
            if let Some(detail) = &result.detail {
                for line in detail_lines(detail) {
                    writeln!(self.out, "-- {line}")?;
                }
            }
        }
        Ok(())
    }

    fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        write!(
            self.out,
            "Total: passed {}, skipped {}, failed {}",
            summary.passed, summary.skipped, summary.failed
        )?;
        if summary.missing > 0 {
            write!(self.out, ", missing {}", summary.missing)?;
        }
        writeln!(self.out)?;

        if summary.all_passed() {
            writeln!(self.out, "{RULE}")?;
            writeln!(
                self.out,
                "RVX core passed ALL {} tests of the compliance catalog",
                summary.total
            )?;
            writeln!(self.out, "{RULE}")?;
        }
        self.out.flush()
    }
}

/// Write the summary and every scored case to `path` as JSON.
pub fn write_json(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("could not create report `{}`", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).context("could not serialize report")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
