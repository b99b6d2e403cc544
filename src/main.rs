use std::{fs::File, io::IsTerminal, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use regex::Regex;
use rvx_compliance::{report, Catalog, Console, Orchestrator, RunOption, SimOption, Simulator};

// RISC-V architectural test runner for the RVX simulator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
)]
struct Args {
    /// Path to the simulator
    #[arg(long, default_value = "simulator/build/rvx_simulator")]
    sim: PathBuf,

    /// Dump directory, created if absent
    #[arg(long, default_value = "test_output")]
    dump: PathBuf,

    /// Let the simulator write a *.fst waveform next to each dump
    #[arg(long)]
    wave: bool,

    /// JSON catalog to run instead of the built-in RISC-V suite
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Only run the tests whose program path matches this regex
    #[arg(long)]
    filter: Option<String>,

    /// Kill a simulator run after this many seconds (0 waits forever)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Fail tests whose simulator exits unsuccessfully, even if the dump
    /// matches
    #[arg(long)]
    check_exit_status: bool,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print PASS/SKIP/FAIL without colors
    #[arg(long)]
    no_color: bool,

    /// Write logs to this file as JSON lines instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("could not create log file `{}`", path.display()))?;
            binutils::logging_setup(log_level, Some(file));
        }
        None => binutils::logging_setup(log_level, None::<File>),
    }

    anyhow::ensure!(
        args.sim.is_file(),
        "no simulator at `{}`, please build it first",
        args.sim.display()
    );
    std::fs::create_dir_all(&args.dump)
        .with_context(|| format!("could not create dump directory `{}`", args.dump.display()))?;

    let mut catalog = match &args.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin(),
    };
    if let Some(filter) = &args.filter {
        let pattern =
            Regex::new(filter).with_context(|| format!("invalid filter `{filter}`"))?;
        catalog = catalog.filter(&pattern);
        if catalog.is_empty() {
            tracing::warn!("no test matches `{filter}`");
        }
    }

    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let simulator = Simulator::new(
        &args.sim,
        SimOption::default()
            .set_wave(args.wave)
            .set_timeout(timeout),
    );
    let color = !args.no_color && std::io::stdout().is_terminal();
    let console = Console::new(std::io::stdout(), color);

    let mut orchestrator = Orchestrator::new(&catalog, simulator, console, &args.dump)
        .set_option(RunOption::default().set_check_exit_status(args.check_exit_status));
    let run = orchestrator.run()?;

    if let Some(path) = &args.report {
        report::write_json(&run, path)?;
    }

    Ok(if run.summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
