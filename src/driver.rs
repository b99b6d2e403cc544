//! Launching the external simulator on a single program.

use std::{
    ffi::OsString,
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

/// Cycle ceiling handed to the simulator. Every valid test halts well before
/// it; a run that hits it leaves a partial dump behind.
pub const CYCLE_BUDGET: u64 = 500_000;

/// Address the simulator watches to decide which memory region to dump.
pub const WATCH_ADDR: u32 = 0x0000_0000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where the simulator writes the dump of `program`.
pub fn dump_path(dump_dir: &Path, program: &Path) -> PathBuf {
    dump_dir.join(program.file_name().unwrap_or(program.as_os_str()))
}

/// How a simulator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// `code` is `None` when the process was terminated by a signal.
    Exited { code: Option<i32> },
    /// Killed after exceeding the supervisory timeout.
    TimedOut(Duration),
}

impl RunStatus {
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Exited { code: Some(0) })
    }
}

/// Runs one program and leaves its dump in the dump directory.
///
/// Implementations block until the run is over. The exit status is reported
/// but not interpreted here: scoring is done on the dump.
pub trait Driver {
    fn run(&mut self, program: &Path, dump_dir: &Path) -> Result<RunStatus>;
}

#[derive(Debug, Default, Clone)]
pub struct SimOption {
    wave: bool,
    timeout: Option<Duration>,
}

impl SimOption {
    /// Ask the simulator for an `.fst` waveform next to the dump.
    pub fn set_wave(mut self, wave: bool) -> Self {
        self.wave = wave;
        self
    }

    /// Kill the simulator if it is still running after `timeout`.
    pub fn set_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The simulator binary.
#[derive(Debug, Clone)]
pub struct Simulator {
    path: PathBuf,
    option: SimOption,
}

impl Simulator {
    pub fn new(path: impl Into<PathBuf>, option: SimOption) -> Self {
        Self {
            path: path.into(),
            option,
        }
    }

    /// Command line for running `program`, stdio not yet attached.
    pub fn command(&self, program: &Path, dump_dir: &Path) -> Command {
        let dump = dump_path(dump_dir, program);
        let mut cmd = Command::new(&self.path);
        cmd.arg(flag("--ram-init-h32=", program))
            .arg(flag("--ram-dump-h32=", &dump))
            .arg(format!("--cycles={CYCLE_BUDGET}"))
            .arg(format!("--wr-addr={WATCH_ADDR:#010x}"));
        if self.option.wave {
            cmd.arg(flag("--out-wave=", &wave_path(&dump)));
        }
        cmd
    }

    /// Remove what an earlier run left at the output paths of `program`, so
    /// that only files written by the next run are scored.
    fn clear_outputs(&self, program: &Path, dump_dir: &Path) -> Result<()> {
        let dump = dump_path(dump_dir, program);
        let mut stale = vec![];
        if self.option.wave {
            stale.push(wave_path(&dump));
        }
        stale.push(dump);
        for path in stale {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("removed stale {}", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("could not remove `{}`", path.display()))
                }
            }
        }
        Ok(())
    }

    fn wait(&self, child: &mut std::process::Child) -> Result<RunStatus> {
        let Some(timeout) = self.option.timeout else {
            let status = child.wait()?;
            return Ok(RunStatus::Exited {
                code: status.code(),
            });
        };
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(RunStatus::Exited {
                    code: status.code(),
                });
            }
            if start.elapsed() >= timeout {
                // the child may exit between the poll and the kill
                if let Err(err) = child.kill() {
                    tracing::debug!("kill failed: {err}");
                }
                let _ = child.wait()?;
                return Ok(RunStatus::TimedOut(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn wave_path(dump: &Path) -> PathBuf {
    let mut wave = dump.as_os_str().to_owned();
    wave.push(".fst");
    PathBuf::from(wave)
}

fn flag(name: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(name);
    arg.push(path);
    arg
}

impl Driver for Simulator {
    /// Standard output and error of the simulator go to
    /// `{dump_dir}/{program_name}.log`. A dump or waveform left by an earlier
    /// run is deleted before launching.
    fn run(&mut self, program: &Path, dump_dir: &Path) -> Result<RunStatus> {
        let mut log_path = dump_path(dump_dir, program).into_os_string();
        log_path.push(".log");
        let log_path = PathBuf::from(log_path);

        let log = File::create(&log_path)
            .with_context(|| format!("could not create log file `{}`", log_path.display()))?;
        let err_log = log.try_clone().context("could not duplicate log handle")?;

        self.clear_outputs(program, dump_dir)?;
        let mut cmd = self.command(program, dump_dir);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(err_log));
        tracing::debug!("launching {:?}", cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("could not launch simulator `{}`", self.path.display()))?;
        let status = self
            .wait(&mut child)
            .with_context(|| format!("failed waiting for simulator on `{}`", program.display()))?;
        tracing::info!("simulated {}: {:?}", program.display(), status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_line() {
        let sim = Simulator::new("build/rvx_simulator", SimOption::default());
        let cmd = sim.command(
            Path::new("riscv_test_suite/test_programs/add-01.mem"),
            Path::new("test_output"),
        );
        assert_eq!(cmd.get_program(), "build/rvx_simulator");
        assert_eq!(
            args(&cmd),
            [
                "--ram-init-h32=riscv_test_suite/test_programs/add-01.mem",
                "--ram-dump-h32=test_output/add-01.mem",
                "--cycles=500000",
                "--wr-addr=0x00000000",
            ]
        );
    }

    #[test]
    fn test_command_line_wave() {
        let sim = Simulator::new("sim", SimOption::default().set_wave(true));
        let cmd = sim.command(Path::new("progs/ecall.mem"), Path::new("out"));
        assert_eq!(
            args(&cmd).last().map(String::as_str),
            Some("--out-wave=out/ecall.mem.fst")
        );
    }

    #[test]
    fn test_dump_path() {
        assert_eq!(
            dump_path(Path::new("out"), Path::new("a/b/c.mem")),
            Path::new("out/c.mem")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sim = Simulator::new(dir.path().join("missing-sim"), SimOption::default());
        let r = sim.run(Path::new("a.mem"), dir.path());
        anyhow::ensure!(r.is_err());
        // log file is created before launching
        anyhow::ensure!(dir.path().join("a.mem.log").is_file());
        Ok(())
    }

    #[test]
    fn test_outputs_of_earlier_run_removed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("a.mem");
        std::fs::write(&dump, "1\n")?;
        std::fs::write(dir.path().join("a.mem.fst"), "")?;

        let sim = Simulator::new("sim", SimOption::default().set_wave(true));
        sim.clear_outputs(Path::new("progs/a.mem"), dir.path())?;
        anyhow::ensure!(!dump.exists());
        anyhow::ensure!(!dir.path().join("a.mem.fst").exists());
        // nothing to remove on a fresh directory
        sim.clear_outputs(Path::new("progs/a.mem"), dir.path())?;
        Ok(())
    }
}
