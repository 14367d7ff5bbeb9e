//! Compress checkpoint files on the host, using the same worker pool the
//! proxy hands out to guests.
//!
//!     semihost-compress [flags...] file1 file2 ...
//!
//! Files that do not fit in the pool right away are queued and submitted as
//! slots free up.  The exit status is non-zero if any job failed.

use std::collections::VecDeque;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use semihost::compress::SubmitError;
use semihost::sysdefs::constants::{
    DEFAULT_COMPRESSOR_SLOTS, DEFAULT_WRITE_BUF_SIZE, HOST_AT_FDCWD,
};
use semihost::{CompressorConfig, CompressorPool, PollStatus, SandboxRoot, Threshold};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Parser, Clone)]
#[command(name = "semihost-compress")]
pub struct CliOptions {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of jobs that may run at once
    #[arg(long, default_value_t = DEFAULT_COMPRESSOR_SLOTS)]
    pub slots: usize,

    /// Output buffer size of each job, in bytes
    #[arg(long = "write-buf", default_value_t = DEFAULT_WRITE_BUF_SIZE)]
    pub write_buf: usize,

    /// Keep a compressed file only below this size ratio
    #[arg(long, value_name = "NUM/DEN", default_value = "9/10")]
    pub threshold: Threshold,

    /// Treat absolute FILE paths as relative to this directory
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Files to compress
    #[arg(value_name = "FILE", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,
}

struct Job<'a> {
    path: &'a Path,
    host_path: CString,
    size_before: Option<u64>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = CliOptions::parse();
    init_logging(cli.verbose);

    let sandbox = match &cli.root {
        Some(dir) => SandboxRoot::resolve(dir)?,
        None => SandboxRoot::unconfined(),
    };
    let pool = CompressorPool::new(CompressorConfig {
        slots: cli.slots,
        write_buf_size: cli.write_buf,
        threshold: cli.threshold,
    });
    if pool.num_compressors() == 0 {
        bail!("--slots must be at least 1");
    }

    let mut pending = VecDeque::new();
    for path in &cli.files {
        let host_path = sandbox.apply(path.as_os_str().as_bytes());
        let size_before = std::fs::metadata(Path::new(std::ffi::OsStr::from_bytes(&host_path)))
            .map(|m| m.len())
            .ok();
        let host_path = CString::new(host_path)
            .with_context(|| format!("{} contains a NUL byte", path.display()))?;
        pending.push_back(Job {
            path,
            host_path,
            size_before,
        });
    }

    let failures = run_jobs(&pool, pending, report)?;

    if failures > 0 {
        bail!("{} of {} files could not be compressed", failures, cli.files.len());
    }
    Ok(())
}

/// Feed `pending` through the pool, resubmitting whatever does not fit yet,
/// and hand every finished job to `report`.  Returns the number of failures.
fn run_jobs<'a, F>(
    pool: &CompressorPool,
    mut pending: VecDeque<Job<'a>>,
    mut report: F,
) -> Result<usize>
where
    F: FnMut(&Job<'a>, PollStatus),
{
    let mut running: Vec<(usize, Job)> = Vec::new();
    let mut failures = 0usize;
    loop {
        while let Some(job) = pending.pop_front() {
            match pool.submit(HOST_AT_FDCWD, job.host_path.clone()) {
                Ok(slot) => running.push((slot, job)),
                Err(SubmitError::PoolFull) => {
                    pending.push_front(job);
                    break;
                }
                Err(e) => return Err(e).context("cannot submit compression job"),
            }
        }
        if running.is_empty() && pending.is_empty() {
            return Ok(failures);
        }

        running.retain(|(slot, job)| match pool.poll(*slot) {
            PollStatus::Running => true,
            status => {
                if status == PollStatus::Failed {
                    failures += 1;
                }
                report(job, status);
                false
            }
        });
        thread::sleep(POLL_INTERVAL);
    }
}

fn report(job: &Job, status: PollStatus) {
    if status == PollStatus::Failed {
        println!("{}: failed", job.path.display());
        return;
    }

    let after = std::fs::metadata(std::ffi::OsStr::from_bytes(job.host_path.as_bytes()))
        .map(|m| m.len())
        .ok();
    match (job.size_before, after) {
        (Some(before), Some(after)) if after < before => {
            println!("{}: {} -> {} bytes", job.path.display(), before, after);
        }
        _ => println!("{}: kept as is", job.path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(path: &Path) -> Job<'_> {
        Job {
            path,
            host_path: CString::new(path.as_os_str().as_bytes()).unwrap(),
            size_before: std::fs::metadata(path).map(|m| m.len()).ok(),
        }
    }

    #[test]
    fn options_parse() {
        let cli = CliOptions::try_parse_from([
            "semihost-compress",
            "-vv",
            "--slots",
            "2",
            "--threshold",
            "1/2",
            "a",
            "b",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.slots, 2);
        assert_eq!(cli.write_buf, DEFAULT_WRITE_BUF_SIZE);
        assert_eq!(cli.threshold, Threshold::new(1, 2).unwrap());
        assert_eq!(cli.files.len(), 2);

        assert!(CliOptions::try_parse_from(["semihost-compress"]).is_err());
        let zero_den = ["semihost-compress", "--threshold", "1/0", "a"];
        assert!(CliOptions::try_parse_from(zero_den).is_err());
    }

    #[test]
    fn queued_jobs_wait_for_a_free_slot() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["one", "two", "three", "missing"];
        for name in &names[..3] {
            std::fs::write(dir.path().join(name), vec![0u8; 4096]).unwrap();
        }
        let paths: Vec<PathBuf> = names.iter().map(|n| dir.path().join(n)).collect();
        let pending = paths.iter().map(|p| job(p)).collect();

        // a single slot forces every job after the first to be resubmitted
        let pool = CompressorPool::new(CompressorConfig {
            slots: 1,
            write_buf_size: 64,
            threshold: Threshold::default(),
        });
        let mut seen = Vec::new();
        let failures = run_jobs(&pool, pending, |job, status| {
            seen.push((job.path.to_path_buf(), status));
        })
        .unwrap();

        assert_eq!(failures, 1);
        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&(paths[3].clone(), PollStatus::Failed)));
        for path in &paths[..3] {
            assert!(seen.contains(&(path.clone(), PollStatus::Succeeded)));
            assert_eq!(std::fs::read(path).unwrap()[0], 1);
        }
        assert_eq!(pool.state(0), Some(semihost::compress::JobState::Idle));
    }
}
