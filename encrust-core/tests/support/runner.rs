//! A [`ProcessRunner`] that records invocations instead of spawning.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use encrust_core::{Invocation, ProcessResult, ProcessRunner, Result};

/// Simulates the external tools the workflows call.
///
/// - `file -b <path>` prints the first line of `<path>`.
/// - `delocate-fuse --wheel-dir=<dir> <arm64> <x86_64>` copies the arm64
///   wheel into `<dir>` under its own name.
/// - `arch -<arch> <pip> wheel ... -w <dir>` writes one wheel per configured
///   project for that architecture.
/// - Anything else prints the canned stdout registered for its program.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    stdout: Mutex<HashMap<String, String>>,
    failing: Mutex<Vec<(String, Option<String>)>>,
    downloads: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, program: &str, stdout: &str) {
        self.stdout
            .lock()
            .unwrap()
            .insert(program.to_string(), stdout.to_string());
    }

    /// Make every invocation of `program` exit with status 1.
    pub fn fail(&self, program: &str) {
        self.failing
            .lock()
            .unwrap()
            .push((program.to_string(), None));
    }

    /// Fail only invocations of `program` with an argument containing
    /// `needle`. Failing invocations return at once, without the delay.
    pub fn fail_when(&self, program: &str, needle: &str) {
        self.failing
            .lock()
            .unwrap()
            .push((program.to_string(), Some(needle.to_string())));
    }

    fn should_fail(&self, invocation: &Invocation) -> bool {
        let args = invocation.argv_lossy();
        self.failing.lock().unwrap().iter().any(|(program, needle)| {
            program == invocation.program()
                && needle
                    .as_ref()
                    .is_none_or(|n| args.iter().any(|arg| arg.contains(n)))
        })
    }

    /// Wheel filename prefixes (`name-version-cp311-cp311`) that a pip
    /// download produces for each architecture.
    pub fn download(&self, prefix: &str) {
        self.downloads.lock().unwrap().push(prefix.to_string());
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.program() == program)
            .collect()
    }

    /// Highest number of invocations seen running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn simulate(&self, invocation: &Invocation) -> String {
        let args = invocation.argv_lossy();
        match invocation.program() {
            "file" => {
                let path = args.last().cloned().unwrap_or_default();
                std::fs::read_to_string(path)
                    .ok()
                    .and_then(|text| text.lines().next().map(str::to_string))
                    .unwrap_or_default()
            }
            "delocate-fuse" => {
                let dir = args
                    .iter()
                    .find_map(|a| a.strip_prefix("--wheel-dir="))
                    .unwrap();
                let arm64 = Path::new(&args[2]);
                let target = Path::new(dir).join(arm64.file_name().unwrap());
                std::fs::copy(arm64, target).unwrap();
                String::new()
            }
            "arch" => {
                let arch = args[0].trim_start_matches('-');
                let dir = PathBuf::from(&args[args.len() - 1]);
                for prefix in self.downloads.lock().unwrap().iter() {
                    let name = format!("{prefix}-macosx_11_0_{arch}.whl");
                    std::fs::write(dir.join(name), b"").unwrap();
                }
                String::new()
            }
            program => self
                .stdout
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let failing = self.should_fail(invocation);
        if let (Some(delay), false) = (self.delay, failing) {
            tokio::time::sleep(delay).await;
        }

        let result = if failing {
            ProcessResult {
                code: Some(1),
                stdout: Vec::new(),
                stderr: b"simulated failure\n".to_vec(),
                invocation: invocation.clone(),
            }
        } else {
            ProcessResult {
                code: Some(0),
                stdout: self.simulate(invocation).into_bytes(),
                stderr: Vec::new(),
                invocation: invocation.clone(),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }

    fn locate(&self, program: &str) -> Result<PathBuf> {
        Ok(Path::new("/fake/bin").join(program))
    }
}
