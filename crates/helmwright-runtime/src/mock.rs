use crate::invocation::Invocation;
use crate::runner::{ToolOutput, ToolRunner};
use crate::RuntimeError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One execution seen by a [`MockRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub invocation: Invocation,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct Script {
    persistent: HashMap<String, ToolOutput>,
    queued: HashMap<String, VecDeque<ToolOutput>>,
    panic_on: HashSet<String>,
    delay: Option<Duration>,
}

/// Scripted stand-in for the external tool.
///
/// Responses are keyed by sub-command name. One-shot responses queued with
/// [`respond_once`](Self::respond_once) take precedence over persistent ones;
/// unscripted sub-commands exit 0 with no output.
#[derive(Default)]
pub struct MockRunner {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
    active: Mutex<HashMap<PathBuf, usize>>,
    max_overlap: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(self, subcommand: &str, code: i32, output: &str) -> Self {
        self.set_response(subcommand, code, output);
        self
    }

    #[must_use]
    pub fn respond_once(self, subcommand: &str, code: i32, output: &str) -> Self {
        self.queue_response(subcommand, code, output);
        self
    }

    /// Answer `version` like the real tool does.
    #[must_use]
    pub fn with_version(self, version: &str) -> Self {
        self.set_response("version", 0, &format!("helmfile version v{version}\n"));
        self
    }

    /// Sleep inside every execution, to widen race windows in tests.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        lock(&self.script).delay = Some(delay);
        self
    }

    #[must_use]
    pub fn panic_on(self, subcommand: &str) -> Self {
        lock(&self.script).panic_on.insert(subcommand.to_owned());
        self
    }

    pub fn set_response(&self, subcommand: &str, code: i32, output: &str) {
        lock(&self.script)
            .persistent
            .insert(subcommand.to_owned(), ToolOutput::new(code, output));
    }

    pub fn queue_response(&self, subcommand: &str, code: i32, output: &str) {
        lock(&self.script)
            .queued
            .entry(subcommand.to_owned())
            .or_default()
            .push_back(ToolOutput::new(code, output));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.calls)
            .iter()
            .map(|c| c.invocation.clone())
            .collect()
    }

    /// Number of executions of `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.invocation.subcommand_name() == subcommand)
            .count()
    }

    /// Highest number of executions seen running at once in one directory.
    pub fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }

    fn next_response(&self, subcommand: &str) -> (ToolOutput, Option<Duration>, bool) {
        let mut script = lock(&self.script);
        let panics = script.panic_on.contains(subcommand);
        let delay = script.delay;
        let queued = script.queued.get_mut(subcommand).and_then(VecDeque::pop_front);
        let out = queued
            .or_else(|| script.persistent.get(subcommand).cloned())
            .unwrap_or_else(|| ToolOutput::new(0, ""));
        (out, delay, panics)
    }
}

impl ToolRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn execute(&self, invocation: &Invocation) -> Result<ToolOutput, RuntimeError> {
        let subcommand = invocation.subcommand_name().to_owned();
        let (out, delay, panics) = self.next_response(&subcommand);
        if panics {
            panic!("mock tool crashed on {subcommand}");
        }

        let started = Instant::now();
        {
            let mut active = lock(&self.active);
            let n = active.entry(invocation.dir.clone()).or_insert(0);
            *n += 1;
            self.max_overlap.fetch_max(*n, Ordering::SeqCst);
        }
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        if let Some(n) = lock(&self.active).get_mut(&invocation.dir) {
            *n -= 1;
        }

        lock(&self.calls).push(RecordedCall {
            invocation: invocation.clone(),
            started,
            finished: Instant::now(),
        });
        Ok(out)
    }
}
