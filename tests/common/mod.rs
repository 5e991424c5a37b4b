//! Scripted in-process conversion service shared by the integration tests.
//!
//! The service keys its behaviour on the *content* of the input: each test
//! item's bytes are its name, and `script(name, steps)` queues what the next
//! calls for that item do. Once a script runs dry the item uses the default
//! step (success unless changed).

#![allow(dead_code)]

use office2pdf::{
    BatchItem, ConnectionParams, ConversionService, Interrupt, MemorySource, RetryPolicy,
    RetryingConverter, ServiceConnection, ServiceError, TimedAttempt,
};
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// What one `convert` call does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write `PDF:<input>` and succeed.
    Succeed,
    /// Sleep, then succeed.
    Slow(Duration),
    /// Write some bytes, then fail with a generation error.
    PartialThenFail,
    /// Fail with a connection error from inside `convert`.
    DropConnection,
    /// Block until interrupted.
    Hang,
    /// Panic inside the blocking call.
    Panic,
}

#[derive(Default)]
pub struct Stats {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
}

impl Stats {
    pub fn calls_for(&self, item: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(item)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn record_call(&self, item: &str) {
        *self.calls.lock().unwrap().entry(item.to_string()).or_default() += 1;
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Script {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    default_step: Mutex<Option<Step>>,
}

impl Script {
    fn next(&self, item: &str) -> Step {
        let scripted = self
            .steps
            .lock()
            .unwrap()
            .get_mut(item)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(|| {
            self.default_step
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Step::Succeed)
        })
    }
}

pub struct ScriptedService {
    script: Arc<Script>,
    refuse_connect: AtomicBool,
    pub stats: Arc<Stats>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(Script::default()),
            refuse_connect: AtomicBool::new(false),
            stats: Arc::new(Stats::default()),
        })
    }

    pub fn script(&self, item: &str, steps: impl IntoIterator<Item = Step>) {
        self.script
            .steps
            .lock()
            .unwrap()
            .insert(item.to_string(), steps.into_iter().collect());
    }

    pub fn set_default(&self, step: Step) {
        *self.script.default_step.lock().unwrap() = Some(step);
    }

    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }
}

impl ConversionService for ScriptedService {
    fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn ServiceConnection>, ServiceError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ServiceError::Connection(format!(
                "connection refused ({params})"
            )));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let (wake_tx, wake_rx) = mpsc::sync_channel(1);
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            wake_tx,
            wake_rx,
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
    stats: Arc<Stats>,
    wake_tx: mpsc::SyncSender<()>,
    wake_rx: mpsc::Receiver<()>,
}

impl ServiceConnection for ScriptedConnection {
    fn interrupter(&self) -> Box<dyn Interrupt> {
        let tx = self.wake_tx.clone();
        let stats = Arc::clone(&self.stats);
        Box::new(move || {
            stats.interrupts.fetch_add(1, Ordering::SeqCst);
            let _ = tx.try_send(());
        })
    }

    fn convert(
        &mut self,
        input: &mut (dyn Read + Send),
        _source_ext: &str,
        output: &mut dyn Write,
        _target_ext: &str,
    ) -> Result<(), ServiceError> {
        let mut bytes = Vec::new();
        input
            .read_to_end(&mut bytes)
            .map_err(|e| ServiceError::Generation(format!("cannot read input: {e}")))?;
        let item = String::from_utf8_lossy(&bytes).into_owned();
        self.stats.record_call(&item);
        let step = self.script.next(&item);

        self.stats.enter();
        let result = match step {
            Step::Succeed => write_pdf(output, &item),
            Step::Slow(delay) => {
                std::thread::sleep(delay);
                write_pdf(output, &item)
            }
            Step::PartialThenFail => {
                let _ = output.write_all(b"%PDF-garbage");
                Err(ServiceError::Generation("document is corrupt".into()))
            }
            Step::DropConnection => Err(ServiceError::Connection("connection reset".into())),
            Step::Hang => match self.wake_rx.recv_timeout(Duration::from_secs(30)) {
                Ok(()) => Err(ServiceError::Interrupted),
                Err(_) => Err(ServiceError::Generation("hang was never interrupted".into())),
            },
            Step::Panic => {
                self.stats.leave();
                panic!("converter crashed on '{item}'");
            }
        };
        self.stats.leave();
        result
    }

    fn disconnect(&mut self) {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn write_pdf(output: &mut dyn Write, item: &str) -> Result<(), ServiceError> {
    output
        .write_all(expected_pdf(item).as_bytes())
        .map_err(|e| ServiceError::Generation(e.to_string()))
}

/// Output the scripted service produces for `item`.
pub fn expected_pdf(item: &str) -> String {
    format!("PDF:{item}")
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn params() -> ConnectionParams {
    ConnectionParams::new("127.0.0.1", 2003).unwrap()
}

/// Converter with `attempts` attempts of `timeout` each and `slots` slots.
pub fn converter(
    service: Arc<ScriptedService>,
    attempts: u32,
    timeout: Duration,
    slots: usize,
) -> RetryingConverter {
    let attempt = TimedAttempt::new(service, params(), timeout, slots)
        .with_cancel_grace(Duration::from_secs(2));
    RetryingConverter::new(attempt, RetryPolicy::new(attempts, timeout).unwrap())
}

/// In-memory item whose content is its own name.
pub fn memory_item(name: &str, out_dir: &Path) -> BatchItem {
    BatchItem {
        source: Arc::new(MemorySource::new(name, name.as_bytes().to_vec())),
        source_format: "doc".into(),
        target_format: "pdf".into(),
        destination: out_dir.join(format!("{name}.pdf")),
    }
}

/// Names of every entry in `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
