//! Result Reporting
//!
//! One line per task outcome, serialized by the sink's lock so lines from
//! different workers never interleave. Two formats:
//!
//! ```text
//! [result] task 7 ok=true msg="zip: compressed (54 -> 39)" time_ns=182000 engine=cpu-0
//! 7,true,"zip: compressed (54 -> 39)",182000,cpu-0
//! ```
//!
//! The CSV toggle is runtime-switchable (machine consumers flip it without
//! reconstructing the scheduler). Messages are quoted RFC-4180 style in CSV.
//!
//! # Panic Policy
//!
//! Sinks panic on I/O errors (fail-fast), except `BrokenPipe` which is
//! silently ignored (`runner | head` is normal usage).

use std::io::{self, ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::task::ExecutionResult;

// ============================================================================
// Trait
// ============================================================================

/// Destination for task results.
///
/// `deadline_missed` is advisory: true when the task had a deadline and the
/// result was reported after it.
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &ExecutionResult, deadline_missed: bool);
}

// ============================================================================
// TextSink
// ============================================================================

/// Line-oriented sink over any writer; human format by default, CSV when
/// toggled.
pub struct TextSink {
    out: Mutex<Box<dyn Write + Send>>,
    csv: AtomicBool,
}

impl TextSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(writer),
            csv: AtomicBool::new(false),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Switch between human and CSV lines at runtime.
    pub fn set_csv(&self, csv: bool) {
        self.csv.store(csv, Ordering::Relaxed);
    }

    pub fn csv_enabled(&self) -> bool {
        self.csv.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ResultSink for TextSink {
    fn record(&self, result: &ExecutionResult, deadline_missed: bool) {
        let line = if self.csv_enabled() {
            format_csv(result)
        } else {
            format_human(result, deadline_missed)
        };
        let mut out = self.lock();
        match out.write_all(line.as_bytes()).and_then(|_| out.flush()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
            Err(e) => panic!("result sink write failed: {}", e),
        }
    }
}

/// Human-readable line, newline-terminated.
pub fn format_human(result: &ExecutionResult, deadline_missed: bool) -> String {
    let mut line = format!(
        "[result] task {} ok={} msg=\"{}\" time_ns={} engine={}",
        result.id,
        result.ok,
        result.message,
        result.runtime.as_nanos(),
        result.engine
    );
    if deadline_missed {
        line.push_str(" deadline_missed");
    }
    line.push('\n');
    line
}

/// CSV line `id,ok,msg,time_ns,engine`, newline-terminated.
pub fn format_csv(result: &ExecutionResult) -> String {
    format!(
        "{},{},{},{},{}\n",
        result.id,
        result.ok,
        csv_quote(&result.message),
        result.runtime.as_nanos(),
        result.engine
    )
}

fn csv_quote(field: &str) -> String {
    let mut quoted = String::with_capacity(field.len() + 2);
    quoted.push('"');
    for c in field.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

// ============================================================================
// CollectingSink
// ============================================================================

/// Buffers results in memory; the observation point for tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<ExecutionResult>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ExecutionResult> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionResult>> {
        match self.results.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ResultSink for CollectingSink {
    fn record(&self, result: &ExecutionResult, _deadline_missed: bool) {
        self.lock().push(result.clone());
    }
}
