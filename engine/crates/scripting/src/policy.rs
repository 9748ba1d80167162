//! Error policies decide what happens to failures the script host does not
//! hand back to a caller: load/compile failures, batch failures and lifecycle
//! hook errors.
//!
//! A policy is always supplied from outside the host, usually shared as
//! `Arc<dyn ErrorPolicy>`, so an embedding application can swap a
//! terminating policy for a capturing one in tests.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

/// Capability controlling whether and how script failures are reported.
pub trait ErrorPolicy: Send + Sync {
    fn enable(&self);

    fn disable(&self);

    fn is_enabled(&self) -> bool;

    /// Report a failure made of one or more items (typically the error
    /// followed by context). Has no effect while disabled.
    fn report(&self, items: &[&dyn Display]);
}

/// Join report items with single spaces, like a print-line sink would.
pub fn join_items(items: &[&dyn Display]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Logs each report as an error event and lets execution continue.
#[derive(Debug)]
pub struct ContinuePolicy {
    enabled: AtomicBool,
}

impl ContinuePolicy {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    pub fn shared() -> Arc<dyn ErrorPolicy> {
        Arc::new(Self::new())
    }
}

impl Default for ContinuePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorPolicy for ContinuePolicy {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn report(&self, items: &[&dyn Display]) {
        if self.is_enabled() {
            error!(target: "script_errors", "{}", join_items(items));
        }
    }
}

/// Logs the report and terminates the process with exit code 1.
#[derive(Debug)]
pub struct FatalPolicy {
    enabled: AtomicBool,
}

impl FatalPolicy {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    pub fn shared() -> Arc<dyn ErrorPolicy> {
        Arc::new(Self::new())
    }
}

impl Default for FatalPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorPolicy for FatalPolicy {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn report(&self, items: &[&dyn Display]) {
        if self.is_enabled() {
            let line = join_items(items);
            error!(target: "script_errors", "fatal: {}", line);
            eprintln!("fatal script error: {}", line);
            std::process::exit(1);
        }
    }
}

/// Records every report instead of emitting it. Used by tests and by
/// embedders that surface script failures in their own UI.
#[derive(Debug)]
pub struct CapturePolicy {
    enabled: AtomicBool,
    reports: Mutex<Vec<String>>,
}

impl CapturePolicy {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the reports captured so far.
    pub fn reports(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Drain the captured reports.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // A poisoned lock still holds valid strings.
        self.reports.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorPolicy for CapturePolicy {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn report(&self, items: &[&dyn Display]) {
        if self.is_enabled() {
            self.lock().push(join_items(items));
        }
    }
}
