use std::path::PathBuf;

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    init_logging_with("info");
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Outcome of one directory batch (run or compile) over script files.
#[derive(Debug, Clone)]
pub struct BatchMetrics {
    pub directory: PathBuf,
    pub operation: &'static str,
    pub loaded: usize,
    pub failed: usize,
    pub duration_us: u128,
}

impl BatchMetrics {
    pub fn new(directory: impl Into<PathBuf>, operation: &'static str) -> Self {
        Self {
            directory: directory.into(),
            operation,
            loaded: 0,
            failed: 0,
            duration_us: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.loaded + self.failed
    }

    pub fn log(&self) {
        if self.failed > 0 {
            tracing::warn!(
                directory = %self.directory.display(),
                operation = self.operation,
                loaded = self.loaded,
                failed = self.failed,
                duration_us = self.duration_us,
                "script batch finished with {} of {} files failing",
                self.failed,
                self.total()
            );
        } else {
            tracing::info!(
                directory = %self.directory.display(),
                operation = self.operation,
                loaded = self.loaded,
                duration_us = self.duration_us,
                "script batch completed"
            );
        }
    }
}
