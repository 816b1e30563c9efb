use core::fmt::Debug;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigPoint;

/// Captured output of one finished benchmark process
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Run exceeded the timeout of {0:?}")]
    Timeout(Duration),
    #[error("Process exited with {}", .code.map_or("a signal".to_owned(), |c| format!("status {c}")))]
    Failed {
        code: Option<i32>,
        output: RunOutput,
    },
    #[error("Failed to collect process output")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait Bench: Debug + Send + Sync {
    /// Name of the benchmark, for identification
    fn name(&self) -> &str;
    /// Runs a single repetition of `point` with `seed` and waits for it to finish
    async fn run(&self, point: &ConfigPoint, seed: u64) -> Result<RunOutput, RunError>;
    /// Throughputs in MOPS reported by a finished run, empty if it reported none
    fn throughputs(&self, output: &RunOutput) -> Vec<f64>;
}
