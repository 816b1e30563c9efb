use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use common::{
    bench::{Bench, RunError, RunOutput},
    config::ConfigPoint,
};
use result::parse_output;
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

pub mod result;

/// A concurrent tree benchmark executable driven through positional
/// arguments: `<mode marker> <tree size> <threads> <lookup %> <insert %> <seed>`.
///
/// The remove share is not passed, the executable derives it as
/// `100 - insert - lookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBench {
    program: PathBuf,
    name: String,
    mode_marker: String,
    timeout: Option<Duration>,
}

impl TreeBench {
    pub fn new(program: PathBuf, mode_marker: String, timeout: Option<Duration>) -> Self {
        let name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        Self {
            program,
            name,
            mode_marker,
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self, point: &ConfigPoint, seed: u64) -> Vec<String> {
        vec![
            self.mode_marker.clone(),
            point.tree_size.to_string(),
            point.threads.to_string(),
            point.mix.lookup.to_string(),
            point.mix.insert.to_string(),
            seed.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl Bench for TreeBench {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, point: &ConfigPoint, seed: u64) -> Result<RunOutput, RunError> {
        let args = self.args(point, seed);
        debug!("program={} args={}", self.program.display(), args.join(" "));

        let start = Instant::now();
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // dropping the pending wait kills the child
        let output = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };

        let run = RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: start.elapsed(),
        };
        debug!(
            "Finished in {} ms | status: {}",
            run.elapsed.as_millis(),
            output.status
        );

        if !output.status.success() {
            return Err(RunError::Failed {
                code: output.status.code(),
                output: run,
            });
        }
        Ok(run)
    }

    fn throughputs(&self, output: &RunOutput) -> Vec<f64> {
        let metrics = parse_output(&output.stdout);
        for line in &metrics.malformed {
            warn!("Unreadable throughput in {} output: {line}", self.name);
        }
        metrics.throughputs
    }
}

#[cfg(test)]
mod tests {
    use common::record::OperationMix;

    use super::*;

    fn point() -> ConfigPoint {
        ConfigPoint {
            tree_size: 1000,
            mix: OperationMix::new(80, 10, 10),
            threads: 4,
        }
    }

    #[test]
    fn args_pass_lookup_before_insert() {
        let bench = TreeBench::new("./bst_test".into(), "[tp]".to_owned(), None);
        assert_eq!(
            bench.args(&point(), 1996),
            ["[tp]", "1000", "4", "10", "80", "1996"]
        );
        assert_eq!(bench.name(), "bst_test");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let bench = TreeBench::new(
            "/nonexistent/tree-bench-binary".into(),
            "[tp]".to_owned(),
            None,
        );
        let err = bench.run(&point(), 1).await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failed_run() {
        let bench = TreeBench::new("false".into(), "[tp]".to_owned(), None);
        let err = bench.run(&point(), 1).await.unwrap_err();
        assert!(matches!(err, RunError::Failed { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let write_script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        let echo = write_script(
            "echo_bench",
            r#"echo "Tree size:$2"; echo "THREADS: $3 I: $5 R: 10 L: $4 MOPS: 2.5""#,
        );
        let sleepy = write_script("sleepy_bench", "sleep 5");

        let bench = TreeBench::new(echo, "[tp]".to_owned(), Some(Duration::from_secs(10)));
        let output = bench.run(&point(), 7).await.unwrap();
        assert!(output.stdout.contains("THREADS: 4 I: 80 R: 10 L: 10 MOPS: 2.5"));
        assert_eq!(bench.throughputs(&output), [2.5]);

        let bench = TreeBench::new(
            sleepy,
            "[tp]".to_owned(),
            Some(Duration::from_millis(200)),
        );
        let err = bench.run(&point(), 7).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
    }
}
