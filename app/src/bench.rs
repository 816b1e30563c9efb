use std::path::Path;

use chrono::Local;
use common::{
    aggregate::PointCollector,
    bench::{Bench, RunError},
    config::{ConfigPoint, Matrix},
    record::{TREE_SIZE_BANNER, format_mops},
    util::run_log_name,
};
use eyre::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{
    fs::{File, metadata},
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, error, info, instrument, warn};
use tree_bench::TreeBench;

const PROGRESS_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}";

/// Counts of one pass over the matrix
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriveSummary {
    pub points: usize,
    pub records: usize,
    pub empty: usize,
    pub failed_runs: usize,
}

pub async fn run_benchmark(
    executable: &Path,
    config: Option<&Path>,
    timeout: Option<u64>,
    no_progress: bool,
) -> Result<DriveSummary> {
    let mut matrix = match config {
        Some(path) => Matrix::load(path)
            .wrap_err_with(|| format!("Failed to load matrix {}", path.display()))?,
        None => Matrix::default(),
    };
    if timeout.is_some() {
        matrix.timeout_secs = timeout;
    }
    matrix.validate()?;

    let info = metadata(executable)
        .await
        .wrap_err_with(|| format!("Benchmark executable {} not found", executable.display()))?;
    if !info.is_file() {
        bail!("Benchmark executable {} is not a file", executable.display());
    }

    let bench = TreeBench::new(
        executable.to_path_buf(),
        matrix.mode_marker.clone(),
        matrix.timeout(),
    );
    let log_path = run_log_name(executable);
    let mut log = File::create(&log_path)
        .await
        .wrap_err_with(|| format!("Failed to create {log_path}"))?;
    info!(
        "Writing results of {} to {log_path}, started {}",
        bench.program().display(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let summary = drive(&bench, &matrix, &mut log, no_progress).await?;
    info!("Finished {summary:?}");
    if summary.failed_runs > 0 || summary.empty > 0 {
        warn!(
            "{} runs failed, {} points produced no results",
            summary.failed_runs, summary.empty
        );
    }
    Ok(summary)
}

/// Runs every point of `matrix` in order, one process at a time, and writes
/// the aggregated lines to stdout and `log`.
pub async fn drive<W>(
    bench: &dyn Bench,
    matrix: &Matrix,
    log: &mut W,
    no_progress: bool,
) -> Result<DriveSummary>
where
    W: AsyncWrite + Unpin,
{
    let points = matrix.points();
    if points.is_empty() {
        bail!("The configuration matrix has no points");
    }

    let mut summary = DriveSummary::default();
    let mut tree_size = None;
    for point in &points {
        if tree_size != Some(point.tree_size) {
            tree_size = Some(point.tree_size);
            emit(log, &format!("{TREE_SIZE_BANNER}{}", point.tree_size)).await?;
        }

        let (collector, failed) = run_point(bench, matrix, point, no_progress).await;
        summary.points += 1;
        summary.failed_runs += failed;

        match collector.finish() {
            Ok(record) => {
                emit(log, &record.to_string()).await?;
                let spread = record.max_spread.unwrap_or_default();
                emit(log, &format!("Max diff: {} MOPS", format_mops(spread))).await?;
                summary.records += 1;
            }
            Err(err) => {
                error!("{err}");
                emit(
                    log,
                    &format!("No results: THREADS: {} {}", point.threads, point.mix),
                )
                .await?;
                summary.empty += 1;
            }
        }
    }

    Ok(summary)
}

#[instrument(skip(bench, matrix), fields(bench = bench.name()))]
async fn run_point(
    bench: &dyn Bench,
    matrix: &Matrix,
    point: &ConfigPoint,
    no_progress: bool,
) -> (PointCollector, usize) {
    let bar = progress_bar(matrix.samples_per_point() as u64, no_progress);
    bar.set_message(format!(
        "size {} threads {} {}",
        point.tree_size, point.threads, point.mix
    ));

    let mut collector = PointCollector::new(point.mix, point.threads);
    let mut failed = 0;
    for &seed in &matrix.seeds {
        collector.start_batch();
        for repetition in 0..matrix.repetitions {
            match bench.run(point, seed).await {
                Ok(output) => {
                    let throughputs = bench.throughputs(&output);
                    if throughputs.is_empty() {
                        warn!(seed, repetition, "Run reported no throughput");
                    }
                    for mops in throughputs {
                        collector.push(mops);
                    }
                }
                Err(RunError::Failed { code, output }) => {
                    failed += 1;
                    warn!(
                        seed,
                        repetition,
                        "Run failed with {code:?}\nstdout:\n{}\nstderr:\n{}",
                        output.stdout.trim_end(),
                        output.stderr.trim_end()
                    );
                }
                Err(err) => {
                    failed += 1;
                    warn!(seed, repetition, "Run failed: {err:?}");
                }
            }
            bar.inc(1);
        }
    }
    bar.finish_and_clear();

    debug!(
        samples = collector.len(),
        spread = collector.max_spread(),
        "Point done"
    );
    (collector, failed)
}

fn progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        Ok(style) => bar.set_style(style),
        Err(err) => debug!("Invalid progress template: {err}"),
    }
    bar
}

async fn emit<W: AsyncWrite + Unpin>(log: &mut W, line: &str) -> Result<()> {
    println!("{line}");
    log.write_all(line.as_bytes()).await?;
    log.write_all(b"\n").await?;
    log.flush().await?;
    Ok(())
}
