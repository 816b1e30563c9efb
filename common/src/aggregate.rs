use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::record::{AggregatedRecord, OperationMix, RunPoint, TaggedRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("No successful runs for THREADS: {threads} {mix}")]
    EmptyGroup { mix: OperationMix, threads: u32 },
}

/// Anything that can be ordered along the thread count axis
pub trait Threaded {
    fn threads(&self) -> u32;
}

impl Threaded for RunPoint {
    fn threads(&self) -> u32 {
        self.threads
    }
}

impl Threaded for AggregatedRecord {
    fn threads(&self) -> u32 {
        self.threads
    }
}

impl Threaded for TaggedRecord {
    fn threads(&self) -> u32 {
        self.record.threads
    }
}

/// Groups `items` by `key_of`.
///
/// Each group comes back stably sorted by thread count, so equal thread
/// counts keep their input order.
pub fn fold<T, K, I, F>(items: I, mut key_of: F) -> BTreeMap<K, Vec<T>>
where
    T: Threaded,
    K: Ord,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(key_of(&item)).or_default().push(item);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|item| item.threads());
    }
    groups
}

/// Mean, min and max throughput of one configuration point
pub fn summarize(
    mix: OperationMix,
    threads: u32,
    points: &[RunPoint],
) -> Result<AggregatedRecord, AggregateError> {
    if points.is_empty() {
        return Err(AggregateError::EmptyGroup { mix, threads });
    }

    let (sum, min, max) = points.iter().fold(
        (0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(sum, min, max), point| (sum + point.mops, min.min(point.mops), max.max(point.mops)),
    );

    Ok(AggregatedRecord {
        mix,
        threads,
        mean: sum / points.len() as f64,
        min: Some(min),
        max: Some(max),
        max_spread: None,
    })
}

/// Collects the runs of one configuration point, batch by batch.
///
/// A batch holds the repetitions of a single seed. The largest max - min
/// seen inside any one batch is kept as the spread of the point.
#[derive(Debug, Clone)]
pub struct PointCollector {
    mix: OperationMix,
    threads: u32,
    points: Vec<RunPoint>,
    batch: Option<(f64, f64)>,
    max_spread: f64,
}

impl PointCollector {
    pub fn new(mix: OperationMix, threads: u32) -> Self {
        Self {
            mix,
            threads,
            points: Vec::new(),
            batch: None,
            max_spread: 0.0,
        }
    }

    pub fn start_batch(&mut self) {
        self.batch = None;
    }

    pub fn push(&mut self, mops: f64) {
        let (min, max) = match self.batch {
            Some((min, max)) => (min.min(mops), max.max(mops)),
            None => (mops, mops),
        };
        self.batch = Some((min, max));
        self.max_spread = self.max_spread.max(max - min);
        self.points.push(RunPoint::new(self.threads, mops));
        trace!(mops, spread = self.max_spread, "Collected run");
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_spread(&self) -> f64 {
        self.max_spread
    }

    pub fn finish(self) -> Result<AggregatedRecord, AggregateError> {
        let mut record = summarize(self.mix, self.threads, &self.points)?;
        record.max_spread = Some(self.max_spread);
        Ok(record)
    }
}
