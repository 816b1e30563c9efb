use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::iproduct;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::OperationMix;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read matrix file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse matrix file")]
    Parse(#[from] serde_yml::Error),
    #[error("The configuration matrix has no points")]
    Empty,
    #[error("The configuration matrix yields no samples per point (seeds or repetitions empty)")]
    NoSamples,
    #[error("Thread counts must be positive")]
    ZeroThreads,
}

/// The experiment matrix: every tree size is run with every mix and every
/// thread count, `repetitions` times per seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Matrix {
    pub tree_sizes: Vec<u64>,
    pub mixes: Vec<OperationMix>,
    pub threads: Vec<u32>,
    pub seeds: Vec<u64>,
    pub repetitions: usize,
    /// First positional argument handed to the executable
    pub mode_marker: String,
    pub timeout_secs: Option<u64>,
}

impl Default for Matrix {
    fn default() -> Self {
        Self {
            tree_sizes: vec![1_000_000, 10_000, 1_000],
            mixes: vec![
                OperationMix::new(0, 0, 100),
                OperationMix::new(10, 10, 80),
                OperationMix::new(50, 50, 0),
            ],
            threads: vec![1, 2, 4, 7, 14, 20, 24, 28],
            seeds: vec![1996, 1453, 1821],
            repetitions: 3,
            mode_marker: "[tp]".to_owned(),
            timeout_secs: None,
        }
    }
}

/// One (tree size, mix, thread count) triple of the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigPoint {
    pub tree_size: u64,
    pub mix: OperationMix,
    pub threads: u32,
}

impl Matrix {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yml::from_str(&data)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_sizes.is_empty() || self.mixes.is_empty() || self.threads.is_empty() {
            return Err(ConfigError::Empty);
        }
        if self.samples_per_point() == 0 {
            return Err(ConfigError::NoSamples);
        }
        if self.threads.contains(&0) {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }

    /// Points in run order: tree size, then mix, then thread count
    pub fn points(&self) -> Vec<ConfigPoint> {
        let mut threads = self.threads.clone();
        threads.sort_unstable();

        iproduct!(&self.tree_sizes, &self.mixes, threads)
            .map(|(&tree_size, &mix, threads)| ConfigPoint {
                tree_size,
                mix,
                threads,
            })
            .collect()
    }

    pub fn samples_per_point(&self) -> usize {
        self.seeds.len() * self.repetitions
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
