use std::{
    fmt,
    io::{self, BufRead},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Every result line starts with this token, anything else is passed through
pub const RECORD_PREFIX: &str = "THREADS: ";
/// Banner written by the driver before the runs of each tree size
pub const TREE_SIZE_BANNER: &str = "Start of tests for tree size: ";

static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^THREADS: ([0-9]+) I: ([0-9]+) R: ([0-9]+) L: ([0-9]+) MOPS: ([0-9]+\.[0-9]+)$",
    )
    .expect("record pattern is a valid regex")
});

/// Percentage split between insert, remove and lookup operations.
///
/// The shares conventionally sum to 100, which is not enforced. Field order
/// matches the `I: R: L:` labels of a result line.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(deny_unknown_fields)]
pub struct OperationMix {
    pub insert: u32,
    pub remove: u32,
    pub lookup: u32,
}

impl OperationMix {
    pub const fn new(insert: u32, remove: u32, lookup: u32) -> Self {
        Self {
            insert,
            remove,
            lookup,
        }
    }

    /// Chart file stem, `{insert}-{remove}-{lookup}`
    pub fn file_stem(&self) -> String {
        format!("{}-{}-{}", self.insert, self.remove, self.lookup)
    }
}

impl fmt::Display for OperationMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I: {} R: {} L: {}", self.insert, self.remove, self.lookup)
    }
}

/// Throughput of a single successful repetition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunPoint {
    pub threads: u32,
    pub mops: f64,
}

impl RunPoint {
    pub const fn new(threads: u32, mops: f64) -> Self {
        Self { threads, mops }
    }
}

/// Folded measurements of one configuration point.
///
/// Only `mix`, `threads` and `mean` are persisted; the remaining statistics
/// are known to the driver that collected the runs and are `None` for
/// records read back from a log.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub mix: OperationMix,
    pub threads: u32,
    pub mean: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_spread: Option<f64>,
}

impl AggregatedRecord {
    pub fn new(mix: OperationMix, threads: u32, mean: f64) -> Self {
        Self {
            mix,
            threads,
            mean,
            min: None,
            max: None,
            max_spread: None,
        }
    }
}

/// Formats a throughput so that it always carries a fractional part
pub fn format_mops(value: f64) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

impl fmt::Display for AggregatedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RECORD_PREFIX}{} {} MOPS: {}",
            self.threads,
            self.mix,
            format_mops(self.mean)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line does not match the result record format: {line:?}")]
pub struct NoMatch {
    pub line: String,
}

/// Whether a line is meant to be a result record
pub fn is_candidate(line: &str) -> bool {
    line.starts_with(RECORD_PREFIX)
}

/// Parses one result line
pub fn parse_line(line: &str) -> Result<AggregatedRecord, NoMatch> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let no_match = || NoMatch {
        line: trimmed.to_owned(),
    };

    let caps = RECORD_RE.captures(trimmed).ok_or_else(no_match)?;
    let int = |idx: usize| -> Result<u32, NoMatch> {
        caps[idx].parse::<u32>().map_err(|_| no_match())
    };
    let threads = int(1)?;
    let mix = OperationMix::new(int(2)?, int(3)?, int(4)?);
    let mean = caps[5].parse::<f64>().map_err(|_| no_match())?;

    Ok(AggregatedRecord::new(mix, threads, mean))
}

impl FromStr for AggregatedRecord {
    type Err = NoMatch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s)
    }
}

/// A record read back from a log together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord {
    pub series: Option<String>,
    pub tree_size: Option<u64>,
    pub record: AggregatedRecord,
}

#[derive(Debug, Default)]
pub struct LogContents {
    pub records: Vec<TaggedRecord>,
    pub malformed: Vec<NoMatch>,
}

impl LogContents {
    pub fn extend(&mut self, other: LogContents) {
        self.records.extend(other.records);
        self.malformed.extend(other.malformed);
    }
}

/// Reads every result record of a log.
///
/// Lines that are not record candidates are skipped silently, except for
/// tree size banners which tag the records that follow them. Candidates that
/// fail to parse are reported and collected in [`LogContents::malformed`].
/// Bytes that are not valid UTF-8 only spoil the line they appear on.
pub fn read_log<R: BufRead>(reader: R, series: Option<&str>) -> io::Result<LogContents> {
    let mut contents = LogContents::default();
    let mut tree_size = None;

    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(line.strip_suffix(b"\r").unwrap_or(&line[..]));
        if let Some(size) = line.strip_prefix(TREE_SIZE_BANNER) {
            tree_size = size.trim().parse::<u64>().ok();
            if tree_size.is_none() {
                warn!("Unreadable tree size banner: {line}");
            }
            continue;
        }
        if !is_candidate(&line) {
            continue;
        }

        match parse_line(&line) {
            Ok(record) => contents.records.push(TaggedRecord {
                series: series.map(str::to_owned),
                tree_size,
                record,
            }),
            Err(err) => {
                warn!("Skipping malformed record: {}", err.line);
                contents.malformed.push(err);
            }
        }
    }

    debug!(
        series = series.unwrap_or("-"),
        records = contents.records.len(),
        malformed = contents.malformed.len(),
        "Read result log"
    );
    Ok(contents)
}
