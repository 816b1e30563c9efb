use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use common::{
    aggregate::fold,
    record::{LogContents, TaggedRecord, read_log},
    util::series_key,
};
use eyre::{Context, Result, bail};
use scaling_basic::{RenderOptions, SeriesPoint, render_all};
use tokio::{
    fs::read,
    io::{AsyncRead, AsyncReadExt, stdin},
};
use tracing::{debug, warn};

/// Reads the given logs, or standard input when there are none, and writes
/// one chart per operation mix into `out_dir`.
pub async fn plot(
    files: &[PathBuf],
    out_dir: &Path,
    tree_size: Option<u64>,
    options: &RenderOptions,
) -> Result<Vec<PathBuf>> {
    let (contents, order) = read_inputs(files, stdin()).await?;
    let written = plot_contents(contents, &order, tree_size, options, out_dir)?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(written)
}

/// Collects the records of `files`, or of `input` when no file is given,
/// along with the series keys in file order.
pub async fn read_inputs<R>(
    files: &[PathBuf],
    mut input: R,
) -> Result<(LogContents, Vec<Option<String>>)>
where
    R: AsyncRead + Unpin,
{
    let mut contents = LogContents::default();
    let mut order = Vec::new();

    if files.is_empty() {
        let mut data = Vec::new();
        input
            .read_to_end(&mut data)
            .await
            .wrap_err("Failed to read standard input")?;
        contents.extend(read_log(data.as_slice(), None)?);
        order.push(None);
        return Ok((contents, order));
    }

    for file in files {
        let data = read(file)
            .await
            .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
        let key = series_key(file);
        debug!("Reading {} as series {key}", file.display());
        contents.extend(read_log(data.as_slice(), Some(&key))?);

        let key = Some(key);
        if !order.contains(&key) {
            order.push(key);
        }
    }
    Ok((contents, order))
}

pub fn plot_contents(
    contents: LogContents,
    order: &[Option<String>],
    tree_size: Option<u64>,
    options: &RenderOptions,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    if !contents.malformed.is_empty() {
        warn!("Skipped {} malformed result lines", contents.malformed.len());
    }
    if contents.records.is_empty() {
        bail!("No parseable result lines found");
    }

    let records = contents
        .records
        .into_iter()
        .filter(|r| tree_size.is_none_or(|size| r.tree_size == Some(size)))
        .collect::<Vec<TaggedRecord>>();
    if records.is_empty() {
        bail!("No result lines for tree size {}", tree_size.unwrap_or_default());
    }

    let sizes = records
        .iter()
        .filter_map(|r| r.tree_size)
        .collect::<BTreeSet<_>>();
    if sizes.len() > 1 {
        warn!("Plotting records of tree sizes {sizes:?} together, select one with --tree-size");
    }

    let groups: BTreeMap<_, Vec<SeriesPoint>> = fold(records, |r| r.record.mix)
        .into_iter()
        .map(|(mix, records)| {
            let points = records
                .into_iter()
                .map(|r| SeriesPoint {
                    series: r.series,
                    threads: r.record.threads,
                    mops: r.record.mean,
                })
                .collect();
            (mix, points)
        })
        .collect();

    render_all(&groups, order, options, out_dir)
}
