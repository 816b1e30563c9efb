use std::{
    collections::BTreeMap,
    fs,
    ops::Range,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use common::{aggregate::Threaded, record::OperationMix};
use eyre::{Context, Result, bail};
use itertools::{Itertools, MinMaxResult};
use plotters::{
    prelude::*,
    style::{FontStyle, register_font},
};
use tracing::{debug, info, warn};

const WIDTH: u32 = 1300;
const HEIGHT: u32 = 800;

const TITLE_FONT_SIZE: u32 = 36;
const AXIS_LABEL_FONT_SIZE: u32 = 26;
const TICK_LABEL_FONT_SIZE: u32 = 18;
const LEGEND_FONT_SIZE: u32 = 22;
const FONT_FAMILY: &str = "sans-serif";

/// Records claiming more threads than this are left out of a chart
pub const MAX_PLOT_THREADS: u32 = 1 << 16;

pub const IDEAL_LABEL: &str = "ideal";
pub const MEASURED_LABEL: &str = "measured";

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

static TEXT_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Registers the first usable font, `explicit` first, then well known
/// system locations. Only the first call has an effect.
///
/// Returns whether charts can carry text (title, axis labels, legend).
pub fn init_fonts(explicit: Option<&Path>) -> bool {
    *TEXT_AVAILABLE.get_or_init(|| {
        let candidates = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            // registered fonts live for the rest of the process
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            match register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
                Ok(()) => {
                    debug!("Using font {}", path.display());
                    return true;
                }
                Err(_) => warn!("Unusable font {}", path.display()),
            }
        }

        warn!("No usable font found, charts are drawn without text");
        false
    })
}

/// One aggregated measurement as handed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub series: Option<String>,
    pub threads: u32,
    pub mops: f64,
}

impl Threaded for SeriesPoint {
    fn threads(&self) -> u32 {
        self.threads
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: Option<String>,
    pub points: Vec<(u32, f64)>,
}

impl Series {
    pub fn label(&self) -> &str {
        self.key.as_deref().unwrap_or(MEASURED_LABEL)
    }

    /// Throughput a perfectly scaling implementation would reach per thread.
    ///
    /// The single thread measurement when present, otherwise the per thread
    /// throughput of the lowest thread count.
    fn anchor(&self) -> Option<f64> {
        self.points
            .iter()
            .find(|(threads, _)| *threads == 1)
            .map(|&(_, mops)| mops)
            .or_else(|| {
                self.points
                    .iter()
                    .find(|(threads, _)| *threads > 0)
                    .map(|&(threads, mops)| mops / threads as f64)
            })
    }
}

/// `t * anchor` for every thread count `t` in `1..=max_threads`
pub fn ideal_curve(anchor: f64, max_threads: u32) -> Vec<(u32, f64)> {
    (1..=max_threads)
        .map(|threads| (threads, threads as f64 * anchor))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisBounds {
    pub x: Range<u32>,
    pub y: Range<f64>,
}

/// Everything drawn on the chart of one operation mix
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingChart {
    pub mix: OperationMix,
    pub series: Vec<Series>,
    pub ideal: Option<Vec<(u32, f64)>>,
}

impl ScalingChart {
    /// Splits `points` into one series per key. Series are ranked by their
    /// position in `order`, unknown keys last; the first series anchors the
    /// ideal curve.
    pub fn build(
        mix: OperationMix,
        points: &[SeriesPoint],
        order: &[Option<String>],
        ideal: bool,
    ) -> Result<Self> {
        let skipped = points
            .iter()
            .filter(|point| point.threads > MAX_PLOT_THREADS)
            .count();
        if skipped > 0 {
            warn!("Leaving out {skipped} points of {mix} with more than {MAX_PLOT_THREADS} threads");
        }
        let points = points
            .iter()
            .filter(|point| point.threads <= MAX_PLOT_THREADS)
            .collect::<Vec<_>>();
        if points.is_empty() {
            bail!("No data points for {mix}");
        }

        let mut series = points
            .iter()
            .map(|point| &point.series)
            .unique()
            .map(|key| {
                let mut points = points
                    .iter()
                    .filter(|point| &point.series == key)
                    .map(|point| (point.threads, point.mops))
                    .collect::<Vec<_>>();
                points.sort_by_key(|(threads, _)| *threads);
                Series {
                    key: key.clone(),
                    points,
                }
            })
            .collect::<Vec<_>>();
        series.sort_by_key(|s| {
            order
                .iter()
                .position(|key| *key == s.key)
                .unwrap_or(usize::MAX)
        });

        let max_threads = points.iter().map(|p| p.threads).max().unwrap_or(1);
        let ideal = if ideal {
            let anchor = series.first().and_then(Series::anchor);
            if anchor.is_none() {
                warn!("No usable anchor for the ideal curve of {mix}");
            }
            anchor.map(|anchor| ideal_curve(anchor, max_threads))
        } else {
            None
        };

        Ok(Self { mix, series, ideal })
    }

    pub fn filename(&self) -> String {
        format!("{}.png", self.mix.file_stem())
    }

    pub fn title(&self) -> String {
        format!("Throughput in MOPS - {}", self.mix)
    }

    fn coords(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.series
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .chain(self.ideal.iter().flatten().copied())
    }

    /// Bounds covering every measured point and the ideal curve
    pub fn axis_bounds(&self) -> AxisBounds {
        let x = match self.coords().map(|(threads, _)| threads).minmax() {
            MinMaxResult::NoElements => 0..1,
            MinMaxResult::OneElement(threads) => {
                threads.saturating_sub(1)..threads.saturating_add(1)
            }
            MinMaxResult::MinMax(min, max) if min == max => {
                min.saturating_sub(1)..max.saturating_add(1)
            }
            MinMaxResult::MinMax(min, max) => min..max,
        };

        let (y_min, y_max) = self
            .coords()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, mops)| {
                (lo.min(mops), hi.max(mops))
            });
        if !y_min.is_finite() || !y_max.is_finite() {
            return AxisBounds { x, y: 0.0..1.0 };
        }

        let span = y_max - y_min;
        let pad = if span > 0.0 {
            span * 0.05
        } else if y_max > 0.0 {
            y_max * 0.05
        } else {
            1.0
        };
        let mut lower = y_min - pad;
        if y_min >= 0.0 {
            lower = lower.max(0.0);
        }

        AxisBounds {
            x,
            y: lower..y_max + pad,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Overlay the ideal scaling curve
    pub ideal: bool,
    /// Font file tried before the system locations
    pub font: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            ideal: true,
            font: None,
        }
    }
}

/// Draws `chart` to `out_dir/<insert>-<remove>-<lookup>.png`
pub fn render(chart: &ScalingChart, out_dir: &Path, text: bool) -> Result<PathBuf> {
    let path = out_dir.join(chart.filename());
    let bounds = chart.axis_bounds();
    debug!("Rendering {} with bounds {bounds:?}", path.display());

    let target = path.clone();
    let root = BitMapBackend::new(&target, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(25);
    if text {
        builder
            .caption(chart.title(), (FONT_FAMILY, TITLE_FONT_SIZE))
            .x_label_area_size(70)
            .y_label_area_size(90);
    }
    let mut ctx = builder.build_cartesian_2d(bounds.x.clone(), bounds.y.clone())?;

    if text {
        let x_ticks = bounds
            .x
            .end
            .saturating_sub(bounds.x.start)
            .saturating_add(1)
            .min(30) as usize;
        ctx.configure_mesh()
            .x_labels(x_ticks)
            .y_labels(20)
            .x_desc("Thread count")
            .y_desc("MOPS")
            .label_style((FONT_FAMILY, TICK_LABEL_FONT_SIZE))
            .axis_desc_style((FONT_FAMILY, AXIS_LABEL_FONT_SIZE))
            .draw()?;
    }

    for (idx, series) in chart.series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        ctx.draw_series(LineSeries::new(
            series.points.iter().copied(),
            color.stroke_width(3),
        ))?
        .label(series.label())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3)));
        ctx.draw_series(
            series
                .points
                .iter()
                .map(|&coord| Cross::new(coord, 7, color.stroke_width(2))),
        )?;
    }

    if let Some(ideal) = &chart.ideal {
        ctx.draw_series(LineSeries::new(
            ideal.iter().copied(),
            BLACK.stroke_width(2),
        ))?
        .label(IDEAL_LABEL)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));
        ctx.draw_series(
            ideal
                .iter()
                .map(|&coord| Circle::new(coord, 4, BLACK.filled())),
        )?;
    }

    if text {
        ctx.configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .label_font((FONT_FAMILY, LEGEND_FONT_SIZE))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()
        .wrap_err_with(|| format!("Failed to write chart {}", path.display()))?;
    Ok(path)
}

/// Renders one chart per operation mix, one after the other
pub fn render_all(
    groups: &BTreeMap<OperationMix, Vec<SeriesPoint>>,
    order: &[Option<String>],
    options: &RenderOptions,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .wrap_err_with(|| format!("Failed to create {}", out_dir.display()))?;
    let text = init_fonts(options.font.as_deref());

    let mut written = Vec::with_capacity(groups.len());
    for (mix, points) in groups {
        let chart = ScalingChart::build(*mix, points, order, options.ideal)?;
        let path = render(&chart, out_dir, text)?;
        info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
