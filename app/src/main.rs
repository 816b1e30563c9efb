use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod bench;
mod plot;

const MODULES: &[&str] = &["common", "tree_bench", "scaling_basic"];

#[derive(Parser)]
#[command(version, about = "Drive concurrent tree benchmarks and chart their throughput")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the experiment matrix against a benchmark executable
    Bench {
        /// Benchmark executable
        executable: PathBuf,
        /// Matrix file, the built-in matrix is used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Kill runs that take longer than this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Render one scaling chart per operation mix.
    ///
    /// A log of several tree sizes puts all of them on the same curves;
    /// pick one with --tree-size.
    Plot {
        /// Result logs, standard input is read when none are given
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Do not draw the ideal scaling curve
        #[arg(long, default_value_t = false)]
        no_ideal: bool,
        /// Only plot records written for this tree size, recommended for
        /// logs holding several sizes
        #[arg(long)]
        tree_size: Option<u64>,
        /// Font file used for chart text
        #[arg(long)]
        font: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "mopsbench.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("mopsbench={log_level}"));

    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }

    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_ansi(false).with_writer(non_blocking))
        .init();

    match args.command {
        Commands::Bench {
            executable,
            config,
            timeout,
        } => {
            if let Err(err) =
                bench::run_benchmark(&executable, config.as_deref(), timeout, args.no_progress)
                    .await
            {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Plot {
            files,
            out_dir,
            no_ideal,
            tree_size,
            font,
        } => {
            let options = scaling_basic::RenderOptions {
                ideal: !no_ideal,
                font,
            };
            if let Err(err) = plot::plot(&files, &out_dir, tree_size, &options).await {
                error!("{err:#?}");
                return Err(err);
            }
        }
    };

    Ok(())
}
