extern crate clap;
extern crate failure;
extern crate mbr;
extern crate serde_json;
extern crate tracing;
extern crate tracing_subscriber;

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mbr::config::Config;
use mbr::datasets::load_transactions;
use mbr::pipeline;

/// Evaluate market-basket recommenders over a hyperparameter grid.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Product catalog CSV (`product_id,product_name,...`).
    #[arg(long)]
    products: PathBuf,
    /// Order lines CSV (`order_id,product_id,...`).
    #[arg(long)]
    order_lines: PathBuf,
    /// JSON configuration; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the JSON results.
    #[arg(long, default_value = "grid_results.json")]
    output: PathBuf,
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    let start = Instant::now();
    let loaded = load_transactions(&args.products, &args.order_lines, config.missing_products)?;
    let (prepared, report) = pipeline::run(&loaded.transactions, &config)?;

    let output = serde_json::json!({
        "dropped_order_lines": loaded.dropped_lines,
        "popular_items": prepared.profile.num_popular(),
        "sample": {
            "requested": prepared.sample.requested,
            "available_orders": prepared.sample.available_orders,
            "sampled_orders": prepared.sample.sampled_orders,
            "retained_baskets": prepared.sample.baskets.len(),
            "dropped_small_baskets": prepared.sample.dropped_small_baskets,
            "dropped_transactions": prepared.sample.dropped_transactions,
        },
        "matrix": {
            "rows": prepared.matrix.num_rows(),
            "columns": prepared.matrix.num_items(),
            "density": prepared.matrix.density(),
        },
        "table": report.table(),
        "runs": report.runs,
    });

    serde_json::to_writer_pretty(File::create(&args.output)?, &output)?;

    for (id, run) in &report.runs {
        for failure in run.report.failures() {
            info!(point = %id, error = %failure, "Algorithm failed at grid point");
        }
    }

    info!(
        output = %args.output.display(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "Wrote grid results"
    );

    Ok(())
}
