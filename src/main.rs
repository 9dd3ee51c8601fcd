use anyhow::Result;
use popmapper::{config::RunConfig, pipeline};
use std::{env, path::Path};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) resolve run configuration ────────────────────────────────
    let config = match env::args().nth(1) {
        Some(path) => RunConfig::from_yaml(Path::new(&path))?,
        None => RunConfig::default(),
    };
    info!(region = %config.region, out = %config.output_dir.display(), "configured");

    // ─── 3) run the export ───────────────────────────────────────────
    let summary = pipeline::run(&config)?;
    if !summary.missing_codes.is_empty() {
        warn!(codes = ?summary.missing_codes, "expected codes absent from this run");
    }
    info!(
        source = summary.source_rows,
        derived = summary.derived_rows,
        mapped = summary.mapped_rows,
        unmatched = summary.unmatched_rows,
        files = summary.files_written,
        "all done"
    );
    Ok(())
}
