//! Mirror one device's archive into a local SQLite file, then page through it.
//!
//! Run with:
//! `cargo run -p mirror-cli -- --config mirror.toml --device 7 --begin 2024-03-01T08:00:00 --end 2024-03-02T08:00:00`
//!
//! Press Ctrl-C during the refresh to cancel it; rows already persisted stay.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::Parser;
use telemetry_mirror_core::MirrorConfig;
use telemetry_mirror_executor::driver::MySqlDriver;
use telemetry_mirror_paging::PagedView;
use telemetry_mirror_session::{
    RefreshError, RefreshOrchestrator, TelemetrySample, storage::SqliteStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mirror-cli", version, about)]
struct Args {
    /// TOML configuration file; `MIRROR_*` variables override it.
    #[arg(short = 'c', long = "config", env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database holding mirrored rows.
    #[arg(long = "database", env = "MIRROR_DATABASE", default_value = "sqlite://mirror.db")]
    database: String,

    /// Device (object) id to refresh.
    #[arg(short = 'd', long = "device")]
    device: i32,

    /// Range start, e.g. 2024-03-01T08:00:00.
    #[arg(long = "begin")]
    begin: NaiveDateTime,

    /// Range end (exclusive).
    #[arg(long = "end")]
    end: NaiveDateTime,

    /// Pages to print after the refresh.
    #[arg(long = "pages", default_value_t = 3)]
    pages: usize,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MirrorConfig> {
    let mut config = match path {
        Some(path) => MirrorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MirrorConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let page_size = config.page_size;
    let initial_load_size = config.initial_load_size;

    let store = SqliteStore::<TelemetrySample>::open(&args.database)
        .await
        .with_context(|| format!("opening {}", args.database))?;
    let orchestrator = Arc::new(RefreshOrchestrator::new(config, MySqlDriver, Arc::new(store)));

    let device = args.device;
    let interrupt = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel(device);
            }
        }
    });

    let result = orchestrator.refresh_between(device, args.begin, args.end).await;
    interrupt.abort();
    match result {
        Ok(report) => tracing::info!(
            outcome = ?report.outcome,
            batches = report.batches,
            rows = report.rows,
            "refresh done"
        ),
        Err(e) if e.is_connectivity() => {
            tracing::error!(error = %e, "refresh failed, check the connection");
        }
        Err(RefreshError::InvalidRange { begin, end }) => {
            anyhow::bail!("choose a range where {end} is after {begin}");
        }
        Err(e) => return Err(e.into()),
    }

    let mut view = PagedView::new(Arc::clone(orchestrator.pages()), page_size);
    let window = view.initial(0, initial_load_size).await?;
    println!("{} rows mirrored", window.total_count);
    for sample in &window.items {
        print_sample(sample);
    }
    let first_page = window.items.len().div_ceil(page_size);
    for index in first_page..first_page + args.pages.saturating_sub(1) {
        let rows = view.page(index).await?;
        if rows.is_empty() {
            break;
        }
        println!("-- page {index}");
        for sample in &rows {
            print_sample(sample);
        }
    }
    Ok(())
}

fn print_sample(sample: &TelemetrySample) {
    let marker = if sample.is_alarm() { "!" } else { " " };
    println!(
        "{marker} {} #{:<6} {}",
        sample.value_date_time, sample.parameters_list_id, sample.param_value
    );
}
