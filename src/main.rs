use anyhow::{bail, Result};
use payscraper::{cpi, fetch, output, process};
use reqwest::Client;
use std::{env, fs, path::PathBuf, sync::Arc};
use tokio::{sync::Semaphore, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configure dirs + http client ─────────────────────────────
    let source_dir = dir_from_env("PAYROLL_SOURCE_DIR", "data/source");
    let out_dir = dir_from_env("PAYROLL_OUT_DIR", "data/processed");
    let cpi_dir = dir_from_env("PAYROLL_CPI_DIR", "data/cpi");

    for d in [&source_dir, &out_dir, &cpi_dir] {
        fs::create_dir_all(d)?;
    }

    let client = Client::builder()
        .user_agent(concat!("payscraper/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // ─── 3) refresh CPI snapshot ─────────────────────────────────────
    let cpi_snapshot = cpi::update(&client, &cpi_dir).await?;
    info!(
        reference_year = cpi_snapshot.reference_year(),
        fetched_at = %cpi_snapshot.fetched_at(),
        "CPI snapshot ready"
    );

    // ─── 4) download + unpack raw exports ────────────────────────────
    let urls = fetch::urls::all_export_urls();
    info!(archives = urls.len(), "downloading raw exports");

    let dl_sem = Arc::new(Semaphore::new(3));
    let mut dl_handles = Vec::with_capacity(urls.len());

    for url in urls {
        let client = client.clone();
        let source_dir = source_dir.clone();
        let sem = dl_sem.clone();

        dl_handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await?;
            info!(%url, "downloading");
            let start = Instant::now();
            let bytes = fetch::zips::download_export(&client, &url).await?;

            // unzipping is blocking work; keep it off the async threads
            let files = tokio::task::spawn_blocking({
                let url = url.clone();
                move || fetch::zips::unpack_export(&bytes, &source_dir, &url)
            })
            .await??;

            info!(%url, files = files.len(), elapsed = ?start.elapsed(), "unpacked");
            anyhow::Ok(())
        }));
    }

    // fail the run on the first archive that cannot be retrieved
    for handle in dl_handles {
        handle.await??;
    }

    // ─── 5) aggregate firefighter rows ───────────────────────────────
    let files = process::discover_source_files(&source_dir)?;
    if files.is_empty() {
        bail!("no source files under {}", source_dir.display());
    }
    let table = tokio::task::spawn_blocking(move || process::aggregate_files(&files)).await??;

    // ─── 6) adjust overtime for inflation ────────────────────────────
    let adjusted = tokio::task::spawn_blocking({
        let snapshot = cpi_snapshot.clone();
        move || process::adjust_table(table, &snapshot)
    })
    .await??;

    // ─── 7) write the artifact ───────────────────────────────────────
    let out_path = out_dir.join("ff_payroll.csv");
    output::write_csv(&adjusted, &out_path)?;

    info!(rows = adjusted.len(), out = %out_path.display(), "all done");
    Ok(())
}

fn dir_from_env(var: &str, default: &str) -> PathBuf {
    env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
