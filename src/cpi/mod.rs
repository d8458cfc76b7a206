//! Annual CPI-U index used to restate overtime pay in current dollars.
//!
//! The series is the BLS "all urban consumers, all items" index
//! (CUUR0000SA0). Its annual averages are published as `M13` rows in the
//! flat-file export; everything else in the download is ignored. A parsed
//! snapshot is cached on disk so repeated runs within a day do not hit BLS
//! at all.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;

const SERIES_URL: &str = "https://download.bls.gov/pub/time.series/cu/cu.data.1.AllItems";
const SERIES_ID: &str = "CUUR0000SA0";
const ANNUAL_PERIOD: &str = "M13";
const CACHE_FILE: &str = "cpi_u_annual.json";
const MAX_CACHE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// One parsed-and-dated copy of the annual CPI-U series.
///
/// The reference year is the newest year in the series, so "current
/// dollars" tracks whatever BLS has most recently published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpiSnapshot {
    by_year: BTreeMap<i32, f64>,
    reference_year: i32,
    fetched_at: DateTime<Utc>,
}

impl CpiSnapshot {
    pub fn from_series(by_year: BTreeMap<i32, f64>) -> anyhow::Result<Self> {
        let reference_year = *by_year.keys().next_back().context("CPI series is empty")?;
        Ok(Self {
            by_year,
            reference_year,
            fetched_at: Utc::now(),
        })
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn index_for(&self, year: i32) -> Option<f64> {
        self.by_year.get(&year).copied()
    }

    /// Restate `amount` from `from_year` dollars into reference-year
    /// dollars.
    ///
    /// The index ratio is computed first, so an amount already in
    /// reference-year dollars comes back bit-identical.
    pub fn inflate(&self, amount: f64, from_year: i32) -> crate::error::Result<f64> {
        let from = self
            .index_for(from_year)
            .ok_or(PipelineError::InflationUnavailable { year: from_year })?;
        let to = self
            .index_for(self.reference_year)
            .ok_or(PipelineError::InflationUnavailable {
                year: self.reference_year,
            })?;
        Ok(amount * (to / from))
    }
}

/// Return a current snapshot, downloading from BLS only when the on-disk
/// cache is older than a day.
#[instrument(level = "info", skip(client, cache_dir), fields(cache = %cache_dir.display()))]
pub async fn update(client: &Client, cache_dir: &Path) -> anyhow::Result<CpiSnapshot> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("creating CPI cache dir {}", cache_dir.display()))?;
    let cache_path = cache_dir.join(CACHE_FILE);

    if let Some(age) = cache_age(&cache_path) {
        if age < MAX_CACHE_AGE {
            debug!(age_secs = age.as_secs(), "CPI cache is fresh, skipping download");
            return load(cache_dir);
        }
    }

    let text = get_text_with_retry(client, SERIES_URL).await?;
    let by_year = parse_series(&text)?;
    let snapshot = CpiSnapshot::from_series(by_year)?;
    save(&snapshot, &cache_path)?;
    info!(
        years = snapshot.by_year.len(),
        reference_year = snapshot.reference_year,
        "refreshed CPI snapshot"
    );
    Ok(snapshot)
}

/// Read the cached snapshot without consulting BLS.
pub fn load(cache_dir: &Path) -> anyhow::Result<CpiSnapshot> {
    let cache_path = cache_dir.join(CACHE_FILE);
    let text = std::fs::read_to_string(&cache_path)
        .with_context(|| format!("reading CPI cache {}", cache_path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing CPI cache {}", cache_path.display()))
}

fn cache_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}

fn save(snapshot: &CpiSnapshot, cache_path: &Path) -> anyhow::Result<()> {
    // write-then-rename so a crash mid-write never leaves a torn cache
    let tmp = cache_path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, cache_path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}

/// Pull the annual rows for our series out of the BLS flat file.
///
/// The file is tab-separated with space-padded fields: series_id, year,
/// period, value, footnote_codes. Annual averages carry period `M13`.
fn parse_series(text: &str) -> anyhow::Result<BTreeMap<i32, f64>> {
    let mut by_year = BTreeMap::new();
    for line in text.lines().skip(1) {
        let mut fields = line.split('\t').map(str::trim);
        let (Some(series), Some(year), Some(period), Some(value)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if series != SERIES_ID || period != ANNUAL_PERIOD {
            continue;
        }
        let year: i32 = year
            .parse()
            .with_context(|| format!("bad year {year:?} in CPI series"))?;
        let value: f64 = value
            .parse()
            .with_context(|| format!("bad index value {value:?} for {year}"))?;
        by_year.insert(year, value);
    }
    if by_year.is_empty() {
        bail!("no annual {SERIES_ID} rows in CPI series download");
    }
    Ok(by_year)
}

async fn get_text(client: &Client, url: &str) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("bad status from {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("reading body of {url}"))
}

async fn get_text_with_retry(client: &Client, url: &str) -> anyhow::Result<String> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match get_text(client, url).await {
            Ok(text) => return Ok(text),
            Err(err) if attempts < MAX_RETRIES => {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempts - 1);
                warn!(
                    %url,
                    attempt = attempts,
                    backoff_ms = backoff,
                    error = %err,
                    "CPI download failed, retrying"
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
