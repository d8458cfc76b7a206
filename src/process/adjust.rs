use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::cpi::CpiSnapshot;
use crate::error::{PipelineError, Result};
use crate::process::PayrollRecord;

/// A payroll row augmented with its normalized year, numeric overtime pay,
/// and that pay restated in reference-year dollars.
///
/// Adjustment only appends: the embedded filtered record is never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedRecord {
    pub record: PayrollRecord,
    pub year: i32,
    pub overtime_pay: f64,
    pub adjusted_overtime: f64,
}

/// Plausibility bounds for a payroll calendar year; anything outside is
/// noise, not a year.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Extract the calendar year from the free-form year field.
///
/// Depending on export vintage the field holds "2009", "2009.0" or a full
/// date; all three shapes are accepted. Returns `None` for anything that
/// cannot be read as a year.
pub fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(year) = raw.parse::<i32>() {
        return YEAR_RANGE.contains(&year).then_some(year);
    }
    if let Ok(value) = raw.parse::<f64>() {
        if value.fract() == 0.0 {
            let year = value as i32;
            return YEAR_RANGE.contains(&year).then_some(year);
        }
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map(|date| date.year())
}

/// Coerce the overtime-pay field to a number.
///
/// Missing or unparseable pay means no overtime was paid, not missing data:
/// it defaults to zero rather than failing the row. Float syntax for
/// non-finite values ("NaN", "inf") defaults the same way, so neither NaN
/// nor infinity ever reaches the adjustment arithmetic or the artifact.
pub fn parse_pay(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Restate every row's overtime pay in the snapshot's reference-year
/// dollars.
///
/// Rows are independent, so they are adjusted on the rayon pool and the
/// collect reassembles results in original row order. The first unparseable
/// year or unresolvable CPI lookup fails the whole batch; a partially
/// adjusted table is never reported as complete.
#[instrument(
    level = "info",
    skip(table, cpi),
    fields(rows = table.len(), reference_year = cpi.reference_year())
)]
pub fn adjust_table(table: Vec<PayrollRecord>, cpi: &CpiSnapshot) -> Result<Vec<AdjustedRecord>> {
    let adjusted: Vec<AdjustedRecord> = table
        .into_par_iter()
        .enumerate()
        .map(|(row, record)| {
            let year = parse_year(&record.year).ok_or_else(|| PipelineError::Parse {
                row,
                value: record.year.clone(),
            })?;
            let overtime_pay = parse_pay(&record.overtime_pay);
            let adjusted_overtime = cpi.inflate(overtime_pay, year)?;
            Ok(AdjustedRecord {
                record,
                year,
                overtime_pay,
                adjusted_overtime,
            })
        })
        .collect::<Result<_>>()?;

    info!(rows = adjusted.len(), "adjusted overtime for inflation");
    Ok(adjusted)
}
