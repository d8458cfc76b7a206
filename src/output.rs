use std::fs;
use std::path::Path;

use tracing::{info, instrument};

use crate::error::Result;
use crate::process::AdjustedRecord;

/// Column order of the written artifact: the seven source columns,
/// lowercased, plus the adjusted overtime appended at the end.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    "year",
    "employertype",
    "employercounty",
    "employername",
    "departmentorsubdivision",
    "position",
    "overtimepay",
    "adjusted_overtime",
];

/// Write the adjusted table as a single CSV artifact.
///
/// The file is written to a sibling tmp path and renamed into place, so a
/// crash mid-write never leaves a half-formed artifact where downstream
/// consumers look for it. Numeric columns are formatted with Rust's
/// shortest round-trip float notation.
#[instrument(
    level = "info",
    skip(records, out_path),
    fields(rows = records.len(), out = %out_path.display())
)]
pub fn write_csv(records: &[AdjustedRecord], out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = out_path.with_extension("csv.tmp");

    let mut writer = csv::Writer::from_path(&tmp)?;
    writer.write_record(OUTPUT_COLUMNS)?;
    for adjusted in records {
        writer.write_record([
            adjusted.year.to_string(),
            adjusted.record.employer_type.clone(),
            adjusted.record.employer_county.clone(),
            adjusted.record.employer_name.clone(),
            adjusted.record.department_or_subdivision.clone(),
            adjusted.record.position.clone(),
            adjusted.overtime_pay.to_string(),
            adjusted.adjusted_overtime.to_string(),
        ])?;
    }
    writer.flush()?;
    fs::rename(&tmp, out_path)?;

    info!("wrote firefighter payroll artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpi::CpiSnapshot;
    use crate::process::{adjust_table, aggregate_files, discover_source_files};
    use anyhow::{Context, Result};
    use std::collections::BTreeMap;

    const HEADER: &str =
        "Year,EmployerType,EmployerCounty,EmployerName,DepartmentOrSubdivision,Position,OvertimePay";

    #[test]
    fn pipeline_produces_the_artifact_end_to_end() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        fs::create_dir_all(&source)?;
        fs::write(
            source.join("2010_City.csv"),
            format!(
                "{HEADER}\n\
                 2010-01-01,City,Alameda,Oakland,Fire,1ST FIRE FIGHTER,100\n\
                 2010-01-01,City,Alameda,Oakland,Fire,CAPTAIN,50\n"
            ),
        )?;
        let cpi = CpiSnapshot::from_series(BTreeMap::from([(2010, 218.056), (2020, 258.811)]))?;

        let files = discover_source_files(&source)?;
        let table = aggregate_files(&files)?;
        let adjusted = adjust_table(table, &cpi)?;
        let out = dir.path().join("processed").join("ff_payroll.csv");
        write_csv(&adjusted, &out)?;

        let written = fs::read_to_string(&out)?;
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some(
                "year,employertype,employercounty,employername,\
                 departmentorsubdivision,position,overtimepay,adjusted_overtime"
            )
        );
        let row: Vec<&str> = lines.next().context("missing data row")?.split(',').collect();
        assert_eq!(row[0], "2010");
        assert_eq!(row[1], "City");
        assert_eq!(row[2], "Alameda");
        assert_eq!(row[3], "Oakland");
        assert_eq!(row[4], "Fire");
        assert_eq!(row[5], "FIRE FIGHTER");
        assert_eq!(row[6].parse::<f64>()?, 100.0);
        let expected = 100.0 * (258.811 / 218.056);
        assert!((row[7].parse::<f64>()? - expected).abs() < 1e-9);
        // the captain row was filtered out, nothing else follows
        assert_eq!(lines.next(), None);
        assert!(!out.with_extension("csv.tmp").exists());
        Ok(())
    }

    #[test]
    fn blank_overtime_lands_as_zero_in_the_artifact() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        fs::create_dir_all(&source)?;
        fs::write(
            source.join("2020_County.csv"),
            format!("{HEADER}\n2020,County,Kern,Kern County,Fire,FIREFIGHTER,\n"),
        )?;
        let cpi = CpiSnapshot::from_series(BTreeMap::from([(2020, 258.811)]))?;

        let table = aggregate_files(&discover_source_files(&source)?)?;
        let adjusted = adjust_table(table, &cpi)?;
        let out = dir.path().join("ff_payroll.csv");
        write_csv(&adjusted, &out)?;

        let written = fs::read_to_string(&out)?;
        let row = written.lines().nth(1).context("missing data row")?;
        assert_eq!(row, "2020,County,Kern,Kern County,Fire,FIREFIGHTER,0,0");
        Ok(())
    }

    #[test]
    fn empty_table_still_writes_the_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("ff_payroll.csv");
        write_csv(&[], &out)?;
        assert_eq!(
            fs::read_to_string(&out)?,
            format!("{}\n", OUTPUT_COLUMNS.join(","))
        );
        Ok(())
    }
}
