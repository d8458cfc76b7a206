use std::fs;
use std::path::Path;

use encoding_rs::WINDOWS_1252;
use tracing::{instrument, trace};

use crate::error::{PipelineError, Result};
use crate::process::title::normalize_title;
use crate::process::{PayrollRecord, SOURCE_COLUMNS};

/// The exports spell the position both as one word and as two.
fn is_firefighter_position(normalized: &str) -> bool {
    normalized.contains("FIRE FIGHTER") || normalized.contains("FIREFIGHTER")
}

/// Load one raw export file and keep only firefighter position rows.
///
/// The portal publishes the exports as ISO-8859-1 text, so the bytes are
/// decoded with that single-byte encoding rather than assumed UTF-8; bytes
/// that violate the assumption fail the file instead of silently corrupting
/// everything aggregated after it. Header names are matched
/// case-insensitively against [`SOURCE_COLUMNS`], and a file missing any of
/// the seven columns is rejected whole.
///
/// Rows where the normalized position does not name a firefighter are
/// dropped; a row with no position field at all normalizes to the empty
/// string and is dropped the same way, never an error.
#[instrument(level = "debug", skip(path), fields(file = %path.as_ref().display()))]
pub fn filter_file<P: AsRef<Path>>(path: P) -> Result<Vec<PayrollRecord>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| PipelineError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let (text, _, had_errors) = WINDOWS_1252.decode(&bytes);
    if had_errors {
        return Err(PipelineError::Decode {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let lowered: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut indices = [0usize; SOURCE_COLUMNS.len()];
    for (slot, column) in indices.iter_mut().zip(SOURCE_COLUMNS) {
        *slot = lowered
            .iter()
            .position(|header| header == column)
            .ok_or_else(|| PipelineError::Read {
                path: path.to_path_buf(),
                reason: format!("missing required column {column:?}"),
            })?;
    }
    let [year_idx, type_idx, county_idx, name_idx, dept_idx, position_idx, overtime_idx] = indices;

    let mut kept = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| PipelineError::Read {
            path: path.to_path_buf(),
            reason: format!("record {row}: {e}"),
        })?;

        let position = normalize_title(record.get(position_idx));
        if !is_firefighter_position(&position) {
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        kept.push(PayrollRecord {
            year: field(year_idx),
            employer_type: field(type_idx),
            employer_county: field(county_idx),
            employer_name: field(name_idx),
            department_or_subdivision: field(dept_idx),
            position,
            overtime_pay: field(overtime_idx),
        });
    }

    trace!(kept = kept.len(), "filtered file");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str =
        "Year,EmployerType,EmployerCounty,EmployerName,DepartmentOrSubdivision,Position,OvertimePay,TotalWages\n";

    #[test]
    fn keeps_firefighters_and_drops_the_rest() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("2009_City.csv");
        let mut content = String::from(HEADER);
        content.push_str("2009.0,City,Alameda,Oakland,Fire,1ST FIRE FIGHTER,1000.50,90000\n");
        content.push_str("2009.0,City,Alameda,Oakland,Fire,CAPTAIN,2000,120000\n");
        content.push_str("2009.0,City,Alameda,Oakland,Fire,FIRE-FIGHTER2,750,80000\n");
        content.push_str("2009.0,City,Alameda,Oakland,Fire,1st Fire Fighter,300,85000\n");
        fs::write(&path, content)?;

        let records = filter_file(&path)?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].position, "FIRE FIGHTER");
        assert_eq!(records[1].position, "FIREFIGHTER");
        // lowercase ordinal survives the literal pass but still matches
        assert_eq!(records[2].position, "ST FIRE FIGHTER");
        // year survives as text exactly as published
        assert_eq!(records[0].year, "2009.0");
        assert_eq!(records[0].overtime_pay, "1000.50");
        Ok(())
    }

    #[test]
    fn decodes_iso_8859_1_bytes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("2010_County.csv");
        let mut content = Vec::from(HEADER.as_bytes());
        // 0xE9 is "é" in ISO-8859-1 and invalid as a UTF-8 start byte
        content.extend_from_slice(b"2010,County,Napa,Jos\xE9 Fire District,Fire,FIREFIGHTER,500,70000\n");
        fs::write(&path, content)?;

        let records = filter_file(&path)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].employer_name, "Jos\u{e9} Fire District");
        Ok(())
    }

    #[test]
    fn headers_match_case_insensitively() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shouty.csv");
        fs::write(
            &path,
            "YEAR,EMPLOYERTYPE,EMPLOYERCOUNTY,EMPLOYERNAME,DEPARTMENTORSUBDIVISION,POSITION,OVERTIMEPAY\n\
             2011,City,Kern,Bakersfield,Fire,FIRE FIGHTER,10,\n",
        )?;

        assert_eq!(filter_file(&path)?.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_required_column_is_a_read_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("truncated.csv");
        fs::write(&path, "Year,EmployerType,Position\n2009,City,FIRE FIGHTER\n")?;

        let err = filter_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }), "got {err}");
        assert!(err.to_string().contains("employercounty"));
        Ok(())
    }

    #[test]
    fn short_row_means_absent_position_not_a_panic() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ragged.csv");
        let mut content = String::from(HEADER);
        // row ends before the position column; treated as absent and dropped
        content.push_str("2012,City,Fresno\n");
        content.push_str("2012,City,Fresno,Fresno,Fire,FIRE FIGHTER,1,2\n");
        fs::write(&path, content)?;

        let records = filter_file(&path)?;
        assert_eq!(records.len(), 1);
        Ok(())
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let err = filter_file(Path::new("does/not/exist.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }), "got {err}");
    }
}
