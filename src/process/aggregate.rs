use std::path::{Path, PathBuf};

use glob::glob;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::process::filter::filter_file;
use crate::process::PayrollRecord;

/// Enumerate the extracted source files under `dir`.
///
/// The platform gives no useful enumeration order, so the paths are sorted
/// before anything consumes them; aggregation order, and with it the output
/// artifact, stays deterministic across runs and machines.
pub fn discover_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", dir.display());
    let entries = glob(&pattern).map_err(|e| PipelineError::Read {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::Read {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    debug!(dir = %dir.display(), files = paths.len(), "discovered source files");
    Ok(paths)
}

/// Run the record filter over every source file and concatenate the results.
///
/// Files are independent, so they are filtered on the rayon pool; the
/// collect reassembles per-file outputs in supplied-path order before
/// flattening, and per-file internal row order is untouched. Nothing is
/// sorted, deduplicated, or schema-checked beyond the fixed column set.
/// The first failing file aborts the whole aggregation.
#[instrument(level = "info", skip(paths), fields(files = paths.len()))]
pub fn aggregate_files(paths: &[PathBuf]) -> Result<Vec<PayrollRecord>> {
    let per_file: Vec<Vec<PayrollRecord>> = paths
        .par_iter()
        .map(|path| {
            let records = filter_file(path)?;
            debug!(file = %path.display(), kept = records.len(), "filtered");
            Ok(records)
        })
        .collect::<Result<_>>()?;

    let rows: usize = per_file.iter().map(Vec::len).sum();
    info!(rows, "aggregated filtered records");
    Ok(per_file.into_iter().flatten().collect())
}
