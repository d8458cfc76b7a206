use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Download one raw-export archive into memory.
///
/// The archives top out around a couple hundred megabytes, so they are
/// buffered whole rather than streamed to disk; the zip itself is never
/// persisted. Transient failures are retried with exponential backoff
/// before the URL is reported as unretrievable.
#[instrument(level = "debug", skip(client))]
pub async fn download_export(client: &Client, url: &str) -> Result<Vec<u8>> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match try_download(client, url).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "downloaded export");
                return Ok(bytes);
            }
            Err(reason) if attempts < MAX_RETRIES => {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempts - 1);
                warn!(
                    %url,
                    attempt = attempts,
                    backoff_ms = backoff,
                    %reason,
                    "export download failed, retrying"
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(reason) => {
                return Err(PipelineError::Retrieval {
                    url: url.to_string(),
                    reason,
                });
            }
        }
    }
}

async fn try_download(client: &Client, url: &str) -> std::result::Result<Vec<u8>, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

/// Extract every file entry of an in-memory export archive under
/// `dest_dir`, returning the paths written.
///
/// A truncated or corrupt archive means the retrieval itself failed, so
/// zip-level problems are reported against the source URL. Entry names are
/// validated before use; an entry that would escape `dest_dir` aborts the
/// unpack.
#[instrument(level = "debug", skip(bytes, dest_dir), fields(bytes = bytes.len()))]
pub fn unpack_export(bytes: &[u8], dest_dir: &Path, url: &str) -> Result<Vec<PathBuf>> {
    let retrieval = |reason: String| PipelineError::Retrieval {
        url: url.to_string(),
        reason,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| retrieval(format!("not a readable zip archive: {e}")))?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| retrieval(format!("zip entry {index}: {e}")))?;
        if !entry.is_file() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            return Err(retrieval(format!(
                "zip entry {:?} has an unsafe name",
                entry.name()
            )));
        };
        let dest = dest_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| retrieval(format!("extracting {}: {e}", dest.display())))?;
        written.push(dest);
    }

    debug!(files = written.len(), "unpacked export");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const URL: &str = "https://publicpay.ca.gov/RawExport/2009_City.zip";

    fn export_fixture() -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            writer.start_file("2009_City.csv", options)?;
            writer.write_all(b"year,position\n2009,FIRE FIGHTER\n")?;
            writer.add_directory("notes/", options)?;
            writer.start_file("notes/readme.txt", options)?;
            writer.write_all(b"raw export\n")?;
            writer.finish()?;
        }
        Ok(cursor.into_inner())
    }

    #[test]
    fn unpacks_files_and_nested_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let written = unpack_export(&export_fixture()?, dir.path(), URL)?;

        assert_eq!(
            written,
            vec![
                dir.path().join("2009_City.csv"),
                dir.path().join("notes/readme.txt"),
            ]
        );
        let csv = fs::read_to_string(dir.path().join("2009_City.csv"))?;
        assert_eq!(csv, "year,position\n2009,FIRE FIGHTER\n");
        // the directory entry itself produced no path, only its child
        assert!(dir.path().join("notes").is_dir());
        Ok(())
    }

    #[test]
    fn corrupt_archive_is_reported_against_the_url() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = unpack_export(b"definitely not a zip", dir.path(), URL).unwrap_err();
        match err {
            PipelineError::Retrieval { url, reason } => {
                assert_eq!(url, URL);
                assert!(reason.contains("zip"), "reason was {reason:?}");
            }
            other => panic!("expected Retrieval error, got {other}"),
        }
        Ok(())
    }

    #[test]
    fn truncated_archive_fails_cleanly() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let bytes = export_fixture()?;
        let err = unpack_export(&bytes[..bytes.len() / 2], dir.path(), URL).unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }), "got {err}");
        Ok(())
    }
}
