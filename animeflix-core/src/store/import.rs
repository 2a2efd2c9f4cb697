use std::path::{Path, PathBuf};

use animeflix_model::{ImportFailure, ImportReport};
use tracing::{info, warn};

use super::{ContentStore, IngestSource};
use crate::error::{Result, StoreError};
use crate::mime::{is_video_path, mime_for_path};

impl ContentStore {
    /// Ingest every video file directly inside `dir`.
    ///
    /// Per-file failures are collected in the report; only an unreadable
    /// directory fails the whole import. Already-stored content counts as
    /// imported.
    pub async fn import_directory(&self, dir: &Path) -> Result<ImportReport> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound("import directory".into()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_video_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut report = ImportReport {
            total_files: paths.len(),
            ..ImportReport::default()
        };

        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime = mime_for_path(&path);

            match self
                .ingest(IngestSource::Path(path.clone()), &file_name, mime)
                .await
            {
                Ok(outcome) => {
                    report.imported += 1;
                    report.videos.push(outcome.receipt());
                }
                Err(err) => {
                    warn!(file = %file_name, error = %err, "import failed");
                    report.failed.push(ImportFailure {
                        file_name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            total = report.total_files,
            imported = report.imported,
            failed = report.failed.len(),
            "directory import finished"
        );
        Ok(report)
    }
}
