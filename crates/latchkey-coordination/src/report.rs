//! JSON file report sink.
//!
//! Writes the call map and its findings to `profiler_map.json` in a
//! directory, for an external renderer to pick up.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use latchkey_core::Report;
use latchkey_core::ReportSink;
use latchkey_core::ReportSinkError;
use latchkey_core::constants::REPORT_FILE_NAME;
use tracing::info;

/// [`ReportSink`] writing pretty-printed JSON into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileReportSink {
    dir: PathBuf,
}

impl JsonFileReportSink {
    /// Sink writing into `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Full path of the report file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE_NAME)
    }

    /// Directory the report is written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for JsonFileReportSink {
    async fn publish(&self, report: &Report) -> Result<(), ReportSinkError> {
        let path = self.path();
        let body = serde_json::to_vec_pretty(report).map_err(|source| ReportSinkError::Encode { source })?;
        tokio::fs::write(&path, &body).await.map_err(|source| ReportSinkError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), bytes = body.len(), "profiler report written");
        Ok(())
    }
}
