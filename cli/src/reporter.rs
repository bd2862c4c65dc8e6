// JSON hand-off files for the document and chart renderers.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use tracklog_kernel::fsutil::atomic_write;
use tracklog_kernel::replay::{SizeHistory, StatsReport};
use tracklog_kernel::report::{ReportError, ReportSink, YearReport};

pub struct JsonReporter {
    dir: PathBuf,
    prefix: String,
}

impl JsonReporter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), ReportError> {
        let path = self.dir.join(format!("{}_{name}.json", self.prefix));
        let data = serde_json::to_vec_pretty(value).map_err(|e| ReportError(e.to_string()))?;
        atomic_write(&path, &data).map_err(|e| ReportError(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "report written");
        Ok(())
    }
}

impl ReportSink for JsonReporter {
    fn year_log(&mut self, report: &YearReport) -> Result<(), ReportError> {
        self.write(&format!("{}.report", report.year), report)
    }

    fn size_history(&mut self, history: &SizeHistory) -> Result<(), ReportError> {
        self.write("sizes", history)
    }

    fn stats(&mut self, stats: &StatsReport) -> Result<(), ReportError> {
        self.write("stats", stats)
    }
}
