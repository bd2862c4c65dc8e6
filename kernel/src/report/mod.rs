// Reporting Boundary
//
// Structured data handed to document and chart renderers. Nothing here
// formats presentation markup. Sinks are only called once the state they
// describe is already persisted, so a failing sink cannot lose history.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::log::{canonical_timestamp, CollectionSummary, YearLog};
use crate::replay::{SizeHistory, StatsReport};

/// One log line as the document renderer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub date: NaiveDate,
    pub timestamp: String,
    pub text: String,
}

/// A complete year: every entry plus totals over the whole year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearReport {
    pub year: i32,
    pub entries: Vec<ReportEntry>,
    pub summary: BTreeMap<String, CollectionSummary>,
}

impl YearReport {
    pub fn from_log(log: &YearLog) -> Self {
        Self {
            year: log.year(),
            entries: log
                .entries()
                .iter()
                .map(|event| ReportEntry {
                    date: event.timestamp.date_naive(),
                    timestamp: canonical_timestamp(&event.timestamp),
                    text: event.rendered_text.clone(),
                })
                .collect(),
            summary: log.summary(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("report sink failed: {0}")]
pub struct ReportError(pub String);

/// Consumer of derived data (document and chart renderers).
pub trait ReportSink {
    fn year_log(&mut self, report: &YearReport) -> Result<(), ReportError>;

    fn size_history(&mut self, history: &SizeHistory) -> Result<(), ReportError>;

    fn stats(&mut self, stats: &StatsReport) -> Result<(), ReportError>;
}

/// Sink that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub years: Vec<YearReport>,
    pub histories: Vec<SizeHistory>,
    pub stats: Vec<StatsReport>,
    pub fail: bool,
}

impl ReportSink for RecordingSink {
    fn year_log(&mut self, report: &YearReport) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError("renderer unavailable".into()));
        }
        self.years.push(report.clone());
        Ok(())
    }

    fn size_history(&mut self, history: &SizeHistory) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError("renderer unavailable".into()));
        }
        self.histories.push(history.clone());
        Ok(())
    }

    fn stats(&mut self, stats: &StatsReport) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError("renderer unavailable".into()));
        }
        self.stats.push(stats.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{Event, EventKind};
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn year_report_uses_local_dates() {
        let ts = FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 12, 31, 23, 59, 0)
            .unwrap();
        let log = YearLog::normalized(2025, vec![Event::new(ts, "1", EventKind::Added, "X - Y")]);

        let report = YearReport::from_log(&log);

        assert_eq!(report.entries[0].date, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(report.entries[0].text, "X - Y was added to '1'");
        assert_eq!(report.summary["1"].added, 1);
    }

    #[test]
    fn recording_sink_keeps_stats() {
        let stats = StatsReport {
            current_top: Vec::new(),
            most_added_by_year: BTreeMap::new(),
            scores: Vec::new(),
        };
        let mut sink = RecordingSink::default();

        sink.stats(&stats).unwrap();
        assert_eq!(sink.stats, vec![stats.clone()]);

        sink.fail = true;
        assert!(sink.stats(&stats).is_err());
        assert_eq!(sink.stats.len(), 1);
    }
}
