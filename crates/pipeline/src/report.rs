//! Per-year outcomes and the reporting collaborator.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use covermap_algorithms::accuracy::AccuracyReport;
use covermap_core::{Error, ExportReceipt, Result};

/// Steps of one year's run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Select,
    Correct,
    Composite,
    SampleSplit,
    Train,
    Classify,
    Evaluate,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Select => "select",
            Stage::Correct => "correct",
            Stage::Composite => "composite",
            Stage::SampleSplit => "sample-split",
            Stage::Train => "train",
            Stage::Classify => "classify",
            Stage::Evaluate => "evaluate",
            Stage::Report => "report",
        };
        f.write_str(s)
    }
}

/// How a year ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    /// Products were written. `accuracy` is `None` when the test subset was
    /// empty.
    Completed { accuracy: Option<AccuracyReport> },
    /// Nothing to work with: no scenes, or a class without training data.
    Skipped { stage: Stage, reason: String },
    /// `stage` is `None` when the year's worker died outside any stage.
    Failed { stage: Option<Stage>, error: String },
    /// The campaign was cancelled before the year finished.
    Cancelled,
}

impl YearStatus {
    /// Status of a year that stopped at `stage` with `error`.
    ///
    /// Data shortages skip the year; everything else fails it.
    pub fn from_error(stage: Stage, error: &Error) -> Self {
        match error {
            Error::EmptyCollection(_) | Error::InsufficientTrainingData { .. } => YearStatus::Skipped {
                stage,
                reason: error.to_string(),
            },
            _ => YearStatus::Failed {
                stage: Some(stage),
                error: error.to_string(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, YearStatus::Completed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            YearStatus::Completed { .. } => "completed",
            YearStatus::Skipped { .. } => "skipped",
            YearStatus::Failed { .. } => "failed",
            YearStatus::Cancelled => "cancelled",
        }
    }
}

/// Everything recorded about one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearReport {
    pub year: i32,
    pub sensor: Option<String>,
    pub archive_id: Option<String>,
    #[serde(flatten)]
    pub status: YearStatus,
    pub scenes: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub exports: Vec<ExportReceipt>,
    pub warnings: Vec<String>,
    pub elapsed_secs: f64,
}

impl YearReport {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            sensor: None,
            archive_id: None,
            status: YearStatus::Cancelled,
            scenes: 0,
            train_size: 0,
            test_size: 0,
            exports: Vec::new(),
            warnings: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    /// A year that never started.
    pub fn cancelled(year: i32) -> Self {
        Self::new(year)
    }

    pub fn accuracy(&self) -> Option<&AccuracyReport> {
        match &self.status {
            YearStatus::Completed { accuracy } => accuracy.as_ref(),
            _ => None,
        }
    }
}

/// Receives one record per finished year.
pub trait ReportSink: Send + Sync {
    fn record(&self, report: &YearReport) -> Result<()>;
}

/// Appends one JSON object per year to a file.
pub struct JsonLinesReportSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesReportSink {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonLinesReportSink {
    fn record(&self, report: &YearReport) -> Result<()> {
        let line = serde_json::to_string(report).map_err(|e| Error::Other(e.to_string()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Other("report writer poisoned".into()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Counts and reports of a whole campaign, ordered by year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub generated_at: DateTime<Utc>,
    pub first_year: i32,
    pub last_year: i32,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean overall accuracy over years with an accuracy record.
    pub mean_overall_accuracy: Option<f64>,
    pub years: Vec<YearReport>,
}

impl CampaignSummary {
    pub fn new(first_year: i32, last_year: i32, mut years: Vec<YearReport>) -> Self {
        years.sort_by_key(|r| r.year);
        let count = |label: &str| years.iter().filter(|r| r.status.label() == label).count();
        let accuracies: Vec<f64> = years
            .iter()
            .filter_map(|r| r.accuracy().map(|a| a.overall_accuracy))
            .collect();
        let mean_overall_accuracy =
            (!accuracies.is_empty()).then(|| accuracies.iter().sum::<f64>() / accuracies.len() as f64);
        Self {
            generated_at: Utc::now(),
            first_year,
            last_year,
            completed: count("completed"),
            skipped: count("skipped"),
            failed: count("failed"),
            cancelled: count("cancelled"),
            mean_overall_accuracy,
            years,
        }
    }

    pub fn report(&self, year: i32) -> Option<&YearReport> {
        self.years.iter().find(|r| r.year == year)
    }

    /// Write the summary as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn accuracy(oa: f64) -> AccuracyReport {
        AccuracyReport {
            classes: vec![3, 4],
            confusion_matrix: vec![vec![1, 0], vec![0, 1]],
            overall_accuracy: oa,
            kappa: 1.0,
            producers_accuracy: vec![Some(1.0), Some(1.0)],
            consumers_accuracy: vec![Some(1.0), Some(1.0)],
            test_size: 2,
        }
    }

    fn completed(year: i32, oa: Option<f64>) -> YearReport {
        YearReport {
            status: YearStatus::Completed {
                accuracy: oa.map(accuracy),
            },
            ..YearReport::new(year)
        }
    }

    #[test]
    fn error_taxonomy_maps_to_status() {
        let empty = Error::EmptyCollection("LANDSAT/LC08/C02/T1_L2 2016".into());
        assert!(matches!(
            YearStatus::from_error(Stage::Select, &empty),
            YearStatus::Skipped { stage: Stage::Select, .. }
        ));
        let missing = Error::InsufficientTrainingData { class: 2 };
        assert!(matches!(
            YearStatus::from_error(Stage::Train, &missing),
            YearStatus::Skipped { stage: Stage::Train, .. }
        ));
        let down = Error::ArchiveUnavailable("503".into());
        assert!(matches!(
            YearStatus::from_error(Stage::Select, &down),
            YearStatus::Failed { stage: Some(Stage::Select), .. }
        ));
    }

    #[test]
    fn status_is_flattened_into_the_record() {
        let json = serde_json::to_value(completed(2016, Some(0.9))).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["accuracy"]["overall_accuracy"], 0.9);

        let skipped = YearReport {
            status: YearStatus::Skipped {
                stage: Stage::SampleSplit,
                reason: "none".into(),
            },
            ..YearReport::new(2000)
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["stage"], "sample_split");
        let back: YearReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, skipped);
    }

    #[test]
    fn summary_sorts_and_counts() {
        let summary = CampaignSummary::new(
            2000,
            2003,
            vec![
                completed(2003, Some(0.8)),
                YearReport::cancelled(2002),
                completed(2000, Some(1.0)),
                completed(2001, None),
            ],
        );
        let years: Vec<i32> = summary.years.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2000, 2001, 2002, 2003]);
        assert_eq!((summary.completed, summary.cancelled), (3, 1));
        approx::assert_abs_diff_eq!(summary.mean_overall_accuracy.unwrap(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn json_lines_one_record_per_year() {
        let dir = tempdir().unwrap();
        let sink = JsonLinesReportSink::create(dir.path().join("accuracy.jsonl")).unwrap();
        sink.record(&completed(1990, Some(0.85))).unwrap();
        sink.record(&YearReport::cancelled(1991)).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: YearReport = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.year, 1990);
        assert_eq!(first.accuracy().unwrap().overall_accuracy, 0.85);
    }
}
