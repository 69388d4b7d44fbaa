//! Plain-text run report

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::models::FetchOutcome;
use crate::pipeline::RunSummary;

const BANNER: &str = "===== BC Observation Wells Data Scraper =====";
const STATION_HEADER: &str = "station";

fn status_text(outcome: &FetchOutcome) -> String {
    outcome
        .http_status()
        .map(|status| status.to_string())
        .unwrap_or_else(|| "not attempted".to_string())
}

fn write_table(
    f: &mut fmt::Formatter<'_>,
    second_header: &str,
    rows: &[(&str, String)],
) -> fmt::Result {
    let width = rows
        .iter()
        .map(|(name, _)| name.len())
        .chain(std::iter::once(STATION_HEADER.len()))
        .max()
        .unwrap_or(STATION_HEADER.len());

    writeln!(f, "{STATION_HEADER:<width$}  {second_header}")?;
    for (name, detail) in rows {
        writeln!(f, "{name:<width$}  {detail}")?;
    }
    Ok(())
}

/// Report text for a finished run
pub struct Report<'a>(pub &'a RunSummary);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.0;
        let all_valid = summary.all_links_valid();
        let all_error_free = summary.all_error_free();

        writeln!(f, "{BANNER}")?;
        writeln!(f)?;
        writeln!(
            f,
            "This file gives a summary of the most recent BC\nObservation well dataset {}, run via\n\"obswell-sync {}\"",
            summary.mode.description(),
            summary.mode.command()
        )?;
        writeln!(f)?;
        writeln!(f, "Last scrape: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S%.6f"))?;
        writeln!(f, "Files processed: {}", summary.outcomes.len())?;
        writeln!(f)?;

        writeln!(f, "All data links valid: {all_valid}")?;
        if !all_valid {
            let invalid: Vec<(&str, String)> = summary
                .outcomes
                .iter()
                .filter(|(_, outcome)| !outcome.link_valid())
                .map(|(file, outcome)| (file.name.as_str(), status_text(outcome)))
                .collect();
            writeln!(f, "Invalid links were:")?;
            write_table(f, "response_code", &invalid)?;
        }
        writeln!(f)?;

        writeln!(f, "All downloads and data formatting was error free: {all_error_free}")?;
        if !all_error_free {
            let failed: Vec<(&str, String)> = summary
                .outcomes
                .iter()
                .filter(|(_, outcome)| !outcome.is_error_free())
                .map(|(file, outcome)| (file.name.as_str(), outcome.error_message().to_string()))
                .collect();
            writeln!(f, "Links that threw errors were:")?;
            write_table(f, "error_message", &failed)?;
        }
        writeln!(f)
    }
}

/// Render the report text for a finished run
pub fn render(summary: &RunSummary) -> String {
    Report(summary).to_string()
}

/// Write the report, replacing any previous one
pub async fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    tokio::fs::write(path, render(summary)).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::DatasetFile;
    use crate::pipeline::SyncMode;
    use chrono::{Local, TimeZone};

    fn summary(outcomes: Vec<(&str, FetchOutcome)>) -> RunSummary {
        RunSummary {
            started_at: Local.with_ymd_and_hms(2021, 6, 2, 9, 30, 0).unwrap(),
            mode: SyncMode::Incremental,
            outcomes: outcomes
                .into_iter()
                .map(|(name, outcome)| (DatasetFile::classify(name).unwrap(), outcome))
                .collect(),
        }
    }

    #[test]
    fn test_clean_run() {
        let text = render(&summary(vec![("A-recent.csv", FetchOutcome::stored(200, 3))]));
        assert!(text.starts_with(BANNER));
        assert!(text.contains("Last scrape: 2021-06-02 09:30:00"));
        assert!(text.contains("All data links valid: true"));
        assert!(text.contains("All downloads and data formatting was error free: true"));
        assert!(!text.contains("Invalid links were:"));
        assert!(!text.contains("Links that threw errors were:"));
    }

    #[test]
    fn test_invalid_links_and_errors_are_listed() {
        let text = render(&summary(vec![
            ("A-recent.csv", FetchOutcome::stored(200, 3)),
            ("Y-recent.csv", FetchOutcome::http_status_only(404)),
            ("Z-recent.csv", FetchOutcome::failed(Some(200), "write failed for Z-recent.csv")),
            ("W-recent.csv", FetchOutcome::failed(None, "connection reset")),
        ]));

        assert!(text.contains("All data links valid: false"));
        assert!(text.contains("Y-recent.csv  404"));
        assert!(text.contains("W-recent.csv  not attempted"));
        assert!(!text.contains("A-recent.csv  200"));

        assert!(text.contains("All downloads and data formatting was error free: false"));
        assert!(text.contains("Z-recent.csv  write failed for Z-recent.csv"));
        assert!(text.contains("W-recent.csv  connection reset"));
    }

    #[test]
    fn test_table_columns_are_aligned() {
        let run = summary(vec![
            ("OW1-recent.csv", FetchOutcome::http_status_only(404)),
            ("OW1234-recent.csv", FetchOutcome::http_status_only(500)),
        ]);
        let text = format!("{}", Report(&run));

        assert!(text.contains(
            "Invalid links were:\n\
             station            response_code\n\
             OW1-recent.csv     404\n\
             OW1234-recent.csv  500\n"
        ));
        assert_eq!(text, render(&run));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_empty_run_is_valid() {
        let text = render(&summary(Vec::new()));
        assert!(text.contains("Files processed: 0"));
        assert!(text.contains("All data links valid: true"));
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_report.txt");
        write_report(&summary(Vec::new()), &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("incremental update"));
    }
}
