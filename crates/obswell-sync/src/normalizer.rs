//! CSV normalization
//!
//! Turns the raw text of an observation file into [`ObservationRow`]s.
//!
//! Parsing rules:
//! - every `"` is removed before the text is split, so a quoted value that
//!   contains a comma is split in two and the row fails with
//!   [`SyncError::RowType`]. This matches how the source files have always
//!   been read; values with embedded commas are not supported.
//! - the first non-blank line is the header and must name exactly the four
//!   schema columns, in any order.
//! - blank and whitespace-only lines are skipped.
//! - any value that fails to coerce fails the whole file. No rows from a
//!   file with a bad row are returned.

use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::models::ObservationRow;
use crate::schema::{self, ColumnPositions, OBSERVATION_COLUMNS};

/// Date-time layouts accepted in the `Time` column, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Layout used when writing timestamps back out
pub const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value-column spellings that mean "no measurement"
const MISSING_VALUE_MARKERS: &[&str] = &["", "na", "nan", "null", "none"];

/// Parse a raw observation file
pub fn normalize(raw: &str) -> Result<Vec<ObservationRow>> {
    let unquoted = raw.replace('"', "");
    let (body, skipped) = skip_leading_blank_lines(&unquoted);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .quoting(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let positions = ColumnPositions::from_header(reader.headers()?.iter())?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0) + skipped;
        rows.push(parse_record(&record, &positions, line)?);
    }

    debug!(rows = rows.len(), "Normalized observation file");
    Ok(rows)
}

/// Drop blank and whitespace-only lines ahead of the header
///
/// Returns the remaining text and how many lines were dropped.
fn skip_leading_blank_lines(text: &str) -> (&str, usize) {
    let mut rest = text;
    let mut skipped = 0;
    while let Some(end) = rest.find('\n') {
        if !rest[..end].trim().is_empty() {
            break;
        }
        rest = &rest[end + 1..];
        skipped += 1;
    }
    (rest, skipped)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn parse_record(
    record: &StringRecord,
    positions: &ColumnPositions,
    line: usize,
) -> Result<ObservationRow> {
    if record.len() != positions.width() {
        return Err(SyncError::RowType {
            line,
            column: "*".to_string(),
            value: record.iter().collect::<Vec<_>>().join(","),
            expected: "a row with one field per header column",
        });
    }

    let field = |slot: usize| record.get(positions.get(slot)).unwrap_or("").trim();

    let time_text = field(schema::TIME);
    let timestamp = parse_timestamp(time_text).ok_or_else(|| SyncError::RowType {
        line,
        column: OBSERVATION_COLUMNS[schema::TIME].name.to_string(),
        value: time_text.to_string(),
        expected: "a date-time",
    })?;

    let value_text = field(schema::VALUE);
    let value = parse_value(value_text).map_err(|()| SyncError::RowType {
        line,
        column: OBSERVATION_COLUMNS[schema::VALUE].name.to_string(),
        value: value_text.to_string(),
        expected: "a number",
    })?;

    Ok(ObservationRow {
        timestamp,
        value,
        approval: field(schema::APPROVAL).to_string(),
        entity_id: field(schema::LOCATION).to_string(),
    })
}

/// Parse a `Time` value; a bare date means midnight
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_value(text: &str) -> std::result::Result<Option<f64>, ()> {
    if MISSING_VALUE_MARKERS.contains(&text.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    text.parse::<f64>().map(Some).map_err(|_| ())
}

/// Write rows as CSV in schema column order
///
/// Missing values are written as empty fields.
pub fn write_rows<W: Write>(writer: W, rows: &[ObservationRow], include_header: bool) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    if include_header {
        writer.write_record(schema::expected_names())?;
    }

    for row in rows {
        let timestamp = row.timestamp.format(TIMESTAMP_OUTPUT_FORMAT).to_string();
        let value = row.value.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            timestamp.as_str(),
            value.as_str(),
            row.approval.as_str(),
            row.entity_id.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Serialize rows to a CSV document with a header line
pub fn to_csv(rows: &[ObservationRow]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows(&mut buffer, rows, true)?;
    String::from_utf8(buffer)
        .map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ts(text: &str) -> NaiveDateTime {
        parse_timestamp(text).expect("valid timestamp")
    }

    const SAMPLE: &str = "\"Time\",\"Value\",\"Approval\",\"myLocation\"\n\
        \"2021-06-01 00:00\",\"12.31\",\"Approved\",\"OW002\"\n\
        \"2021-06-01 01:00\",\"12.35\",\"Provisional\",\"OW002\"\n";

    #[test]
    fn test_normalize_quoted_file() {
        let rows = normalize(SAMPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, ts("2021-06-01 00:00:00"));
        assert_eq!(rows[0].value, Some(12.31));
        assert_eq!(rows[0].approval, "Approved");
        assert_eq!(rows[1].entity_id, "OW002");
    }

    #[test]
    fn test_normalize_reordered_header() {
        let raw = "myLocation,Value,Time,Approval\nOW010,3.5,2020-01-02 03:04:05,Approved\n";
        let rows = normalize(raw).unwrap();
        assert_eq!(rows[0].entity_id, "OW010");
        assert_eq!(rows[0].value, Some(3.5));
        assert_eq!(rows[0].timestamp, ts("2020-01-02 03:04:05"));
    }

    #[test]
    fn test_normalize_header_only() {
        let rows = normalize("Time,Value,Approval,myLocation\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_normalize_schema_mismatch() {
        let err = normalize("Date,Level,Approval,myLocation\n2021-01-01,1,A,OW1\n").unwrap_err();
        assert!(matches!(err, SyncError::SchemaMismatch(_)));
    }

    #[test]
    fn test_normalize_empty_body_is_schema_mismatch() {
        let err = normalize("").unwrap_err();
        assert!(matches!(err, SyncError::SchemaMismatch(_)));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let raw = "Time,Value,Approval,myLocation\r\n\r\n2021-01-01 00:00,1.0,A,OW1\r\n   \r\n2021-01-01 01:00,2.0,A,OW1\r\n";
        let rows = normalize(raw).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_whitespace_lines_before_header_are_skipped() {
        let raw = "   \r\n\t\nTime,Value,Approval,myLocation\n2021-01-01 00:00,1.0,A,OW1\n";
        let rows = normalize(raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "OW1");
    }

    #[test]
    fn test_line_numbers_count_lines_before_header() {
        let raw = "  \n\nTime,Value,Approval,myLocation\n2021-01-01 00:00,abc,A,OW1\n";
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, SyncError::RowType { line: 4, .. }), "got {err:?}");
    }

    #[test]
    fn test_whitespace_only_body_is_schema_mismatch() {
        let err = normalize("  \n \t \n").unwrap_err();
        assert!(matches!(err, SyncError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_value_markers_become_null() {
        let raw = "Time,Value,Approval,myLocation\n\
            2021-01-01 00:00,,A,OW1\n\
            2021-01-01 01:00,NaN,A,OW1\n\
            2021-01-01 02:00,NA,A,OW1\n";
        let rows = normalize(raw).unwrap();
        assert!(rows.iter().all(|r| r.value.is_none()));
    }

    #[test]
    fn test_bad_value_fails_whole_file() {
        let raw = "Time,Value,Approval,myLocation\n\
            2021-01-01 00:00,1.0,A,OW1\n\
            2021-01-01 01:00,abc,A,OW1\n";
        let err = normalize(raw).unwrap_err();
        match err {
            SyncError::RowType { line, column, value, .. } => {
                assert_eq!(line, 3);
                assert_eq!(column, "Value");
                assert_eq!(value, "abc");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_timestamp_fails_whole_file() {
        let raw = "Time,Value,Approval,myLocation\nyesterday,1.0,A,OW1\n";
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, SyncError::RowType { ref column, .. } if column == "Time"));
    }

    #[test]
    fn test_quoted_comma_splits_the_value() {
        // Known limitation: quotes are stripped before splitting.
        let raw = "Time,Value,Approval,myLocation\n\"2021-01-01 00:00\",\"1.0\",\"Approved, final\",\"OW1\"\n";
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, SyncError::RowType { ref column, .. } if column == "*"));
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = ts("2021-06-01 13:45:00");
        assert_eq!(parse_timestamp("2021-06-01 13:45"), Some(expected));
        assert_eq!(parse_timestamp("2021-06-01T13:45:00"), Some(expected));
        assert_eq!(parse_timestamp("2021/06/01 13:45"), Some(expected));
        assert_eq!(parse_timestamp("2021-06-01"), Some(ts("2021-06-01 00:00")));
        assert_eq!(parse_timestamp("01-06-2021"), None);
    }

    #[test]
    fn test_to_csv_round_trip() {
        let rows = normalize(SAMPLE).unwrap();
        let text = to_csv(&rows).unwrap();
        assert!(text.starts_with("Time,Value,Approval,myLocation\n"));
        assert!(text.contains("2021-06-01 00:00:00,12.31,Approved,OW002"));
        assert_eq!(normalize(&text).unwrap(), rows);
    }

    #[test]
    fn test_write_rows_without_header_and_null_value() {
        let rows = vec![ObservationRow {
            timestamp: ts("2021-01-01 00:00"),
            value: None,
            approval: "A".to_string(),
            entity_id: "OW1".to_string(),
        }];
        let mut buffer = Vec::new();
        write_rows(&mut buffer, &rows, false).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "2021-01-01 00:00:00,,A,OW1\n");
    }
}
