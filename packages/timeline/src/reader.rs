//! Parses raw timeline CSV files into [`RawObservation`]s.
//!
//! Column names come from the region's [`ColumnSemantics`]; all other
//! columns are ignored. Empty count cells are read as zero.

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use similarity_region_models::ColumnSemantics;

use crate::TimelineError;
use crate::normalize::RawObservation;

/// Reads every observation from a CSV file on disk.
///
/// # Errors
///
/// Returns [`TimelineError`] if the file cannot be opened or any row is
/// malformed.
pub fn read_file(path: &Path, columns: &ColumnSemantics) -> Result<Vec<RawObservation>, TimelineError> {
    let file = std::fs::File::open(path)?;
    read_observations(file, columns)
}

/// Reads every observation from CSV data with a header row.
///
/// When the semantics name a filter column, only rows whose cell equals the
/// filter value are kept.
///
/// # Errors
///
/// Returns [`TimelineError`] if a configured column is missing from the
/// header, or if a date or count cell cannot be parsed.
pub fn read_observations<R: Read>(
    reader: R,
    columns: &ColumnSemantics,
) -> Result<Vec<RawObservation>, TimelineError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let date_idx = column_index(&headers, &columns.date_column)?;
    let cases_idx = column_index(&headers, &columns.cases_column)?;
    let deaths_idx = column_index(&headers, &columns.deaths_column)?;
    let filter = match (&columns.filter_column, &columns.filter_value) {
        (Some(column), Some(value)) => Some((column_index(&headers, column)?, value.as_str())),
        _ => None,
    };

    let mut observations = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);

        if let Some((idx, value)) = filter
            && record.get(idx).map(str::trim) != Some(value)
        {
            continue;
        }

        let raw_date = record.get(date_idx).unwrap_or_default().trim();
        let date = parse_date(raw_date, columns.day_first).ok_or_else(|| {
            TimelineError::InvalidDate {
                value: raw_date.to_string(),
                line,
            }
        })?;
        let cases = parse_count(record.get(cases_idx), &columns.cases_column, line)?;
        let deaths = parse_count(record.get(deaths_idx), &columns.deaths_column, line)?;

        observations.push(RawObservation::new(date, cases, deaths));
    }

    Ok(observations)
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, TimelineError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| TimelineError::MissingColumn {
            column: column.to_string(),
        })
}

/// Parses the date formats seen in upstream files.
///
/// `day_first` selects `dd/mm/yyyy`; otherwise ISO dates are expected, with
/// or without a time component.
#[must_use]
pub fn parse_date(s: &str, day_first: bool) -> Option<NaiveDate> {
    if day_first {
        return NaiveDate::parse_from_str(s, "%d/%m/%Y").ok();
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    None
}

#[allow(clippy::cast_possible_truncation)]
fn parse_count(cell: Option<&str>, column: &str, line: u64) -> Result<i64, TimelineError> {
    let raw = cell.unwrap_or_default().trim();
    if raw.is_empty() {
        return Ok(0);
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.round() as i64),
        _ => Err(TimelineError::InvalidCount {
            value: raw.to_string(),
            column: column.to_string(),
            line,
        }),
    }
}
