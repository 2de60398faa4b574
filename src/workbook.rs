//! Raw file reading: any spreadsheet format calamine auto-detects, plus
//! delimited text. Everything is surfaced as a 2-D array of cells; layout
//! interpretation belongs to the dialect parsers.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::WINDOWS_1252;

/// When a workbook carries this sheet it is read in preference to the first
/// one (the multi-year database exports bury their data in it).
pub const PREFERRED_SHEET: &str = "DB-MARKET SHARE-2022";

/// Read a file into raw rows. Delimited text goes through the CSV reader;
/// everything else through the spreadsheet reader.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<Data>>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" | "txt" => read_delimited(path),
        _ => read_spreadsheet(path),
    }
}

fn read_spreadsheet(path: &Path) -> Result<Vec<Vec<Data>>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening spreadsheet {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        bail!("spreadsheet {} has no sheets", path.display());
    }
    let sheet_name = sheet_names
        .iter()
        .find(|name| name.as_str() == PREFERRED_SHEET)
        .unwrap_or(&sheet_names[0])
        .clone();

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading sheet '{sheet_name}' of {}", path.display()))?;
    Ok(range.rows().map(|row| row.to_vec()).collect())
}

fn read_delimited(path: &Path) -> Result<Vec<Vec<Data>>> {
    let bytes =
        fs::read(path).with_context(|| format!("reading text file {}", path.display()))?;
    let content = decode_text(&bytes);
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("parsing {}", path.display()))?;
        rows.push(
            record
                .iter()
                .map(|field| Data::String(field.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// UTF-8 when valid, Windows-1252 otherwise (the common legacy export
/// encoding for these reports).
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Semicolon-delimited exports are common in Italian locales (comma is the
/// decimal separator); pick whichever separator dominates the first line.
fn sniff_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons >= commas && semicolons > 0 {
        b';'
    } else {
        b','
    }
}

// =============================================================================
// TESTS
// =============================================================================
