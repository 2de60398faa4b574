//! Format detection and the four dialect parsers.
//!
//! Input is a 2-D array of raw cells exactly as read from a worksheet
//! (array-of-arrays, no header keys). Detection is a total function: every
//! sheet classifies as exactly one dialect, with "standard" as the fallback
//! for sheets of at least six rows.
//!
//! CRITICAL: parsing must be DETERMINISTIC. Same rows + same file name =
//! same records.

use anyhow::{bail, Result};
use calamine::Data;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use crate::numeric::{format_italian, format_italian_f64, parse_italian};
use crate::records::{
    channel_name, month_number, quarter_of, FileFormat, Record, UNCLASSIFIED, UNKNOWN_GAME,
};

/// First four header cells of the historical (multi-year DB) layout.
const HISTORICAL_HEADERS: [&str; 4] = ["ANNO", "MESE", "N.CONC.", "RAGIONE SOCIALE"];

/// Bet-type codes of the horse-racing layout; any other row content between
/// the amounts is ignored.
pub const HIPPO_BET_TYPES: [&str; 3] = ["QF", "TOTALIZZATORE", "MULTIPLA"];

/// Days between 1899-12-30 (Excel day zero) and the Unix epoch.
const EXCEL_EPOCH_OFFSET_DAYS: f64 = 25569.0;

// =============================================================================
// CELL HELPERS
// =============================================================================

static EMPTY_CELL: Data = Data::Empty;

pub(crate) fn cell_at(row: &[Data], idx: usize) -> &Data {
    row.get(idx).unwrap_or(&EMPTY_CELL)
}

/// Cell as trimmed text; empty string for missing/empty cells. Whole floats
/// render without a trailing ".0" so concession codes stay comparable.
pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => format!("{other}").trim().to_string(),
    }
}

pub(crate) fn text_at(row: &[Data], idx: usize) -> String {
    cell_text(cell_at(row, idx))
}

/// Raw numeric cell (historical amount columns hold plain numbers, not
/// locale-formatted strings). Unparseable content degrades to 0.
fn f64_at(row: &[Data], idx: usize) -> f64 {
    match cell_at(row, idx) {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Amount cell rendered as an Italian display string.
fn italian_amount_at(row: &[Data], idx: usize) -> String {
    match cell_at(row, idx) {
        Data::Empty => "0,00".to_string(),
        Data::Float(f) => format_italian_f64(*f),
        Data::Int(i) => format_italian_f64(*i as f64),
        Data::DateTime(dt) => format_italian_f64(dt.as_f64()),
        other => format_italian(&format!("{other}")),
    }
}

/// Numeric value of an amount cell, for negativity checks.
fn numeric_at(row: &[Data], idx: usize) -> f64 {
    match cell_at(row, idx) {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => parse_italian(s),
        _ => 0.0,
    }
}

// =============================================================================
// FORMAT DETECTION
// =============================================================================

/// Classify raw rows into a dialect. Order matters: historical has the most
/// specific header match, then hippo, then new; everything else with at
/// least six rows is "standard". First match wins.
pub fn detect_format(rows: &[Vec<Data>], file_name: &str) -> Result<FileFormat> {
    if is_historical(rows) {
        Ok(FileFormat::Historical)
    } else if is_hippo(rows) {
        Ok(FileFormat::Hippo)
    } else if is_new(rows) {
        Ok(FileFormat::New)
    } else if rows.len() >= 6 {
        Ok(FileFormat::Standard)
    } else {
        bail!(
            "file {file_name}: unrecognized layout ({} rows, no known header)",
            rows.len()
        )
    }
}

fn is_historical(rows: &[Vec<Data>]) -> bool {
    if rows.len() < 2 {
        return false;
    }
    let headers = &rows[0];
    if headers.len() < 12 {
        return false;
    }
    HISTORICAL_HEADERS
        .iter()
        .enumerate()
        .all(|(i, expected)| text_at(headers, i) == *expected)
}

fn is_hippo(rows: &[Vec<Data>]) -> bool {
    if rows.is_empty() || !text_at(&rows[0], 0).contains("Scommesse Ippica") {
        return false;
    }
    // Title alone is not enough: at least one early data row must carry a
    // recognizable bet-type code in column 2.
    rows.iter()
        .skip(4)
        .take(6)
        .any(|row| HIPPO_BET_TYPES.contains(&text_at(row, 2).as_str()))
}

fn is_new(rows: &[Vec<Data>]) -> bool {
    if rows.len() < 2 {
        return false;
    }
    let period_row = text_at(&rows[1], 0);
    period_row.contains("Periodo da") && !period_row.contains("Scommesse Ippica")
}

/// Detect and parse in one step.
pub fn parse_rows(rows: &[Vec<Data>], file_name: &str) -> Result<Vec<Record>> {
    match detect_format(rows, file_name)? {
        FileFormat::Historical => parse_historical(rows, file_name),
        FileFormat::Hippo => parse_hippo(rows, file_name),
        FileFormat::New => parse_new(rows, file_name),
        FileFormat::Standard => parse_standard(rows, file_name),
    }
}

// =============================================================================
// SHARED PARSER PIECES
// =============================================================================

fn base_record(file_name: &str, game_name: &str, month: &str, year: &str) -> Record {
    let quarter = quarter_of(month);
    let mut record = Record {
        file_name: file_name.to_string(),
        game_name: game_name.to_string(),
        game_name_original: game_name.to_string(),
        game_name_complete: game_name.to_string(),
        month: month.to_string(),
        year: year.to_string(),
        month_year: format!("{month}/{year}"),
        quarter: quarter.to_string(),
        quarter_year: format!("{quarter}/{year}"),
        ..Record::default()
    };
    record.restore_display_fields();
    record
}

fn period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([[:alpha:]]+)\s+(\d{4})").unwrap())
}

/// Extract "<Italian month name> <year>" from a period row ("Periodo da
/// gennaio 2024 a gennaio 2024"). Errors when no recognizable month/year
/// pair is present.
fn extract_period(rows: &[Vec<Data>], row_idx: usize, file_name: &str) -> Result<(String, String)> {
    let period_row = rows
        .get(row_idx)
        .map(|row| text_at(row, 0))
        .unwrap_or_default();
    for caps in period_regex().captures_iter(&period_row) {
        if let Some(month) = month_number(&caps[1]) {
            return Ok((month.to_string(), caps[2].to_string()));
        }
    }
    bail!("file {file_name}: period not found in row {}: '{period_row}'", row_idx + 1)
}

// =============================================================================
// HISTORICAL FORMAT
// Multi-year database export: header row 0, one record per row, raw numeric
// amount columns (ggt / payout / spesa), percentages computed here.
// =============================================================================

fn parse_historical(rows: &[Vec<Data>], file_name: &str) -> Result<Vec<Record>> {
    if rows.len() < 2 {
        bail!("file {file_name}: historical layout without data rows");
    }

    let mut records = Vec::new();
    for row in &rows[1..] {
        // Year, date, concession code and legal name are all required;
        // degraded rows are dropped, not errored.
        if (0..4).any(|i| text_at(row, i).is_empty()) {
            continue;
        }

        let year = text_at(row, 0);
        let month = historical_month(cell_at(row, 1));

        let gioco = non_empty(text_at(row, 8), UNKNOWN_GAME);
        let mut record = base_record(file_name, &gioco, &month, &year);

        record.codice_concessione = text_at(row, 2);
        record.ragione_sociale = text_at(row, 3);
        record.concessionario_nome = text_at(row, 4);
        record.canale = non_empty(text_at(row, 5).to_lowercase(), "fisico");
        record.channel_name = channel_name(&record.canale);
        record.gruppo = Some(text_at(row, 6));
        record.comparto = non_empty(text_at(row, 7), UNCLASSIFIED);
        record.file_format = FileFormat::Historical;

        let ggt = f64_at(row, 9);
        let payout = f64_at(row, 10);
        let spesa = f64_at(row, 11);

        record.importo_raccolta = format_italian_f64(ggt);
        record.importo_spesa = format_italian_f64(spesa);
        record.is_negative_spesa = spesa < 0.0;

        // Percentages are computed from the raw amounts here; the other
        // dialects ship them pre-computed in the sheet.
        if ggt > 0.0 {
            record.percentuale_spesa = format!("{:.2}%", spesa / ggt * 100.0);
            record.percentuale_raccolta = format!("{:.2}%", payout / ggt * 100.0);
        } else {
            record.percentuale_spesa = "0%".to_string();
            record.percentuale_raccolta = "0%".to_string();
        }

        records.push(record);
    }
    Ok(records)
}

/// The historical date column may hold a native datetime, a date string, or
/// an Excel serial number. Unparseable dates degrade to January.
fn historical_month(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) => month_from_serial(dt.as_f64()),
        Data::Float(f) => month_from_serial(*f),
        Data::Int(i) => month_from_serial(*i as f64),
        Data::String(s) => month_from_date_string(s.trim()),
        Data::DateTimeIso(s) => month_from_date_string(s.trim()),
        _ => "01".to_string(),
    }
}

fn month_from_serial(serial: f64) -> String {
    let epoch_ms = ((serial - EXCEL_EPOCH_OFFSET_DAYS) * 86400.0 * 1000.0) as i64;
    match chrono::DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => format!("{:02}", dt.month()),
        None => "01".to_string(),
    }
}

fn month_from_date_string(s: &str) -> String {
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return format!("{:02}", date.month());
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return format!("{:02}", dt.month());
    }
    // Some exports store the serial as text.
    if let Ok(serial) = s.parse::<f64>() {
        return month_from_serial(serial);
    }
    "01".to_string()
}

// =============================================================================
// HIPPO FORMAT (horse racing)
// Fixed game name, one record per bet-type row (QF / TOTALIZZATORE /
// MULTIPLA), period in row 1, data from row 4.
// =============================================================================

fn parse_hippo(rows: &[Vec<Data>], file_name: &str) -> Result<Vec<Record>> {
    const GAME_NAME: &str = "Scommesse Ippica d'agenzia";
    let (month, year) = extract_period(rows, 1, file_name)?;

    let mut records = Vec::new();
    for row in rows.iter().skip(4) {
        let tipo_gioco = text_at(row, 2);
        if text_at(row, 0).is_empty()
            || text_at(row, 1).is_empty()
            || !HIPPO_BET_TYPES.contains(&tipo_gioco.as_str())
        {
            continue;
        }

        let tipo_gioco_name = bet_type_label(&tipo_gioco);
        let mut record = base_record(file_name, GAME_NAME, &month, &year);
        record.file_format = FileFormat::Hippo;
        record.tipo_gioco = Some(tipo_gioco.clone());
        record.tipo_gioco_name = Some(tipo_gioco_name.clone());
        record.game_name_complete = format!("{GAME_NAME} - {tipo_gioco_name}");

        record.codice_concessione = text_at(row, 0);
        record.ragione_sociale = text_at(row, 1);
        record.concessionario_nome = record.ragione_sociale.clone();
        record.comparto = "Ippica".to_string();

        record.importo_raccolta = italian_amount_at(row, 3);
        record.percentuale_raccolta = text_at(row, 4);
        record.importo_spesa = italian_amount_at(row, 5);
        record.percentuale_spesa = text_at(row, 6);
        record.is_negative_spesa = numeric_at(row, 5) < 0.0;

        records.push(record);
    }
    Ok(records)
}

pub fn bet_type_label(tipo_gioco: &str) -> String {
    match tipo_gioco {
        "QF" => "🎯 Quota Fissa".to_string(),
        "TOTALIZZATORE" => "🎲 Totalizzatore".to_string(),
        "MULTIPLA" => "🎪 Multipla".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// NEW FORMAT
// Title "<game> - ..." in row 0, "Periodo da <month> <year>" in row 1,
// data from row 4.
// =============================================================================

fn parse_new(rows: &[Vec<Data>], file_name: &str) -> Result<Vec<Record>> {
    let title = text_at(&rows[0], 0);
    let game_name = non_empty(
        title.split('-').next().unwrap_or("").trim().to_string(),
        UNKNOWN_GAME,
    );
    let (month, year) = extract_period(rows, 1, file_name)?;

    Ok(rows
        .iter()
        .skip(4)
        .filter(|row| !text_at(row, 0).is_empty())
        .map(|row| standard_shaped_record(file_name, &game_name, &month, &year, row, FileFormat::New))
        .collect())
}

// =============================================================================
// STANDARD FORMAT (fallback)
// Title "... per <game>" in row 0, "dal mese: MM/YYYY" in row 2, data from
// row 5.
// =============================================================================

fn parse_standard(rows: &[Vec<Data>], file_name: &str) -> Result<Vec<Record>> {
    if rows.len() < 6 {
        bail!("file {file_name}: invalid layout ({} rows, expected at least 6)", rows.len());
    }

    static GAME_RE: OnceLock<Regex> = OnceLock::new();
    let game_re = GAME_RE.get_or_init(|| Regex::new(r"per\s+(.+)$").unwrap());
    static PERIOD_RE: OnceLock<Regex> = OnceLock::new();
    let period_re = PERIOD_RE.get_or_init(|| Regex::new(r"dal mese:\s*(\d{2})/(\d{4})").unwrap());

    let title = text_at(&rows[0], 0);
    let game_name = match game_re.captures(&title) {
        // Accented letters arrive HTML-escaped in some exports.
        Some(caps) => caps[1].trim().replace("&agrave;", "à"),
        None => UNKNOWN_GAME.to_string(),
    };

    let period_row = text_at(&rows[2], 0);
    let (month, year) = match period_re.captures(&period_row) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => bail!("file {file_name}: period not found in row 3: '{period_row}'"),
    };

    Ok(rows
        .iter()
        .skip(5)
        .filter(|row| !text_at(row, 0).is_empty())
        .map(|row| {
            standard_shaped_record(file_name, &game_name, &month, &year, row, FileFormat::Standard)
        })
        .collect())
}

/// New and standard layouts share the same data-row shape: code, legal name,
/// raccolta, raccolta %, spesa, spesa %.
fn standard_shaped_record(
    file_name: &str,
    game_name: &str,
    month: &str,
    year: &str,
    row: &[Data],
    file_format: FileFormat,
) -> Record {
    let mut record = base_record(file_name, game_name, month, year);
    record.file_format = file_format;
    record.codice_concessione = text_at(row, 0);
    record.ragione_sociale = text_at(row, 1);
    record.concessionario_nome = record.ragione_sociale.clone();
    record.importo_raccolta = italian_amount_at(row, 2);
    record.percentuale_raccolta = text_at(row, 3);
    record.importo_spesa = italian_amount_at(row, 4);
    record.percentuale_spesa = text_at(row, 5);
    record.is_negative_spesa = numeric_at(row, 4) < 0.0;
    record
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    fn f(v: f64) -> Data {
        Data::Float(v)
    }

    fn historical_rows() -> Vec<Vec<Data>> {
        let mut header: Vec<Data> = vec![
            s("ANNO"),
            s("MESE"),
            s("N.CONC."),
            s("RAGIONE SOCIALE"),
            s("CONCESSIONARIO"),
            s("CANALE"),
            s("GRUPPO"),
            s("COMPARTO"),
            s("GIOCO"),
            s("GGT"),
            s("PAYOUT"),
            s("SPESA"),
        ];
        header.push(s("EXTRA"));
        vec![
            header,
            vec![
                s("2023"),
                // Excel serial for 2023-05-15.
                f(45061.0),
                s("123"),
                s("Acme SRL"),
                s("Acme"),
                s("FISICO"),
                s("Gruppo A"),
                s("AWP"),
                s("Slot Machines"),
                f(1000.0),
                f(700.0),
                f(300.0),
            ],
            // Degraded row (missing concession code): silently dropped.
            vec![s("2023"), f(45061.0), s(""), s("Ghost")],
        ]
    }

    fn hippo_rows() -> Vec<Vec<Data>> {
        vec![
            vec![s("Scommesse Ippica d'agenzia - Raccolta")],
            vec![s("Periodo da gennaio 2024 a gennaio 2024")],
            vec![],
            vec![s("CONC"), s("RAGIONE SOCIALE"), s("TIPO")],
            vec![s("801"), s("Hippo Bets SRL"), s("QF"), f(5000.0), s("12%"), f(-120.5), s("3%")],
            vec![s("801"), s("Hippo Bets SRL"), s("TOTALIZZATORE"), f(800.0), s("2%"), f(40.0), s("1%")],
            vec![s("801"), s("Hippo Bets SRL"), s("TOTALE"), f(5800.0), s(""), s(""), s("")],
        ]
    }

    fn standard_rows() -> Vec<Vec<Data>> {
        vec![
            vec![s("Report per Slot Machines")],
            vec![],
            vec![s("dal mese: 03/2024")],
            vec![],
            vec![s("CONC."), s("RAGIONE SOCIALE")],
            vec![s("123"), s("Acme SRL"), s("1.500,00"), s("10%"), s("200,00"), s("5%")],
        ]
    }

    fn new_format_rows() -> Vec<Vec<Data>> {
        vec![
            vec![s("Apparecchi VLT - Raccolta per concessionario")],
            vec![s("Periodo da febbraio 2025 a febbraio 2025")],
            vec![],
            vec![],
            vec![s("456"), s("Beta SPA"), f(2500.0), s("8%"), f(100.0), s("2%")],
        ]
    }

    // -------------------------------------------------------------------------
    // DETECTION
    // -------------------------------------------------------------------------

    #[test]
    fn detection_classifies_each_dialect() {
        assert_eq!(detect_format(&historical_rows(), "h.xlsx").unwrap(), FileFormat::Historical);
        assert_eq!(detect_format(&hippo_rows(), "i.xlsx").unwrap(), FileFormat::Hippo);
        assert_eq!(detect_format(&new_format_rows(), "n.xlsx").unwrap(), FileFormat::New);
        assert_eq!(detect_format(&standard_rows(), "s.xlsx").unwrap(), FileFormat::Standard);
    }

    #[test]
    fn historical_never_matches_other_dialects() {
        let rows = historical_rows();
        assert!(!is_hippo(&rows));
        assert!(!is_new(&rows));
        assert!(is_historical(&rows));
    }

    #[test]
    fn detection_order_hippo_beats_new() {
        // A hippo sheet whose period row also says "Periodo da ...".
        let rows = hippo_rows();
        assert!(is_hippo(&rows));
        assert_eq!(detect_format(&rows, "x.xlsx").unwrap(), FileFormat::Hippo);
    }

    #[test]
    fn hippo_title_without_bet_rows_is_not_hippo() {
        let rows = vec![
            vec![s("Scommesse Ippica d'agenzia")],
            vec![s("Periodo da gennaio 2024 a gennaio 2024")],
            vec![],
            vec![],
            vec![s("801"), s("Hippo Bets SRL"), s("ALTRO")],
            vec![],
        ];
        assert!(!is_hippo(&rows));
        // Row 1 says "Periodo da" without the hippo title, so it detects as new.
        assert_eq!(detect_format(&rows, "x.xlsx").unwrap(), FileFormat::New);
    }

    #[test]
    fn short_unrecognized_sheet_is_an_error() {
        let rows = vec![vec![s("garbage")], vec![s("noise")]];
        let err = detect_format(&rows, "bad.xlsx").unwrap_err();
        assert!(err.to_string().contains("bad.xlsx"));
    }

    // -------------------------------------------------------------------------
    // HISTORICAL PARSER
    // -------------------------------------------------------------------------

    #[test]
    fn historical_parses_serial_date_and_computes_percentages() {
        let records = parse_historical(&historical_rows(), "storico.xlsx").unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.year, "2023");
        assert_eq!(r.month, "05");
        assert_eq!(r.quarter, "Q2");
        assert_eq!(r.quarter_year, "Q2/2023");
        assert_eq!(r.canale, "fisico");
        assert_eq!(r.gruppo.as_deref(), Some("Gruppo A"));
        assert_eq!(r.comparto, "AWP");
        assert_eq!(r.importo_raccolta, "1.000,00");
        assert_eq!(r.importo_spesa, "300,00");
        assert_eq!(r.percentuale_spesa, "30.00%");
        assert_eq!(r.percentuale_raccolta, "70.00%");
        assert!(!r.is_negative_spesa);
        assert_eq!(r.file_format, FileFormat::Historical);
    }

    #[test]
    fn historical_zero_ggt_yields_zero_percentages() {
        let mut rows = historical_rows();
        rows[1][9] = f(0.0);
        let records = parse_historical(&rows, "storico.xlsx").unwrap();
        assert_eq!(records[0].percentuale_spesa, "0%");
        assert_eq!(records[0].percentuale_raccolta, "0%");
    }

    #[test]
    fn historical_accepts_date_strings() {
        let mut rows = historical_rows();
        rows[1][1] = s("2023-11-01");
        let records = parse_historical(&rows, "storico.xlsx").unwrap();
        assert_eq!(records[0].month, "11");
        assert_eq!(records[0].quarter, "Q4");
    }

    #[test]
    fn historical_unparseable_date_defaults_to_january() {
        let mut rows = historical_rows();
        rows[1][1] = s("boh");
        let records = parse_historical(&rows, "storico.xlsx").unwrap();
        assert_eq!(records[0].month, "01");
    }

    #[test]
    fn month_from_serial_matches_excel_epoch() {
        // 25569 is 1970-01-01.
        assert_eq!(month_from_serial(25569.0), "01");
        // 45061 is 2023-05-15.
        assert_eq!(month_from_serial(45061.0), "05");
    }

    // -------------------------------------------------------------------------
    // HIPPO PARSER
    // -------------------------------------------------------------------------

    #[test]
    fn hippo_parses_bet_type_rows_only() {
        let records = parse_hippo(&hippo_rows(), "ippica.xlsx").unwrap();
        assert_eq!(records.len(), 2);

        let qf = &records[0];
        assert_eq!(qf.game_name, "Scommesse Ippica d'agenzia");
        assert_eq!(qf.tipo_gioco.as_deref(), Some("QF"));
        assert_eq!(qf.tipo_gioco_name.as_deref(), Some("🎯 Quota Fissa"));
        assert_eq!(qf.game_name_complete, "Scommesse Ippica d'agenzia - 🎯 Quota Fissa");
        assert_eq!(qf.month, "01");
        assert_eq!(qf.year, "2024");
        assert_eq!(qf.comparto, "Ippica");
        assert_eq!(qf.importo_raccolta, "5.000,00");
        assert_eq!(qf.percentuale_raccolta, "12%");
        assert_eq!(qf.importo_spesa, "-120,50");
        assert!(qf.is_negative_spesa);

        assert_eq!(records[1].tipo_gioco.as_deref(), Some("TOTALIZZATORE"));
        assert!(!records[1].is_negative_spesa);
    }

    #[test]
    fn hippo_missing_period_is_an_error() {
        let mut rows = hippo_rows();
        rows[1] = vec![s("nessun periodo qui")];
        let err = parse_hippo(&rows, "ippica.xlsx").unwrap_err();
        assert!(err.to_string().contains("ippica.xlsx"));
        assert!(err.to_string().contains("period"));
    }

    // -------------------------------------------------------------------------
    // NEW FORMAT PARSER
    // -------------------------------------------------------------------------

    #[test]
    fn new_format_extracts_game_before_dash() {
        let records = parse_new(&new_format_rows(), "vlt.xlsx").unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.game_name, "Apparecchi VLT");
        assert_eq!(r.month, "02");
        assert_eq!(r.year, "2025");
        assert_eq!(r.importo_raccolta, "2.500,00");
        assert_eq!(r.file_format, FileFormat::New);
        assert!(r.tipo_gioco.is_none());
    }

    // -------------------------------------------------------------------------
    // STANDARD PARSER
    // -------------------------------------------------------------------------

    #[test]
    fn standard_parses_title_period_and_amounts() {
        let records = parse_standard(&standard_rows(), "slot.xlsx").unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.game_name, "Slot Machines");
        assert_eq!(r.month, "03");
        assert_eq!(r.year, "2024");
        assert_eq!(r.quarter, "Q1");
        assert_eq!(r.importo_raccolta, "1.500,00");
        assert_eq!(r.importo_spesa, "200,00");
        assert!(!r.is_negative_spesa);
        assert_eq!(r.comparto, UNCLASSIFIED);
    }

    #[test]
    fn standard_unescapes_accented_game_names() {
        let mut rows = standard_rows();
        rows[0] = vec![s("Raccolta per Giochi di abilit&agrave;")];
        let records = parse_standard(&rows, "abilita.xlsx").unwrap();
        assert_eq!(records[0].game_name, "Giochi di abilità");
    }

    #[test]
    fn standard_negative_spesa_flagged_from_parsed_number() {
        let mut rows = standard_rows();
        rows[5][4] = s("-50,00");
        let records = parse_standard(&rows, "slot.xlsx").unwrap();
        assert!(records[0].is_negative_spesa);
        assert_eq!(records[0].importo_spesa, "-50,00");
    }

    #[test]
    fn standard_short_sheet_is_an_error() {
        let rows = vec![vec![s("Report per Slot")], vec![], vec![s("dal mese: 03/2024")]];
        assert!(parse_standard(&rows, "short.xlsx").is_err());
    }

    #[test]
    fn standard_missing_period_is_an_error() {
        let mut rows = standard_rows();
        rows[2] = vec![s("senza periodo")];
        let err = parse_standard(&rows, "slot.xlsx").unwrap_err();
        assert!(err.to_string().contains("slot.xlsx"));
    }

    #[test]
    fn parse_rows_dispatches_by_detection() {
        assert_eq!(parse_rows(&standard_rows(), "s.xlsx").unwrap()[0].file_format, FileFormat::Standard);
        assert_eq!(parse_rows(&hippo_rows(), "h.xlsx").unwrap()[0].file_format, FileFormat::Hippo);
    }
}
