//! Export of the filtered dataset and the lookup tables: delimited text with
//! always-quoted fields, or a spreadsheet workbook. Both are straight
//! projections of the record fields.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;

use crate::mappings::{AliasEntry, RegistryEntry, SectorEntry};
use crate::records::{FileFormat, Record};

pub const EXPORT_SHEET: &str = "Dati Filtrati";
pub const REGISTRY_SHEET: &str = "ANAGRAFICA CONCESSIONI";
pub const ALIAS_SHEET: &str = "MAPPATURA NOMI GIOCHI";
pub const SECTOR_SHEET: &str = "MAPPATURA COMPARTI";

pub const EXPORT_HEADERS: [&str; 16] = [
    "Gioco",
    "Tipo Gioco",
    "Comparto",
    "Gruppo",
    "Anno",
    "Trimestre",
    "Mese",
    "Canale",
    "Codice",
    "Concessionario",
    "Ragione Sociale",
    "Proprietà",
    "Importo Raccolta",
    "Perc. Raccolta",
    "Importo Spesa",
    "Perc. Spesa",
];

/// One export row. The bet-type column is filled only for horse-racing
/// records; the group column only where the dialect carries one.
fn projection(record: &Record) -> [String; 16] {
    let game = if record.game_name_complete.is_empty() {
        record.game_name.clone()
    } else {
        record.game_name_complete.clone()
    };
    let tipo_gioco = match record.file_format {
        FileFormat::Hippo => record.tipo_gioco_name.clone().unwrap_or_default(),
        FileFormat::Historical | FileFormat::New | FileFormat::Standard => String::new(),
    };
    [
        game,
        tipo_gioco,
        record.comparto.clone(),
        record.gruppo.clone().unwrap_or_default(),
        record.year.clone(),
        record.quarter.clone(),
        record.month_name.clone(),
        record.channel_name.clone(),
        record.codice_concessione.clone(),
        record.concessionario_nome.clone(),
        record.ragione_sociale.clone(),
        record.concessionario_proprieta.clone(),
        record.importo_raccolta.clone(),
        record.percentuale_raccolta.clone(),
        record.importo_spesa.clone(),
        record.percentuale_spesa.clone(),
    ]
}

pub fn write_csv<'a, W: io::Write>(
    records: impl IntoIterator<Item = &'a Record>,
    writer: W,
) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);
    csv_writer
        .write_record(EXPORT_HEADERS)
        .context("writing CSV header")?;
    for record in records {
        csv_writer
            .write_record(projection(record))
            .context("writing CSV row")?;
    }
    csv_writer.flush().context("flushing CSV output")?;
    Ok(())
}

pub fn write_csv_file<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    path: &Path,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(records, file)
}

pub fn write_xlsx<'a>(records: impl IntoIterator<Item = &'a Record>, path: &Path) -> Result<()> {
    let rows = records.into_iter().map(projection).map(Vec::from).collect();
    write_sheet(path, EXPORT_SHEET, &EXPORT_HEADERS, rows)
}

pub fn write_registry_xlsx(entries: &[RegistryEntry], path: &Path) -> Result<()> {
    let headers = ["N. CONC.", "CONCESSIONARIO", "RAGIONE SOCIALE", "CANALE", "PROPRIETA"];
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.codice_concessione.clone(),
                e.concessionario.clone(),
                e.ragione_sociale.clone(),
                e.canale.to_uppercase(),
                e.proprieta.clone(),
            ]
        })
        .collect();
    write_sheet(path, REGISTRY_SHEET, &headers, rows)
}

pub fn write_alias_xlsx(entries: &[AliasEntry], path: &Path) -> Result<()> {
    let headers = ["Nome Originale", "Nome Visualizzato"];
    let rows = entries
        .iter()
        .map(|e| vec![e.nome_originale.clone(), e.nome_visualizzato.clone()])
        .collect();
    write_sheet(path, ALIAS_SHEET, &headers, rows)
}

pub fn write_sector_xlsx(entries: &[SectorEntry], path: &Path) -> Result<()> {
    let headers = ["Nome Gioco", "Comparto"];
    let rows = entries
        .iter()
        .map(|e| vec![e.nome_gioco.clone(), e.comparto.clone()])
        .collect();
    write_sheet(path, SECTOR_SHEET, &headers, rows)
}

fn write_sheet(path: &Path, sheet: &str, headers: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet)
        .with_context(|| format!("naming sheet '{sheet}'"))?;

    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *header)
            .context("writing header row")?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32 + 1, col as u16, value)
                .context("writing data row")?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("saving workbook {}", path.display()))?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::read_rows;
    use calamine::Data;

    fn standard_record() -> Record {
        let mut r = Record {
            game_name: "Slot Machines".to_string(),
            game_name_complete: "Slot Machines".to_string(),
            year: "2024".to_string(),
            month: "03".to_string(),
            quarter: "Q1".to_string(),
            codice_concessione: "123".to_string(),
            concessionario_nome: "Acme Gaming".to_string(),
            ragione_sociale: "Acme SRL".to_string(),
            importo_raccolta: "1.500,00".to_string(),
            percentuale_raccolta: "10%".to_string(),
            importo_spesa: "200,00".to_string(),
            percentuale_spesa: "5%".to_string(),
            ..Record::default()
        };
        r.restore_display_fields();
        r
    }

    fn hippo_record() -> Record {
        let mut r = Record {
            file_format: FileFormat::Hippo,
            tipo_gioco: Some("QF".to_string()),
            tipo_gioco_name: Some("🎯 Quota Fissa".to_string()),
            ..standard_record()
        };
        r.rebuild_game_name_complete();
        r
    }

    #[test]
    fn csv_quotes_every_field_and_blanks_bet_type_outside_hippo() {
        let records = vec![standard_record(), hippo_record()];
        let mut out = Vec::new();
        write_csv(&records, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"Gioco\",\"Tipo Gioco\""));
        // Standard record: empty bet-type column.
        assert!(lines[1].starts_with("\"Slot Machines\",\"\",\"Non classificato\""));
        assert!(lines[1].contains("\"1.500,00\""));
        assert!(lines[1].contains("\"Marzo\""));
        // Hippo record: bet-type label filled in.
        assert!(lines[2].contains("\"🎯 Quota Fissa\""));
    }

    #[test]
    fn xlsx_roundtrips_through_the_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.xlsx");
        write_xlsx(&[standard_record()], &path).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Data::String("Gioco".to_string()));
        assert_eq!(rows[1][0], Data::String("Slot Machines".to_string()));
        assert_eq!(rows[1][12], Data::String("1.500,00".to_string()));
    }

    #[test]
    fn registry_export_uppercases_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anagrafica.xlsx");
        let entries = vec![RegistryEntry {
            codice_concessione: "123".to_string(),
            concessionario: "Acme Gaming".to_string(),
            ragione_sociale: "Acme SRL".to_string(),
            canale: "online".to_string(),
            proprieta: "Gruppo Acme".to_string(),
        }];
        write_registry_xlsx(&entries, &path).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0][0], Data::String("N. CONC.".to_string()));
        assert_eq!(rows[1][3], Data::String("ONLINE".to_string()));
    }

    #[test]
    fn lookup_table_exports_write_key_value_sheets() {
        let dir = tempfile::tempdir().unwrap();

        let alias_path = dir.path().join("alias.xlsx");
        write_alias_xlsx(
            &[AliasEntry {
                nome_originale: "Slot".to_string(),
                nome_visualizzato: "Slot Machines".to_string(),
            }],
            &alias_path,
        )
        .unwrap();
        let rows = read_rows(&alias_path).unwrap();
        assert_eq!(rows[1][1], Data::String("Slot Machines".to_string()));

        let sector_path = dir.path().join("comparti.xlsx");
        write_sector_xlsx(
            &[SectorEntry {
                nome_gioco: "Slot Machines".to_string(),
                comparto: "AWP".to_string(),
            }],
            &sector_path,
        )
        .unwrap();
        let rows = read_rows(&sector_path).unwrap();
        assert_eq!(rows[1][1], Data::String("AWP".to_string()));
    }
}
