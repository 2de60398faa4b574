//! User-maintained lookup tables and the enrichment chain.
//!
//! Three tables: the dealer registry (concession code -> dealer identity),
//! the game-name alias table (original -> display name) and the sector
//! classification (display name -> comparto). Each is held as an ordered
//! row list (the editable source of truth, persisted as-is) plus a derived
//! hash map rebuilt after every mutation.
//!
//! Lookup misses are never errors; every miss has a documented default.

use std::collections::HashMap;

use anyhow::{bail, Result};
use calamine::Data;
use serde::{Deserialize, Serialize};

use crate::formats::{cell_text, text_at};
use crate::records::{channel_name, Record, NOT_SPECIFIED, UNCLASSIFIED};

/// One dealer registry row. Field names follow the persisted blob layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryEntry {
    pub codice_concessione: String,
    pub concessionario: String,
    pub ragione_sociale: String,
    pub canale: String,
    pub proprieta: String,
}

/// One game-name alias row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AliasEntry {
    pub nome_originale: String,
    pub nome_visualizzato: String,
}

/// One sector classification row, keyed by the post-alias game name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectorEntry {
    pub nome_gioco: String,
    pub comparto: String,
}

/// All three lookup tables plus their derived maps.
#[derive(Debug, Default)]
pub struct Mappings {
    pub registry: Vec<RegistryEntry>,
    pub aliases: Vec<AliasEntry>,
    pub sectors: Vec<SectorEntry>,
    registry_map: HashMap<String, usize>,
    alias_map: HashMap<String, String>,
    sector_map: HashMap<String, String>,
}

impl Mappings {
    /// Rebuild the derived maps from the row lists. Rows with an empty key
    /// (or an empty value, for the two-column tables) are skipped; on
    /// duplicate keys the last row wins.
    pub fn rebuild_maps(&mut self) {
        self.registry_map.clear();
        for (i, entry) in self.registry.iter().enumerate() {
            let code = entry.codice_concessione.trim();
            if !code.is_empty() {
                self.registry_map.insert(code.to_string(), i);
            }
        }

        self.alias_map.clear();
        for entry in &self.aliases {
            if !entry.nome_originale.is_empty() && !entry.nome_visualizzato.is_empty() {
                self.alias_map
                    .insert(entry.nome_originale.clone(), entry.nome_visualizzato.clone());
            }
        }

        self.sector_map.clear();
        for entry in &self.sectors {
            if !entry.nome_gioco.is_empty() && !entry.comparto.is_empty() {
                self.sector_map
                    .insert(entry.nome_gioco.clone(), entry.comparto.clone());
            }
        }
    }

    pub fn set_registry(&mut self, rows: Vec<RegistryEntry>) {
        self.registry = rows;
        self.rebuild_maps();
    }

    pub fn set_aliases(&mut self, rows: Vec<AliasEntry>) {
        self.aliases = rows;
        self.rebuild_maps();
    }

    pub fn set_sectors(&mut self, rows: Vec<SectorEntry>) {
        self.sectors = rows;
        self.rebuild_maps();
    }

    /// Run the full enrichment chain on one record: registry, then alias,
    /// then sector. Order matters because the sector table is keyed by the
    /// aliased display name. Idempotent: enriching twice with the same
    /// tables leaves the record unchanged.
    pub fn enrich(&self, record: &mut Record) {
        self.apply_registry(record);
        self.apply_alias(record);
        self.apply_sector(record);
    }

    /// Registry hit overwrites channel and dealer identity; a miss keeps the
    /// parsed channel and falls back to the legal name.
    fn apply_registry(&self, record: &mut Record) {
        match self
            .registry_map
            .get(record.codice_concessione.trim())
            .map(|&i| &self.registry[i])
        {
            Some(entry) => {
                // Entries may arrive with any casing; `canale` is lowercase
                // everywhere downstream (the channel index keys off it).
                record.canale = entry.canale.to_lowercase();
                record.channel_name = channel_name(&record.canale);
                record.concessionario_nome = entry.concessionario.clone();
                record.concessionario_proprieta = entry.proprieta.clone();
            }
            None => {
                record.concessionario_nome = record.ragione_sociale.clone();
                record.concessionario_proprieta = NOT_SPECIFIED.to_string();
                record.channel_name = channel_name(&record.canale);
            }
        }
    }

    /// Alias lookup is keyed by the immutable original name, so re-running
    /// the chain never re-aliases an already-aliased name.
    fn apply_alias(&self, record: &mut Record) {
        record.game_name = self
            .alias_map
            .get(&record.game_name_original)
            .cloned()
            .unwrap_or_else(|| record.game_name_original.clone());
        record.rebuild_game_name_complete();
    }

    fn apply_sector(&self, record: &mut Record) {
        record.comparto = self
            .sector_map
            .get(&record.game_name)
            .cloned()
            .unwrap_or_else(|| UNCLASSIFIED.to_string());
    }
}

// =============================================================================
// SPREADSHEET IMPORT
// =============================================================================

/// Parse a dealer registry sheet. The header row is auto-detected by
/// searching column 0 for a cell containing "CONC"; data rows follow it.
/// Columns: code, dealer name, legal name, channel, ownership.
pub fn parse_registry_rows(rows: &[Vec<Data>]) -> Result<Vec<RegistryEntry>> {
    let header_idx = rows
        .iter()
        .position(|row| text_at(row, 0).contains("CONC"));
    let Some(header_idx) = header_idx else {
        bail!("registry headers not found (no cell containing 'CONC' in column 1)");
    };

    Ok(rows[header_idx + 1..]
        .iter()
        .filter(|row| !text_at(row, 0).is_empty())
        .map(|row| {
            let canale = text_at(row, 3).to_lowercase();
            RegistryEntry {
                codice_concessione: text_at(row, 0),
                concessionario: text_at(row, 1),
                ragione_sociale: text_at(row, 2),
                canale: if canale.is_empty() { "fisico".to_string() } else { canale },
                proprieta: text_at(row, 4),
            }
        })
        .collect())
}

/// Parse a simple two-column key/value sheet: row 0 is the header, rows
/// with an empty key or value are skipped.
pub fn parse_mapping_rows(rows: &[Vec<Data>]) -> Vec<(String, String)> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let key = cell_text(row.first()?);
            let value = cell_text(row.get(1)?);
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

pub fn parse_alias_rows(rows: &[Vec<Data>]) -> Vec<AliasEntry> {
    parse_mapping_rows(rows)
        .into_iter()
        .map(|(nome_originale, nome_visualizzato)| AliasEntry {
            nome_originale,
            nome_visualizzato,
        })
        .collect()
}

pub fn parse_sector_rows(rows: &[Vec<Data>]) -> Vec<SectorEntry> {
    parse_mapping_rows(rows)
        .into_iter()
        .map(|(nome_gioco, comparto)| SectorEntry { nome_gioco, comparto })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
