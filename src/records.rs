//! Canonical record shape shared by every dialect.
//!
//! Records are created only by the dialect parsers, mutated only by the
//! enrichment chain, and bulk-replaced only by "clear all" or retention
//! cleanup. Serialized field names match the original blob layout
//! (camelCase) so previously persisted datasets keep loading.

use serde::{Deserialize, Serialize};

/// Fixed storage schema version; persisted envelopes carry it and any
/// mismatch on load triggers a transparent migrate-and-resave.
pub const STORAGE_VERSION: &str = "3.0";

/// Which spreadsheet dialect produced a record. Closed set: adding a dialect
/// without handling it everywhere is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    #[serde(rename = "historicalFormat")]
    Historical,
    #[serde(rename = "hippoFormat")]
    Hippo,
    #[serde(rename = "newFormat")]
    New,
    #[serde(rename = "standardFormat")]
    Standard,
}

impl Default for FileFormat {
    fn default() -> Self {
        FileFormat::Standard
    }
}

/// The unit of all downstream processing. Every non-dialect-specific field is
/// always present (defaults backfill records persisted by older versions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub file_name: String,
    pub game_name: String,
    pub game_name_original: String,
    pub game_name_complete: String,
    /// Two-digit month "01".."12".
    pub month: String,
    /// Four-digit year.
    pub year: String,
    pub month_year: String,
    /// "Q1".."Q4", derived from `month`.
    pub quarter: String,
    pub quarter_year: String,
    pub codice_concessione: String,
    pub ragione_sociale: String,
    pub concessionario_nome: String,
    #[serde(rename = "concessionarioProprietà")]
    pub concessionario_proprieta: String,
    pub canale: String,
    pub channel_name: String,
    pub comparto: String,
    /// Ownership group; present only in the historical dialect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gruppo: Option<String>,
    /// Italian-formatted display amounts. Never used directly for arithmetic.
    pub importo_raccolta: String,
    pub percentuale_raccolta: String,
    pub importo_spesa: String,
    pub percentuale_spesa: String,
    pub month_name: String,
    pub quarter_name: String,
    pub is_negative_spesa: bool,
    pub file_format: FileFormat,
    /// Horse-racing bet-type code and its display label; hippo dialect only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_gioco: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_gioco_name: Option<String>,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            file_name: String::new(),
            game_name: String::new(),
            game_name_original: String::new(),
            game_name_complete: UNKNOWN_GAME.to_string(),
            month: "01".to_string(),
            year: String::new(),
            month_year: String::new(),
            quarter: String::new(),
            quarter_year: String::new(),
            codice_concessione: String::new(),
            ragione_sociale: String::new(),
            concessionario_nome: String::new(),
            concessionario_proprieta: NOT_SPECIFIED.to_string(),
            canale: "fisico".to_string(),
            channel_name: String::new(),
            comparto: UNCLASSIFIED.to_string(),
            gruppo: None,
            importo_raccolta: "0,00".to_string(),
            percentuale_raccolta: String::new(),
            importo_spesa: "0,00".to_string(),
            percentuale_spesa: String::new(),
            month_name: String::new(),
            quarter_name: String::new(),
            is_negative_spesa: false,
            file_format: FileFormat::Standard,
            tipo_gioco: None,
            tipo_gioco_name: None,
        }
    }
}

// Sentinels used whenever a source cell or a lookup is missing.
pub const UNKNOWN_GAME: &str = "Gioco Sconosciuto";
pub const NOT_SPECIFIED: &str = "Non specificato";
pub const UNCLASSIFIED: &str = "Non classificato";

/// Month number ("01".."12") -> Italian month name.
pub const MONTH_NAMES: [(&str, &str); 12] = [
    ("01", "Gennaio"),
    ("02", "Febbraio"),
    ("03", "Marzo"),
    ("04", "Aprile"),
    ("05", "Maggio"),
    ("06", "Giugno"),
    ("07", "Luglio"),
    ("08", "Agosto"),
    ("09", "Settembre"),
    ("10", "Ottobre"),
    ("11", "Novembre"),
    ("12", "Dicembre"),
];

/// Lowercase Italian month name -> month number, for period rows like
/// "gennaio 2024".
pub const ITALIAN_MONTHS: [(&str, &str); 12] = [
    ("gennaio", "01"),
    ("febbraio", "02"),
    ("marzo", "03"),
    ("aprile", "04"),
    ("maggio", "05"),
    ("giugno", "06"),
    ("luglio", "07"),
    ("agosto", "08"),
    ("settembre", "09"),
    ("ottobre", "10"),
    ("novembre", "11"),
    ("dicembre", "12"),
];

pub fn month_name(month: &str) -> String {
    MONTH_NAMES
        .iter()
        .find(|(m, _)| *m == month)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| month.to_string())
}

pub fn month_number(italian_name: &str) -> Option<&'static str> {
    let lower = italian_name.to_lowercase();
    ITALIAN_MONTHS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, num)| *num)
}

/// Fixed month -> quarter partition: 1-3 Q1, 4-6 Q2, 7-9 Q3, everything
/// else (including unparseable months) Q4.
pub fn quarter_of(month: &str) -> &'static str {
    match month.trim().parse::<u32>() {
        Ok(m) if (1..=3).contains(&m) => "Q1",
        Ok(m) if (4..=6).contains(&m) => "Q2",
        Ok(m) if (7..=9).contains(&m) => "Q3",
        _ => "Q4",
    }
}

pub fn quarter_name(quarter: &str) -> String {
    match quarter {
        "Q1" => "🌱 Q1 (Gen-Mar)".to_string(),
        "Q2" => "🌞 Q2 (Apr-Giu)".to_string(),
        "Q3" => "🍂 Q3 (Lug-Set)".to_string(),
        "Q4" => "❄️ Q4 (Ott-Dic)".to_string(),
        other => other.to_string(),
    }
}

pub fn channel_name(canale: &str) -> String {
    match canale.to_lowercase().as_str() {
        "fisico" => "📍 Fisico".to_string(),
        "online" => "💻 Online".to_string(),
        _ => canale.to_string(),
    }
}

impl Record {
    /// Composite identity used by the deduplicator. Re-importing the same
    /// (file, dealer, period, bet-type) tuple is a no-op.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.file_name,
            self.codice_concessione,
            self.month_year,
            self.tipo_gioco.as_deref().unwrap_or("standard")
        )
    }

    /// Recompute the derived display labels from the canonical fields.
    /// Used after loading (older blobs and reduced projections lack them).
    pub fn restore_display_fields(&mut self) {
        self.month_name = month_name(&self.month);
        self.quarter_name = quarter_name(&self.quarter);
        self.channel_name = channel_name(&self.canale);
    }

    /// Drop the derived display labels. This is the reduced projection
    /// persisted when the full serialization exceeds the storage ceiling;
    /// `restore_display_fields` rebuilds the labels on load.
    pub fn strip_display_fields(&mut self) {
        self.month_name = String::new();
        self.quarter_name = String::new();
        self.channel_name = String::new();
    }

    /// Recompute `gameNameComplete` from the (possibly aliased) game name,
    /// appending the bet-type label for horse-racing records.
    pub fn rebuild_game_name_complete(&mut self) {
        self.game_name_complete = match self.file_format {
            FileFormat::Hippo => match &self.tipo_gioco_name {
                Some(tipo) => format!("{} - {}", self.game_name, tipo),
                None => self.game_name.clone(),
            },
            FileFormat::Historical | FileFormat::New | FileFormat::Standard => {
                self.game_name.clone()
            }
        };
        if self.game_name_complete.is_empty() {
            self.game_name_complete = UNKNOWN_GAME.to_string();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
