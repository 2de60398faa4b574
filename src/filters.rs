//! Inverted filter index and the multi-select filter evaluator.
//!
//! The index is rebuilt once per record-store mutation, never per filter
//! change: each indexed dimension maps distinct value -> ascending list of
//! record positions. Evaluation unions the posting lists of the selected
//! values per dimension and intersects across dimensions, so filtering is
//! proportional to the matching set, not the whole store.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::records::{FileFormat, Record};

/// Filterable dimensions. `Gruppo` is dialect-specific (historical only)
/// and is evaluated as a predicate over the already-intersected candidates
/// instead of carrying a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Dimension {
    Game,
    Year,
    Quarter,
    Month,
    Canale,
    Concessionario,
    Proprieta,
    RagioneSociale,
    Comparto,
    TipoGioco,
    Gruppo,
}

/// The dimensions carrying posting lists, in build order.
const INDEXED: [Dimension; 10] = [
    Dimension::Game,
    Dimension::Year,
    Dimension::Quarter,
    Dimension::Month,
    Dimension::Canale,
    Dimension::Concessionario,
    Dimension::Proprieta,
    Dimension::RagioneSociale,
    Dimension::Comparto,
    Dimension::TipoGioco,
];

impl Dimension {
    /// The record's value on this dimension; `None` when the dimension does
    /// not apply (bet-type on a non-hippo record, group outside the
    /// historical dialect), in which case the record is not indexed for it.
    pub fn value_of(self, record: &Record) -> Option<String> {
        match self {
            Dimension::Game => {
                if record.game_name_complete.is_empty() {
                    Some(record.game_name.clone())
                } else {
                    Some(record.game_name_complete.clone())
                }
            }
            Dimension::Year => Some(record.year.clone()),
            Dimension::Quarter => Some(record.quarter_year.clone()),
            Dimension::Month => Some(record.month_year.clone()),
            Dimension::Canale => Some(record.canale.clone()),
            Dimension::Concessionario => Some(record.concessionario_nome.clone()),
            Dimension::Proprieta => Some(record.concessionario_proprieta.clone()),
            Dimension::RagioneSociale => Some(record.ragione_sociale.clone()),
            Dimension::Comparto => Some(record.comparto.clone()),
            Dimension::TipoGioco => match record.file_format {
                FileFormat::Hippo => record.tipo_gioco_name.clone(),
                _ => None,
            },
            Dimension::Gruppo => match record.file_format {
                FileFormat::Historical => record.gruppo.clone().filter(|g| !g.is_empty()),
                _ => None,
            },
        }
    }
}

/// One selected-value list per dimension. Empty list = no restriction on
/// that dimension (select-all, NOT select-none).
#[derive(Debug, Default, Clone)]
pub struct FilterSelection {
    pub games: Vec<String>,
    pub years: Vec<String>,
    /// "Q1/2024" values.
    pub quarters: Vec<String>,
    /// "03/2024" values.
    pub months: Vec<String>,
    pub channels: Vec<String>,
    pub concessionari: Vec<String>,
    pub proprieta: Vec<String>,
    pub ragioni_sociali: Vec<String>,
    pub comparti: Vec<String>,
    /// Bet-type display labels.
    pub tipi_gioco: Vec<String>,
    pub gruppi: Vec<String>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
            && self.years.is_empty()
            && self.quarters.is_empty()
            && self.months.is_empty()
            && self.channels.is_empty()
            && self.concessionari.is_empty()
            && self.proprieta.is_empty()
            && self.ragioni_sociali.is_empty()
            && self.comparti.is_empty()
            && self.tipi_gioco.is_empty()
            && self.gruppi.is_empty()
    }

    fn selected(&self, dim: Dimension) -> &[String] {
        match dim {
            Dimension::Game => &self.games,
            Dimension::Year => &self.years,
            Dimension::Quarter => &self.quarters,
            Dimension::Month => &self.months,
            Dimension::Canale => &self.channels,
            Dimension::Concessionario => &self.concessionari,
            Dimension::Proprieta => &self.proprieta,
            Dimension::RagioneSociale => &self.ragioni_sociali,
            Dimension::Comparto => &self.comparti,
            Dimension::TipoGioco => &self.tipi_gioco,
            Dimension::Gruppo => &self.gruppi,
        }
    }
}

/// Inverted index over the record store.
#[derive(Debug, Default)]
pub struct FilterIndex {
    postings: HashMap<Dimension, HashMap<String, Vec<u32>>>,
    /// Distinct group values, kept for dropdown population even though the
    /// dimension carries no posting list.
    gruppo_values: BTreeSet<String>,
    record_count: usize,
}

impl FilterIndex {
    pub fn build(records: &[Record]) -> Self {
        let mut index = FilterIndex {
            record_count: records.len(),
            ..FilterIndex::default()
        };
        for (position, record) in records.iter().enumerate() {
            for dim in INDEXED {
                if let Some(value) = dim.value_of(record) {
                    index
                        .postings
                        .entry(dim)
                        .or_default()
                        .entry(value)
                        .or_default()
                        .push(position as u32);
                }
            }
            if let Some(gruppo) = Dimension::Gruppo.value_of(record) {
                index.gruppo_values.insert(gruppo);
            }
        }
        index
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Sorted distinct values on a dimension, for filter dropdowns.
    pub fn distinct_values(&self, dim: Dimension) -> Vec<String> {
        if dim == Dimension::Gruppo {
            return self.gruppo_values.iter().cloned().collect();
        }
        let mut values: Vec<String> = self
            .postings
            .get(&dim)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Evaluate a selection: union postings within each active dimension,
    /// intersect across dimensions, then apply the group predicate to the
    /// surviving candidates only. Result is ascending by record position.
    pub fn evaluate(&self, selection: &FilterSelection, records: &[Record]) -> Vec<u32> {
        let mut candidates: Option<HashSet<u32>> = None;

        for dim in INDEXED {
            let selected = selection.selected(dim);
            if selected.is_empty() {
                continue;
            }
            let mut matched: HashSet<u32> = HashSet::new();
            if let Some(postings) = self.postings.get(&dim) {
                for value in selected {
                    if let Some(positions) = postings.get(value) {
                        matched.extend(positions.iter().copied());
                    }
                }
            }
            candidates = Some(match candidates {
                None => matched,
                Some(prev) => prev.intersection(&matched).copied().collect(),
            });
        }

        let mut positions: Vec<u32> = match candidates {
            Some(set) => set.into_iter().collect(),
            None => (0..self.record_count as u32).collect(),
        };

        // Dialect-specific predicate: records outside the historical
        // dialect are unaffected by a group selection.
        if !selection.gruppi.is_empty() {
            positions.retain(|&pos| {
                let record = &records[pos as usize];
                match record.file_format {
                    FileFormat::Historical => record
                        .gruppo
                        .as_deref()
                        .is_some_and(|g| selection.gruppi.iter().any(|s| s == g)),
                    _ => true,
                }
            });
        }

        positions.sort_unstable();
        positions
    }
}

// =============================================================================
// TESTS
// =============================================================================
