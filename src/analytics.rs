//! Aggregation over the filtered subset: grouped metric sums for charting
//! plus the summary statistics block.

use std::collections::HashMap;

use crate::filters::Dimension;
use crate::numeric::{format_italian_f64, parse_italian};
use crate::records::{channel_name, month_name, quarter_name, Record};

/// Chart legibility cap: only the largest N groups are returned.
pub const TOP_N: usize = 20;

/// The numeric metrics a chart can sum. All are stored as Italian display
/// strings on the record and parsed per aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Metric {
    ImportoRaccolta,
    ImportoSpesa,
    PercentualeRaccolta,
    PercentualeSpesa,
}

impl Metric {
    pub fn value_of(self, record: &Record) -> &str {
        match self {
            Metric::ImportoRaccolta => &record.importo_raccolta,
            Metric::ImportoSpesa => &record.importo_spesa,
            Metric::PercentualeRaccolta => &record.percentuale_raccolta,
            Metric::PercentualeSpesa => &record.percentuale_spesa,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::ImportoRaccolta => "Importo Raccolta",
            Metric::ImportoSpesa => "Importo Spesa",
            Metric::PercentualeRaccolta => "Percentuale Raccolta",
            Metric::PercentualeSpesa => "Percentuale Spesa",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket {
    /// Raw dimension value; humanization is a presentation concern, see
    /// [`humanize_label`].
    pub label: String,
    pub value: f64,
}

/// Group the given records by a dimension's raw value, sum the metric per
/// group, sort descending by sum and truncate to the top 20. Records with
/// no value on the dimension land in an empty-label group so group totals
/// still balance against the overall total.
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    metric: Metric,
    group_by: Dimension,
) -> Vec<AggregateBucket> {
    let mut groups: HashMap<String, f64> = HashMap::new();
    for record in records {
        let key = group_by.value_of(record).unwrap_or_default();
        *groups.entry(key).or_insert(0.0) += parse_italian(metric.value_of(record));
    }

    let mut buckets: Vec<AggregateBucket> = groups
        .into_iter()
        .map(|(label, value)| AggregateBucket { label, value })
        .collect();
    // Descending by value, label as a deterministic tie-break.
    buckets.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    buckets.truncate(TOP_N);
    buckets
}

/// Human-readable label for a raw dimension value ("Q1/2024" becomes
/// "🌱 Q1 (Gen-Mar) 2024").
pub fn humanize_label(dim: Dimension, raw: &str) -> String {
    match dim {
        Dimension::Quarter => match raw.split_once('/') {
            Some((quarter, year)) => format!("{} {}", quarter_name(quarter), year),
            None => raw.to_string(),
        },
        Dimension::Month => match raw.split_once('/') {
            Some((month, year)) => format!("{} {}", month_name(month), year),
            None => raw.to_string(),
        },
        Dimension::Canale => channel_name(raw),
        _ => raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCount {
    pub name: String,
    pub records: usize,
}

/// Summary block over the filtered subset.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub total_records: usize,
    pub unique_concessionari: usize,
    /// Italian-formatted sums.
    pub total_raccolta: String,
    pub total_spesa: String,
    pub has_negative_values: bool,
    /// One alert line per record flagged with a negative spend.
    pub negative_alerts: Vec<String>,
    pub by_channel: Vec<ChannelCount>,
}

pub fn summary_stats<'a>(records: impl IntoIterator<Item = &'a Record>) -> SummaryStats {
    let mut total_records = 0;
    let mut dealers: std::collections::HashSet<&str> = Default::default();
    let mut total_raccolta = 0.0;
    let mut total_spesa = 0.0;
    let mut negative_alerts = Vec::new();
    let mut channels: HashMap<String, usize> = HashMap::new();

    for record in records {
        total_records += 1;
        dealers.insert(record.concessionario_nome.as_str());
        total_raccolta += parse_italian(&record.importo_raccolta);
        total_spesa += parse_italian(&record.importo_spesa);
        if record.is_negative_spesa {
            negative_alerts.push(format!(
                "• {} ({}): {} ({})",
                record.concessionario_nome,
                record.channel_name,
                record.importo_spesa,
                record.month_year
            ));
        }
        *channels.entry(record.canale.clone()).or_insert(0) += 1;
    }

    let mut by_channel: Vec<ChannelCount> = channels
        .into_iter()
        .map(|(canale, records)| ChannelCount {
            name: channel_name(&canale),
            records,
        })
        .collect();
    by_channel.sort_by(|a, b| a.name.cmp(&b.name));

    SummaryStats {
        total_records,
        unique_concessionari: dealers.len(),
        total_raccolta: format_italian_f64(total_raccolta),
        total_spesa: format_italian_f64(total_spesa),
        has_negative_values: !negative_alerts.is_empty(),
        negative_alerts,
        by_channel,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FileFormat;

    fn record(dealer: &str, canale: &str, raccolta: &str, spesa: &str) -> Record {
        let mut r = Record {
            concessionario_nome: dealer.to_string(),
            canale: canale.to_string(),
            importo_raccolta: raccolta.to_string(),
            importo_spesa: spesa.to_string(),
            is_negative_spesa: parse_italian(spesa) < 0.0,
            month_year: "03/2024".to_string(),
            ..Record::default()
        };
        r.restore_display_fields();
        r
    }

    #[test]
    fn aggregate_groups_and_sorts_descending() {
        let records = vec![
            record("Acme", "fisico", "1.000,00", "100,00"),
            record("Acme", "fisico", "500,00", "50,00"),
            record("Beta", "online", "2.000,00", "200,00"),
        ];
        let buckets = aggregate(&records, Metric::ImportoRaccolta, Dimension::Concessionario);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "Beta");
        assert_eq!(buckets[0].value, 2000.0);
        assert_eq!(buckets[1].label, "Acme");
        assert_eq!(buckets[1].value, 1500.0);
    }

    #[test]
    fn aggregate_truncates_to_top_twenty() {
        let records: Vec<Record> = (0..30)
            .map(|i| record(&format!("Dealer {i:02}"), "fisico", &format!("{i}"), "0,00"))
            .collect();
        let buckets = aggregate(&records, Metric::ImportoRaccolta, Dimension::Concessionario);
        assert_eq!(buckets.len(), TOP_N);
        assert_eq!(buckets[0].label, "Dealer 29");
    }

    #[test]
    fn records_without_a_dimension_value_group_under_empty_label() {
        let mut hippo = record("Hippo", "fisico", "100,00", "10,00");
        hippo.file_format = FileFormat::Hippo;
        hippo.tipo_gioco_name = Some("🎯 Quota Fissa".to_string());
        let plain = record("Acme", "fisico", "50,00", "5,00");

        let buckets = aggregate([&hippo, &plain], Metric::ImportoRaccolta, Dimension::TipoGioco);
        let total: f64 = buckets.iter().map(|b| b.value).sum();
        assert_eq!(total, 150.0);
        assert!(buckets.iter().any(|b| b.label.is_empty() && b.value == 50.0));
    }

    #[test]
    fn equal_sums_tie_break_by_label() {
        let records = vec![
            record("Zeta", "fisico", "100,00", "0,00"),
            record("Alfa", "fisico", "100,00", "0,00"),
        ];
        let buckets = aggregate(&records, Metric::ImportoRaccolta, Dimension::Concessionario);
        assert_eq!(buckets[0].label, "Alfa");
        assert_eq!(buckets[1].label, "Zeta");
    }

    #[test]
    fn humanize_period_and_channel_labels() {
        assert_eq!(humanize_label(Dimension::Quarter, "Q1/2024"), "🌱 Q1 (Gen-Mar) 2024");
        assert_eq!(humanize_label(Dimension::Month, "03/2024"), "Marzo 2024");
        assert_eq!(humanize_label(Dimension::Canale, "online"), "💻 Online");
        assert_eq!(humanize_label(Dimension::Game, "Slot"), "Slot");
    }

    #[test]
    fn summary_counts_totals_and_negative_alerts() {
        let records = vec![
            record("Acme", "fisico", "1.500,00", "200,00"),
            record("Acme", "online", "500,00", "-50,00"),
            record("Beta", "fisico", "1.000,00", "100,00"),
        ];
        let stats = summary_stats(&records);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.unique_concessionari, 2);
        assert_eq!(stats.total_raccolta, "3.000,00");
        assert_eq!(stats.total_spesa, "250,00");
        assert!(stats.has_negative_values);
        assert_eq!(stats.negative_alerts, vec![
            "• Acme (💻 Online): -50,00 (03/2024)".to_string()
        ]);
        assert_eq!(stats.by_channel, vec![
            ChannelCount { name: "💻 Online".to_string(), records: 1 },
            ChannelCount { name: "📍 Fisico".to_string(), records: 2 },
        ]);
    }
}
