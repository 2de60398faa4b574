//! Gaming Analytics - ingestion and analytics for regulatory spreadsheet reports
//!
//! Responsibilities:
//! - Import report files in any of the four known layouts
//! - Maintain the dealer registry, game-name alias and sector lookup tables
//! - Filter, aggregate and summarize the accumulated dataset
//! - Export the filtered dataset as CSV or a workbook
//!
//! Usage:
//!   # Import one or more report files:
//!   cargo run -- import reports/slot-2024-03.xlsx reports/ippica.xlsx
//!
//!   # Dataset overview:
//!   cargo run -- status
//!
//!   # Filtered aggregation:
//!   cargo run -- query --year 2024 --comparto AWP --group-by concessionario --metric importo-raccolta
//!
//!   # Export the filtered subset:
//!   cargo run -- export --year 2024 --output out.csv
//!
//! State lives under --data-dir (or GAMING_ANALYTICS_DIR, default ./data).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};

use gaming_analytics::analytics::{aggregate, humanize_label, summary_stats, Metric};
use gaming_analytics::export;
use gaming_analytics::filters::{Dimension, FilterSelection};
use gaming_analytics::mappings::{parse_alias_rows, parse_registry_rows, parse_sector_rows};
use gaming_analytics::state::{Dashboard, EngineConfig};
use gaming_analytics::store::{DirStore, DEFAULT_RETENTION_MONTHS};
use gaming_analytics::workbook::read_rows;

#[derive(Parser, Debug)]
#[command(name = "gaming-analytics", about = "Analytics over gaming-industry regulatory reports")]
struct Cli {
    /// Storage directory (default: GAMING_ANALYTICS_DIR or ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import report files (layout is auto-detected per file)
    Import {
        /// Report files to ingest
        files: Vec<PathBuf>,
    },
    /// Show dataset counts and summary statistics
    Status,
    /// List the distinct values of a filter dimension
    Values {
        #[arg(long, value_enum)]
        dimension: Dimension,
    },
    /// Filter the dataset; optionally aggregate by a dimension
    Query {
        #[command(flatten)]
        filters: FilterArgs,
        /// Group the filtered subset by this dimension
        #[arg(long, value_enum)]
        group_by: Option<Dimension>,
        /// Metric summed per group
        #[arg(long, value_enum, default_value = "importo-raccolta")]
        metric: Metric,
        /// Table page to print (50 records per page)
        #[arg(long, default_value = "0")]
        page: usize,
    },
    /// Export the filtered subset as CSV or a workbook
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        output: PathBuf,
        /// Inferred from the output extension when omitted
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
    },
    /// Load the dealer registry from a spreadsheet and re-enrich the dataset
    LoadRegistry { file: PathBuf },
    /// Load the game-name alias table and re-enrich the dataset
    LoadAliases { file: PathBuf },
    /// Load the sector classification table and re-enrich the dataset
    LoadSectors { file: PathBuf },
    /// Export a lookup table as a workbook
    ExportTable {
        #[arg(long, value_enum)]
        table: Table,
        #[arg(long)]
        output: PathBuf,
    },
    /// Drop records older than the retention window
    Cleanup {
        #[arg(long, default_value_t = DEFAULT_RETENTION_MONTHS)]
        months: u32,
    },
    /// Drop all records (lookup tables are kept)
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Game display name (repeatable)
    #[arg(long = "game")]
    games: Vec<String>,
    #[arg(long = "year")]
    years: Vec<String>,
    /// Quarter as "Q1/2024" (repeatable)
    #[arg(long = "quarter")]
    quarters: Vec<String>,
    /// Month as "03/2024" (repeatable)
    #[arg(long = "month")]
    months: Vec<String>,
    /// Channel: fisico or online
    #[arg(long = "channel")]
    channels: Vec<String>,
    #[arg(long = "concessionario")]
    concessionari: Vec<String>,
    #[arg(long = "proprieta")]
    proprieta: Vec<String>,
    #[arg(long = "ragione-sociale")]
    ragioni_sociali: Vec<String>,
    #[arg(long = "comparto")]
    comparti: Vec<String>,
    /// Horse-racing bet-type display label (repeatable)
    #[arg(long = "tipo-gioco")]
    tipi_gioco: Vec<String>,
    /// Ownership group, historical records only (repeatable)
    #[arg(long = "gruppo")]
    gruppi: Vec<String>,
}

impl FilterArgs {
    fn selection(&self) -> FilterSelection {
        FilterSelection {
            games: self.games.clone(),
            years: self.years.clone(),
            quarters: self.quarters.clone(),
            months: self.months.clone(),
            channels: self.channels.clone(),
            concessionari: self.concessionari.clone(),
            proprieta: self.proprieta.clone(),
            ragioni_sociali: self.ragioni_sociali.clone(),
            comparti: self.comparti.clone(),
            tipi_gioco: self.tipi_gioco.clone(),
            gruppi: self.gruppi.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Table {
    Registry,
    Aliases,
    Sectors,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var("GAMING_ANALYTICS_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));
    let blob = DirStore::open(&data_dir)?;
    let mut dashboard = Dashboard::new(Box::new(blob), EngineConfig::default());
    let loaded = dashboard.load_all(Utc::now())?;
    if loaded > 0 {
        println!("Loaded {loaded} stored records from {}", data_dir.display());
    }

    match cli.command {
        Command::Import { files } => run_import(&mut dashboard, files),
        Command::Status => run_status(&dashboard),
        Command::Values { dimension } => {
            for value in dashboard.index().distinct_values(dimension) {
                println!("{value}");
            }
            Ok(())
        }
        Command::Query { filters, group_by, metric, page } => {
            run_query(&dashboard, &filters.selection(), group_by, metric, page)
        }
        Command::Export { filters, output, format } => {
            run_export(&dashboard, &filters.selection(), &output, format)
        }
        Command::LoadRegistry { file } => {
            let rows = read_rows(&file)?;
            let entries = parse_registry_rows(&rows)
                .with_context(|| format!("parsing registry {}", file.display()))?;
            println!("Loaded {} registry entries", entries.len());
            let reenriched = dashboard.set_registry(entries, &mut print_progress)?;
            println!("Re-enriched {reenriched} records");
            Ok(())
        }
        Command::LoadAliases { file } => {
            let entries = parse_alias_rows(&read_rows(&file)?);
            println!("Loaded {} game-name aliases", entries.len());
            let reenriched = dashboard.set_aliases(entries, &mut print_progress)?;
            println!("Re-enriched {reenriched} records");
            Ok(())
        }
        Command::LoadSectors { file } => {
            let entries = parse_sector_rows(&read_rows(&file)?);
            println!("Loaded {} sector mappings", entries.len());
            let reenriched = dashboard.set_sectors(entries, &mut print_progress)?;
            println!("Re-enriched {reenriched} records");
            Ok(())
        }
        Command::ExportTable { table, output } => {
            match table {
                Table::Registry => {
                    export::write_registry_xlsx(&dashboard.mappings().registry, &output)?
                }
                Table::Aliases => export::write_alias_xlsx(&dashboard.mappings().aliases, &output)?,
                Table::Sectors => export::write_sector_xlsx(&dashboard.mappings().sectors, &output)?,
            }
            println!("Wrote {}", output.display());
            Ok(())
        }
        Command::Cleanup { months } => {
            let removed = dashboard.cleanup(months, Utc::now())?;
            println!(
                "Cleanup complete: removed {removed} records older than {months} months ({} kept)",
                dashboard.records().len()
            );
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the dataset without --yes");
            }
            dashboard.clear()?;
            println!("All records cleared");
            Ok(())
        }
    }
}

fn print_progress(done: usize, total: usize) {
    if total > 0 {
        println!("  processed {done}/{total} records");
    }
}

fn run_import(dashboard: &mut Dashboard, files: Vec<PathBuf>) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }
    println!("Importing {} file(s)...", files.len());
    let report = dashboard.ingest_files(&files, &mut print_progress)?;

    for (file, error) in &report.files_failed {
        eprintln!("FAILED {file}: {error}");
    }
    println!(
        "Imported {} file(s), {} failed: {} records parsed, {} added, {} duplicates dropped",
        report.files_ok,
        report.files_failed.len(),
        report.parsed,
        report.added,
        report.duplicates
    );
    if let Some(warning) = &report.persist.warning {
        eprintln!("WARNING: {warning}");
    }
    println!("Dataset now holds {} records", dashboard.records().len());
    Ok(())
}

fn run_status(dashboard: &Dashboard) -> Result<()> {
    let records = dashboard.records();
    println!("Records: {}", records.len());
    println!("Registry entries: {}", dashboard.mappings().registry.len());
    println!("Game-name aliases: {}", dashboard.mappings().aliases.len());
    println!("Sector mappings: {}", dashboard.mappings().sectors.len());

    if records.is_empty() {
        return Ok(());
    }
    let stats = summary_stats(records);
    println!("Unique dealers: {}", stats.unique_concessionari);
    println!("Total raccolta: {}", stats.total_raccolta);
    println!("Total spesa: {}", stats.total_spesa);
    for channel in &stats.by_channel {
        println!("  {}: {} records", channel.name, channel.records);
    }
    if stats.has_negative_values {
        println!("Negative spend values:");
        for line in &stats.negative_alerts {
            println!("  {line}");
        }
    }
    Ok(())
}

fn run_query(
    dashboard: &Dashboard,
    selection: &FilterSelection,
    group_by: Option<Dimension>,
    metric: Metric,
    page: usize,
) -> Result<()> {
    let positions = dashboard.apply_filters(selection);
    println!(
        "Filtered {} of {} records",
        positions.len(),
        dashboard.records().len()
    );
    let filtered = dashboard.records_at(&positions);

    let stats = summary_stats(filtered.iter().copied());
    println!("Total raccolta: {}  Total spesa: {}", stats.total_raccolta, stats.total_spesa);
    if stats.has_negative_values {
        println!("Negative spend values:");
        for line in &stats.negative_alerts {
            println!("  {line}");
        }
    }

    if let Some(dim) = group_by {
        println!("\n{} per group (top 20):", metric.title());
        for bucket in aggregate(filtered.iter().copied(), metric, dim) {
            println!(
                "  {:<40} {:>18}",
                humanize_label(dim, &bucket.label),
                gaming_analytics::format_italian_f64(bucket.value)
            );
        }
        return Ok(());
    }

    for &pos in dashboard.page(&positions, page) {
        let r = &dashboard.records()[pos as usize];
        println!(
            "  {} | {} | {} | {} | raccolta {} | spesa {}",
            r.game_name_complete,
            r.concessionario_nome,
            r.month_year,
            r.channel_name,
            r.importo_raccolta,
            r.importo_spesa
        );
    }
    Ok(())
}

fn run_export(
    dashboard: &Dashboard,
    selection: &FilterSelection,
    output: &PathBuf,
    format: Option<ExportFormat>,
) -> Result<()> {
    let positions = dashboard.apply_filters(selection);
    let filtered = dashboard.records_at(&positions);

    let format = format.unwrap_or_else(|| {
        match output.extension().and_then(|e| e.to_str()) {
            Some("xlsx") | Some("xls") => ExportFormat::Xlsx,
            _ => ExportFormat::Csv,
        }
    });
    match format {
        ExportFormat::Csv => export::write_csv_file(filtered.iter().copied(), output)?,
        ExportFormat::Xlsx => export::write_xlsx(filtered.iter().copied(), output)?,
    }
    println!("Exported {} records to {}", positions.len(), output.display());
    Ok(())
}
