//! Report stage: aggregate the stored persons and write a report file.
//!
//! Runs independently of the process stage; the database file is the only
//! thing the two share. An empty store yields a report stating zero records.

use crate::config::{Config, ReportConfig, ReportFormat};
use crate::error::ReportError;
use crate::storage::Store;
use crate::types::{AgeGroup, AnonymizedPerson, PipelineRun};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const FOCUS_TOP_COUNTRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UniqueCounts {
    pub city: usize,
    pub country: usize,
    pub age_group: usize,
    pub email_provider: usize,
}

/// Metrics about users of one email provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusMetrics {
    pub provider: String,
    pub country: String,
    pub senior_age: u32,
    pub provider_users: usize,
    /// Share of all users living in `country` and using `provider`, in percent
    pub provider_in_country_percentage: f64,
    pub top_countries: Vec<CategoryCount>,
    /// Provider users whose age group starts at or above `senior_age`
    pub seniors: usize,
    pub age_distribution: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStats {
    pub total_records: usize,
    pub last_run: Option<PipelineRun>,
    pub unique_values: UniqueCounts,
    pub top_countries: Vec<CategoryCount>,
    pub top_email_providers: Vec<CategoryCount>,
    pub age_distribution: Vec<CategoryCount>,
    pub gender_distribution: Vec<CategoryCount>,
    pub focus: FocusMetrics,
}

impl ReportStats {
    pub fn compute(persons: &[AnonymizedPerson], config: &ReportConfig) -> Self {
        let unique = |f: fn(&AnonymizedPerson) -> String| persons.iter().map(f).collect::<BTreeSet<_>>().len();

        let focus_users: Vec<&AnonymizedPerson> = persons
            .iter()
            .filter(|p| p.email_provider.eq_ignore_ascii_case(&config.focus_provider))
            .collect();
        let in_country = focus_users
            .iter()
            .filter(|p| p.country.eq_ignore_ascii_case(&config.focus_country))
            .count();

        let mut focus_countries = count_by(focus_users.iter().map(|p| p.country.as_str()));
        focus_countries.truncate(FOCUS_TOP_COUNTRIES);

        let mut top_countries = count_by(persons.iter().map(|p| p.country.as_str()));
        top_countries.truncate(config.top_n);
        let mut top_email_providers = count_by(persons.iter().map(|p| p.email_provider.as_str()));
        top_email_providers.truncate(config.top_n);

        Self {
            total_records: persons.len(),
            last_run: None,
            unique_values: UniqueCounts {
                city: unique(|p| p.city.clone()),
                country: unique(|p| p.country.clone()),
                age_group: unique(|p| p.age_group.to_string()),
                email_provider: unique(|p| p.email_provider.clone()),
            },
            top_countries,
            top_email_providers,
            age_distribution: age_distribution(persons.iter()),
            gender_distribution: count_by(
                persons.iter().map(|p| p.gender.as_deref().unwrap_or("unknown")),
            ),
            focus: FocusMetrics {
                provider: config.focus_provider.clone(),
                country: config.focus_country.clone(),
                senior_age: config.senior_age,
                provider_users: focus_users.len(),
                provider_in_country_percentage: percentage(in_country, persons.len()),
                top_countries: focus_countries,
                seniors: focus_users
                    .iter()
                    .filter(|p| p.age_group.floor() >= config.senior_age)
                    .count(),
                age_distribution: age_distribution(focus_users.iter().copied()),
            },
        }
    }

    /// Render as Markdown
    pub fn to_markdown(&self, generated_at: DateTime<Utc>) -> String {
        Markdown {
            stats: self,
            generated_at,
        }
        .to_string()
    }
}

struct Markdown<'a> {
    stats: &'a ReportStats,
    generated_at: DateTime<Utc>,
}

impl fmt::Display for Markdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats;
        writeln!(f, "# Person Data Report\n")?;
        writeln!(f, "Generated at: {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;

        writeln!(f, "## Summary\n")?;
        writeln!(f, "- Total records: {}", stats.total_records)?;
        match &stats.last_run {
            Some(run) => writeln!(
                f,
                "- Last run: processed: {}, skipped: {}, duplicates: {} (fetched {} from {})",
                run.processed(),
                run.skipped(),
                run.duplicates,
                run.fetched,
                run.source
            )?,
            None => writeln!(f, "- Last run: none recorded")?,
        }

        if stats.total_records == 0 {
            return writeln!(f, "\nNo records stored.");
        }

        let u = &stats.unique_values;
        writeln!(
            f,
            "- Unique values: {} cities, {} countries, {} age groups, {} email providers",
            u.city, u.country, u.age_group, u.email_provider
        )?;

        write_ranked(f, "Top countries", "Country", &stats.top_countries)?;
        write_table(f, "Age distribution", "Age group", &stats.age_distribution)?;
        write_ranked(f, "Top email providers", "Provider", &stats.top_email_providers)?;
        write_table(f, "Gender", "Gender", &stats.gender_distribution)?;

        let focus = &stats.focus;
        writeln!(f, "\n## {} users\n", focus.provider)?;
        writeln!(f, "- Users: {}", focus.provider_users)?;
        writeln!(
            f,
            "- Share of all users living in {} and using {}: {:.2}%",
            focus.country, focus.provider, focus.provider_in_country_percentage
        )?;
        writeln!(f, "- Users aged {}+: {}", focus.senior_age, focus.seniors)?;
        write_ranked(
            f,
            &format!("Top {} countries using {}", FOCUS_TOP_COUNTRIES, focus.provider),
            "Country",
            &focus.top_countries,
        )?;
        write_table(
            f,
            &format!("Age distribution of {} users", focus.provider),
            "Age group",
            &focus.age_distribution,
        )
    }
}

/// Where a report was written and what it contains
#[derive(Debug)]
pub struct GeneratedReport {
    pub path: PathBuf,
    pub stats: ReportStats,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    stats: &'a ReportStats,
}

/// Read the store named by `config` and write the report, replacing any
/// previous one.
#[instrument(skip(config), fields(db = %config.storage.db_path.display()))]
pub fn generate_report(config: &Config) -> Result<GeneratedReport, ReportError> {
    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        return Err(ReportError::StoreMissing(db_path.clone()));
    }

    let store = Store::open_read_only(db_path)?;
    let (persons, last_run) = if store.has_schema()? {
        (store.load_persons()?, store.latest_run()?)
    } else {
        warn!("Store has no persons table yet; reporting zero records");
        (Vec::new(), None)
    };

    let mut stats = ReportStats::compute(&persons, &config.report);
    stats.last_run = last_run;

    let generated_at = Utc::now();
    let body = match config.report.format {
        ReportFormat::Markdown => stats.to_markdown(generated_at),
        ReportFormat::Json => serde_json::to_string_pretty(&ReportDocument {
            generated_at,
            stats: &stats,
        })?,
    };

    ensure_output_dir(&config.report.output_dir)?;
    let path = config.report.output_path();
    write_replacing(&path, &body)?;

    info!("Report generated and saved as {}", path.display());
    Ok(GeneratedReport { path, stats })
}

/// Create the report directory if needed. Idempotent.
pub fn ensure_output_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Write next to the target and rename, so readers never see a half-written report.
fn write_replacing(path: &Path, body: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

/// Counts sorted by count descending, then value ascending
fn count_by<'a>(values: impl Iterator<Item = &'a str>) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(value, count)| CategoryCount {
            value: value.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    out
}

/// Counts per age group, youngest first
fn age_distribution<'a>(persons: impl Iterator<Item = &'a AnonymizedPerson>) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<AgeGroup, usize> = BTreeMap::new();
    for p in persons {
        *counts.entry(p.age_group).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(group, count)| CategoryCount {
            value: group.to_string(),
            count,
        })
        .collect()
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn write_ranked(f: &mut fmt::Formatter<'_>, title: &str, column: &str, rows: &[CategoryCount]) -> fmt::Result {
    writeln!(f, "\n## {title}\n")?;
    writeln!(f, "| Rank | {column} | Users |")?;
    writeln!(f, "|---|---|---|")?;
    for (i, row) in rows.iter().enumerate() {
        writeln!(f, "| {} | {} | {} |", i + 1, row.value, row.count)?;
    }
    Ok(())
}

fn write_table(f: &mut fmt::Formatter<'_>, title: &str, column: &str, rows: &[CategoryCount]) -> fmt::Result {
    writeln!(f, "\n## {title}\n")?;
    writeln!(f, "| {column} | Users |")?;
    writeln!(f, "|---|---|")?;
    for row in rows {
        writeln!(f, "| {} | {} |", row.value, row.count)?;
    }
    Ok(())
}
