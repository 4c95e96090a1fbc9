//! Process stage: fetch → validate/clean → dedupe → anonymize → store.

pub mod anonymize;
pub mod dedupe;
pub mod fetch;
pub mod validate;

use crate::config::Config;
use crate::error::Result;
use crate::report::ReportStats;
use crate::storage::Store;
use crate::types::{AnonymizedPerson, PersonApi, PipelineRun};
use anonymize::Anonymizer;
use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, instrument, warn};
use validate::Validator;

/// Run the process stage against `api`, writing into the configured store.
///
/// Invalid, duplicate and unanonymizable records are counted and skipped.
/// Fetch and storage failures abort the run; nothing from the batch is
/// stored in that case.
#[instrument(skip(config, api), fields(api_name = %api.api_name()))]
pub async fn process_data(config: &Config, api: &dyn PersonApi) -> Result<PipelineRun> {
    let api_name = api.api_name().to_string();
    let mut run = PipelineRun::start(&api_name);
    let today = Utc::now().date_naive();
    info!("🚀 Starting run {}", run.id);

    let mut store = Store::open(&config.storage.db_path)?;
    store.initialize()?;
    let salt = match &config.anonymization.salt {
        Some(salt) => salt.clone(),
        None => store.load_or_create_salt()?,
    };
    store.check_salt_fingerprint(&salt)?;
    let anonymizer = Anonymizer::new(salt, today)?;

    // Step 1: Fetch
    let raw = fetch::fetch_all(api, &config.api).await?;
    run.fetched = raw.len();
    counter!("person_pipeline_records_fetched_total", "api" => api_name.clone()).increment(raw.len() as u64);

    // Step 2: Validate and clean
    let outcome = Validator::new(today).validate_batch(&raw);
    run.invalid = outcome.invalid.len();
    info!("Validated {} records out of {}", outcome.valid.len(), raw.len());

    // Step 3: Drop duplicates
    let (unique, duplicates) = dedupe::split_duplicates(outcome.valid);
    run.duplicates = duplicates.len();
    info!(
        "Found {} duplicates. {} unique records remaining",
        duplicates.len(),
        unique.len()
    );

    // Step 4: Anonymize
    let mut anonymized: Vec<AnonymizedPerson> = Vec::with_capacity(unique.len());
    for person in &unique {
        match anonymizer.anonymize(person) {
            Ok(a) => anonymized.push(a),
            Err(e) => {
                warn!(error = %e, "Rejecting record during anonymization");
                run.rejected += 1;
            }
        }
    }
    let (anonymized, collapsed) = dedupe::split_same_key(anonymized);
    if !collapsed.is_empty() {
        info!("{} records share an identity with an earlier record in the batch", collapsed.len());
    }
    run.duplicates += collapsed.len();
    info!("Anonymized {} records", anonymized.len());

    // Step 5: Store persons and the run row together
    run.stored = anonymized.len();
    run.finished_at = Some(Utc::now());
    let written = if config.storage.fresh {
        store.replace_all(&anonymized, &run)?
    } else {
        store.save(&anonymized, &run)?
    };
    debug!("Upserted {} rows", written);

    counter!("person_pipeline_records_invalid_total", "api" => api_name.clone()).increment(run.invalid as u64);
    counter!("person_pipeline_records_duplicate_total", "api" => api_name.clone()).increment(run.duplicates as u64);
    counter!("person_pipeline_records_rejected_total", "api" => api_name.clone()).increment(run.rejected as u64);
    counter!("person_pipeline_records_stored_total", "api" => api_name).increment(run.stored as u64);

    let profile = ReportStats::compute(&anonymized, &config.report);
    match serde_json::to_string_pretty(&profile) {
        Ok(json) => info!("Data profile: {}", json),
        Err(e) => warn!("Could not serialize data profile: {}", e),
    }
    info!(
        "✅ Run {} finished: processed {}, skipped {}, duplicates {}",
        run.id,
        run.processed(),
        run.skipped(),
        run.duplicates
    );
    Ok(run)
}
