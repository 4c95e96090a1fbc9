use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::types::{PageRequest, PersonApi, RawPerson};
use metrics::histogram;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Number of requests needed for `total` records at `chunk_size` per request
pub fn page_count(total: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        0
    } else {
        total.div_ceil(chunk_size)
    }
}

/// Split `total` records into pages of at most `chunk_size`. With a seed,
/// page `i` is seeded with `seed + i` so pages do not repeat each other.
pub fn plan_pages(total: usize, chunk_size: usize, seed: Option<u64>) -> impl Iterator<Item = PageRequest> {
    (0..page_count(total, chunk_size)).map(move |index| {
        let offset = index * chunk_size;
        PageRequest {
            index,
            offset,
            quantity: chunk_size.min(total - offset),
            seed: seed.map(|s| s.wrapping_add(index as u64)),
        }
    })
}

/// Request every planned page in order. The first failing page aborts the fetch.
#[instrument(skip(api, config), fields(api_name = %api.api_name()))]
pub async fn fetch_all(api: &dyn PersonApi, config: &ApiConfig) -> Result<Vec<RawPerson>, FetchError> {
    info!(
        "Fetching {} records in {} pages",
        config.total_quantity,
        page_count(config.total_quantity, config.chunk_size)
    );
    let started = Instant::now();

    let mut records = Vec::new();
    for page in plan_pages(config.total_quantity, config.chunk_size, config.seed) {
        let batch = api.fetch_page(&page).await?;
        let received = batch.len();
        debug!("Page {} returned {} of {} records", page.index, received, page.quantity);
        records.extend(batch);
        if received < page.quantity {
            info!("Source exhausted after page {}", page.index);
            break;
        }
    }

    histogram!("person_pipeline_fetch_duration_seconds", "api" => api.api_name().to_string())
        .record(started.elapsed().as_secs_f64());
    info!("Fetched {} records", records.len());
    Ok(records)
}
