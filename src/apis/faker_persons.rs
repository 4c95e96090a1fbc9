use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::types::{PageRequest, PersonApi, RawPerson};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const FAKER_PERSONS_API: &str = "fakerapi_persons";

/// Client for the fakerapi.it persons endpoint
pub struct FakerPersonsApi {
    client: reqwest::Client,
    url: String,
    locale: Option<String>,
}

impl FakerPersonsApi {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            locale: config.locale.clone(),
        })
    }
}

#[async_trait::async_trait]
impl PersonApi for FakerPersonsApi {
    fn api_name(&self) -> &str {
        FAKER_PERSONS_API
    }

    #[instrument(skip(self), fields(page = request.index, quantity = request.quantity))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawPerson>, FetchError> {
        let mut query = vec![("_quantity", request.quantity.to_string())];
        if let Some(locale) = &self.locale {
            query.push(("_locale", locale.clone()));
        }
        if let Some(seed) = request.seed {
            query.push(("_seed", seed.to_string()));
        }

        let resp = self.client.get(&self.url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body: Value = resp.json().await?;
        let persons = parse_persons_body(body)?;
        debug!("Fetched {} persons", persons.len());
        Ok(persons)
    }
}

/// Extract the records from an API body: either `{"data": [...]}` or a bare array.
pub fn parse_persons_body(body: Value) -> Result<Vec<RawPerson>, FetchError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FetchError::Malformed("'data' is not an array".into())),
            None => Err(FetchError::Malformed("response has no 'data' field".into())),
        },
        _ => Err(FetchError::Malformed("response is neither an object nor an array".into())),
    }
}
