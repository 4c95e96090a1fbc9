use crate::error::FetchError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Raw person data as returned from the persons API
pub type RawPerson = serde_json::Value;

/// Postal address of a cleaned person
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    #[serde(rename = "streetName", skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(rename = "buildingNumber", skip_serializing_if = "Option::is_none")]
    pub building_number: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// A person that passed validation, with normalized fields.
///
/// Serializes back into the raw API shape, so a cleaned person can be fed to
/// the validator again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CleanPerson {
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub birthday: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Decade bucket of a person's age, rendered as `[30-39]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AgeGroup {
    floor: u32,
}

impl AgeGroup {
    pub fn from_age(age: u32) -> Self {
        Self { floor: age / 10 * 10 }
    }

    /// Lowest age in the bucket
    pub fn floor(&self) -> u32 {
        self.floor
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.floor, self.floor + 9)
    }
}

impl FromStr for AgeGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| format!("age group '{s}' is not bracketed"))?;
        let (low, high) = inner
            .split_once('-')
            .ok_or_else(|| format!("age group '{s}' has no range"))?;
        let floor: u32 = low.parse().map_err(|_| format!("age group '{s}' has a bad lower bound"))?;
        let ceil: u32 = high.parse().map_err(|_| format!("age group '{s}' has a bad upper bound"))?;
        if floor % 10 != 0 || ceil != floor + 9 {
            return Err(format!("age group '{s}' is not a decade"));
        }
        Ok(Self { floor })
    }
}

impl From<AgeGroup> for String {
    fn from(group: AgeGroup) -> Self {
        group.to_string()
    }
}

impl TryFrom<String> for AgeGroup {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What is persisted for a person: digests in place of identifying fields,
/// coarse attributes in clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizedPerson {
    /// Salted digest of the identity tuple; unique in the store
    pub person_key: String,
    pub name_digest: String,
    pub email_digest: String,
    pub phone_digest: Option<String>,
    pub email_provider: String,
    pub gender: Option<String>,
    pub city: String,
    pub country: String,
    pub age_group: AgeGroup,
}

/// Statistics of one process run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub stored: usize,
}

impl PipelineRun {
    pub fn start(source: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            fetched: 0,
            invalid: 0,
            duplicates: 0,
            rejected: 0,
            stored: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.stored
    }

    /// Records dropped for failing validation or anonymization
    pub fn skipped(&self) -> usize {
        self.invalid + self.rejected
    }
}

/// One page of a fetch plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    pub offset: usize,
    pub quantity: usize,
    pub seed: Option<u64>,
}

/// Core trait that every person data source implements
#[async_trait::async_trait]
pub trait PersonApi: Send + Sync {
    /// Identifier recorded with each run
    fn api_name(&self) -> &str;

    /// Fetch one page of raw persons
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawPerson>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_group_buckets_by_decade() {
        assert_eq!(AgeGroup::from_age(34).to_string(), "[30-39]");
        assert_eq!(AgeGroup::from_age(60).to_string(), "[60-69]");
        assert_eq!(AgeGroup::from_age(7).to_string(), "[0-9]");
        assert_eq!(AgeGroup::from_age(104).floor(), 100);
    }

    #[test]
    fn age_group_parses_its_own_label() {
        let group: AgeGroup = "[70-79]".parse().unwrap();
        assert_eq!(group.floor(), 70);
        assert!("[70-80]".parse::<AgeGroup>().is_err());
        assert!("70-79".parse::<AgeGroup>().is_err());
    }

    #[test]
    fn run_counts_skipped_as_invalid_plus_rejected() {
        let mut run = PipelineRun::start("test");
        run.invalid = 2;
        run.rejected = 1;
        run.duplicates = 4;
        run.stored = 5;
        assert_eq!(run.skipped(), 3);
        assert_eq!(run.processed(), 5);
    }
}
