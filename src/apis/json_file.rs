use crate::apis::faker_persons::parse_persons_body;
use crate::error::FetchError;
use crate::types::{PageRequest, PersonApi, RawPerson};
use std::fs;
use std::path::Path;
use tracing::info;

/// Serves persons from memory, typically loaded from a saved API response.
pub struct JsonFileSource {
    name: String,
    records: Vec<RawPerson>,
}

impl JsonFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let body = serde_json::from_str(&fs::read_to_string(path)?)?;
        let records = parse_persons_body(body)?;
        info!("Loaded {} persons from {}", records.len(), path.display());
        Ok(Self::from_records(format!("file:{}", path.display()), records))
    }

    pub fn from_records(name: impl Into<String>, records: Vec<RawPerson>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait::async_trait]
impl PersonApi for JsonFileSource {
    fn api_name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawPerson>, FetchError> {
        let start = request.offset.min(self.records.len());
        let end = request.offset.saturating_add(request.quantity).min(self.records.len());
        Ok(self.records[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn pages_through_records() {
        let source = JsonFileSource::from_records("memory", vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        let page = |offset, quantity| PageRequest { index: 0, offset, quantity, seed: None };

        assert_eq!(source.fetch_page(&page(0, 2)).await.unwrap().len(), 2);
        assert_eq!(source.fetch_page(&page(2, 2)).await.unwrap(), vec![json!({"id": 3})]);
        assert!(source.fetch_page(&page(5, 2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn opens_saved_api_response() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"status": "OK", "data": [{{"id": 7}}]}}"#).unwrap();

        let source = JsonFileSource::open(file.path()).unwrap();
        assert!(source.api_name().starts_with("file:"));
        let page = PageRequest { index: 0, offset: 0, quantity: 10, seed: None };
        assert_eq!(source.fetch_page(&page).await.unwrap(), vec![json!({"id": 7})]);
    }
}
