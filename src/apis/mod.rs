pub mod faker_persons;
pub mod json_file;

pub use faker_persons::FakerPersonsApi;
pub use json_file::JsonFileSource;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::types::PersonApi;
use std::path::Path;

/// The persons API, or a saved response when `input` is given.
pub fn source_for(config: &ApiConfig, input: Option<&Path>) -> Result<Box<dyn PersonApi>, FetchError> {
    match input {
        Some(path) => Ok(Box::new(JsonFileSource::open(path)?)),
        None => Ok(Box::new(FakerPersonsApi::new(config)?)),
    }
}
