/// Defaults shared by the config layer and the CLI

pub const DEFAULT_API_URL: &str = "https://fakerapi.it/api/v2/persons";
pub const DEFAULT_DB_PATH: &str = "persons.sqlite";
pub const DEFAULT_OUTPUT_DIR: &str = "reports";
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";
pub const DEFAULT_TOTAL_QUANTITY: usize = 30_000;
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// The persons API serves at most this many records per request
pub const MAX_CHUNK_SIZE: usize = 1_000;
pub const MAX_TOTAL_QUANTITY: usize = 1_000_000;

pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_FOCUS_PROVIDER: &str = "gmail.com";
pub const DEFAULT_FOCUS_COUNTRY: &str = "Germany";
pub const DEFAULT_SENIOR_AGE: u32 = 60;

// Environment overrides
pub const ENV_API_URL: &str = "PERSON_PIPELINE_API_URL";
pub const ENV_DB_PATH: &str = "PERSON_PIPELINE_DB_PATH";
pub const ENV_OUTPUT_DIR: &str = "PERSON_PIPELINE_OUTPUT_DIR";
pub const ENV_SALT: &str = "PERSON_PIPELINE_SALT";
pub const ENV_TOTAL_QUANTITY: &str = "PERSON_PIPELINE_TOTAL_QUANTITY";
pub const ENV_CHUNK_SIZE: &str = "PERSON_PIPELINE_CHUNK_SIZE";

/// Earliest birthday accepted by the validator
pub const MIN_BIRTH_YEAR: i32 = 1900;

/// Fields every raw person must carry
pub const REQUIRED_FIELDS: [&str; 5] = ["firstname", "lastname", "email", "birthday", "address"];
pub const REQUIRED_ADDRESS_FIELDS: [&str; 3] = ["street", "city", "country"];
