pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod types;

pub use config::Config;
pub use pipeline::process_data;
pub use report::generate_report;
