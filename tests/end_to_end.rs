use anyhow::Result;
use person_pipeline::apis::JsonFileSource;
use person_pipeline::config::{Config, ReportFormat};
use person_pipeline::error::ReportError;
use person_pipeline::storage::Store;
use person_pipeline::{generate_report, process_data};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.db_path = dir.join("data").join("persons.sqlite");
    config.report.output_dir = dir.join("reports");
    config.anonymization.salt = Some("integration-salt".into());
    config.api.total_quantity = 3;
    config.api.chunk_size = 2;
    config
}

fn raw_person(first: &str, last: &str, email: Option<&str>, country: &str) -> Value {
    let mut person = json!({
        "id": 1,
        "firstname": first,
        "lastname": last,
        "birthday": "1958-03-14",
        "phone": "+49 30 1234567",
        "gender": "female",
        "address": {
            "street": "Unter den Linden 1",
            "city": "Berlin",
            "zipcode": "10117",
            "country": country
        }
    });
    if let Some(email) = email {
        person["email"] = json!(email);
    }
    person
}

fn three_records() -> Vec<Value> {
    vec![
        raw_person("anna", "SCHMIDT", Some("Anna.Schmidt@gmail.com"), "Germany"),
        raw_person("Bruno", "Keller", None, "Germany"),
        raw_person("clara", "weiss", Some("clara.weiss@web.de"), "Austria"),
    ]
}

#[tokio::test]
async fn stores_valid_records_and_reports_skips() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    let source = JsonFileSource::from_records("fixture", three_records());

    let run = process_data(&config, &source).await?;
    assert_eq!(run.fetched, 3);
    assert_eq!(run.invalid, 1);
    assert_eq!(run.processed(), 2);
    assert_eq!(run.skipped(), 1);

    let store = Store::open(&config.storage.db_path)?;
    assert_eq!(store.count_persons()?, 2);

    let report = generate_report(&config)?;
    assert_eq!(report.path, dir.path().join("reports").join("report.md"));
    let text = fs::read_to_string(&report.path)?;
    assert!(text.contains("Total records: 2"));
    assert!(text.contains("processed: 2, skipped: 1"));
    assert!(text.contains("Users aged 60+: 1"));
    Ok(())
}

#[tokio::test]
async fn rerun_keeps_one_row_per_person() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    let source = JsonFileSource::from_records("fixture", three_records());

    process_data(&config, &source).await?;
    let second = process_data(&config, &source).await?;
    assert_eq!(second.stored, 2);

    let store = Store::open(&config.storage.db_path)?;
    assert_eq!(store.count_persons()?, 2);
    Ok(())
}

#[tokio::test]
async fn same_identity_with_other_address_counts_once() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    let mut moved = raw_person("anna", "SCHMIDT", Some("Anna.Schmidt@gmail.com"), "Germany");
    moved["address"]["city"] = json!("Hamburg");
    let records = vec![
        raw_person("anna", "SCHMIDT", Some("Anna.Schmidt@gmail.com"), "Germany"),
        moved,
    ];

    let run = process_data(&config, &JsonFileSource::from_records("fixture", records)).await?;
    assert_eq!(run.processed(), 1);
    assert_eq!(run.duplicates, 1);
    assert_eq!(Store::open(&config.storage.db_path)?.count_persons()?, 1);

    let text = fs::read_to_string(generate_report(&config)?.path)?;
    assert!(text.contains("Total records: 1"));
    assert!(text.contains("processed: 1, skipped: 0, duplicates: 1"));
    Ok(())
}

#[tokio::test]
async fn generated_salt_keeps_keys_stable_across_runs() -> Result<()> {
    let dir = tempdir()?;
    let mut config = config_in(dir.path());
    config.anonymization.salt = None;
    let source = JsonFileSource::from_records("fixture", three_records());

    process_data(&config, &source).await?;
    let keys_before: Vec<String> = Store::open(&config.storage.db_path)?
        .load_persons()?
        .into_iter()
        .map(|p| p.person_key)
        .collect();

    process_data(&config, &source).await?;
    let store = Store::open(&config.storage.db_path)?;
    let keys_after: Vec<String> = store.load_persons()?.into_iter().map(|p| p.person_key).collect();
    assert_eq!(keys_before, keys_after);
    Ok(())
}

#[tokio::test]
async fn stored_rows_carry_no_raw_identifiers() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    let source = JsonFileSource::from_records("fixture", three_records());
    process_data(&config, &source).await?;

    let persons = Store::open(&config.storage.db_path)?.load_persons()?;
    let dump = serde_json::to_string(&persons)?.to_lowercase();
    for raw in ["anna", "schmidt", "clara", "weiss", "anna.schmidt@gmail.com", "unter den linden"] {
        assert!(!dump.contains(raw), "{raw} was stored");
    }
    let providers: Vec<&str> = persons.iter().map(|p| p.email_provider.as_str()).collect();
    assert!(providers.contains(&"gmail.com"));
    Ok(())
}

#[tokio::test]
async fn fresh_run_replaces_previous_rows() -> Result<()> {
    let dir = tempdir()?;
    let mut config = config_in(dir.path());
    process_data(&config, &JsonFileSource::from_records("fixture", three_records())).await?;

    config.storage.fresh = true;
    let only_one = vec![raw_person("dora", "lang", Some("dora@example.org"), "Switzerland")];
    process_data(&config, &JsonFileSource::from_records("fixture", only_one)).await?;

    let store = Store::open(&config.storage.db_path)?;
    assert_eq!(store.count_persons()?, 1);
    assert_eq!(store.load_persons()?[0].country, "Switzerland");
    Ok(())
}

#[test]
fn report_on_empty_store_states_zero_records() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    Store::open(&config.storage.db_path)?.initialize()?;

    let report = generate_report(&config)?;
    assert_eq!(report.stats.total_records, 0);
    let text = fs::read_to_string(&report.path)?;
    assert!(text.contains("Total records: 0"));
    Ok(())
}

#[test]
fn report_without_database_fails() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let err = generate_report(&config).unwrap_err();
    assert!(matches!(err, ReportError::StoreMissing(_)));
}

#[tokio::test]
async fn json_report_overwrites_previous_file() -> Result<()> {
    let dir = tempdir()?;
    let mut config = config_in(dir.path());
    config.report.format = ReportFormat::Json;
    process_data(&config, &JsonFileSource::from_records("fixture", three_records())).await?;

    fs::create_dir_all(&config.report.output_dir)?;
    fs::write(config.report.output_path(), "stale")?;

    let report = generate_report(&config)?;
    let doc: Value = serde_json::from_str(&fs::read_to_string(&report.path)?)?;
    assert_eq!(doc["total_records"], json!(2));
    assert_eq!(doc["last_run"]["stored"], json!(2));
    assert_eq!(doc["focus"]["provider"], json!("gmail.com"));
    assert!(doc["generated_at"].is_string());
    Ok(())
}
