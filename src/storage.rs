use crate::error::StorageError;
use crate::pipeline::anonymize::{generate_salt, salt_fingerprint};
use crate::types::{AgeGroup, AnonymizedPerson, PipelineRun};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SALT_KEY: &str = "anonymization_salt";
const SALT_FINGERPRINT_KEY: &str = "salt_fingerprint";

const UPSERT_PERSON: &str = "
    INSERT INTO persons (
        person_key, name_digest, email_digest, phone_digest, email_provider,
        gender, city, country, age_group, run_id
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(person_key) DO UPDATE SET
        name_digest = excluded.name_digest,
        email_digest = excluded.email_digest,
        phone_digest = excluded.phone_digest,
        email_provider = excluded.email_provider,
        gender = excluded.gender,
        city = excluded.city,
        country = excluded.country,
        age_group = excluded.age_group,
        run_id = excluded.run_id";

/// SQLite file holding anonymized persons, run statistics and pipeline metadata
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`, creating its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("Opened store at {}", path.display());
        Ok(Self { conn })
    }

    /// Open an existing database without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the schema if it does not exist. Safe to call on every run.
    pub fn initialize(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS persons (
                person_key      TEXT PRIMARY KEY,
                name_digest     TEXT NOT NULL,
                email_digest    TEXT NOT NULL,
                phone_digest    TEXT,
                email_provider  TEXT NOT NULL,
                gender          TEXT,
                city            TEXT NOT NULL,
                country         TEXT NOT NULL,
                age_group       TEXT NOT NULL,
                run_id          TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                id           TEXT PRIMARY KEY,
                source       TEXT NOT NULL,
                started_at   TEXT NOT NULL,
                finished_at  TEXT,
                fetched      INTEGER NOT NULL,
                invalid      INTEGER NOT NULL,
                duplicates   INTEGER NOT NULL,
                rejected     INTEGER NOT NULL,
                stored       INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pipeline_meta (
                key    TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn has_schema(&self) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'persons'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Upsert `records` keyed by `person_key` and record `run`. The batch is
    /// one transaction: either every row and the run's statistics are
    /// written or none is.
    pub fn save(&mut self, records: &[AnonymizedPerson], run: &PipelineRun) -> Result<usize, StorageError> {
        self.write_batch(records, run, false)
    }

    /// Like [`Store::save`], but removes all previously stored persons in the
    /// same transaction.
    pub fn replace_all(&mut self, records: &[AnonymizedPerson], run: &PipelineRun) -> Result<usize, StorageError> {
        self.write_batch(records, run, true)
    }

    fn write_batch(
        &mut self,
        records: &[AnonymizedPerson],
        run: &PipelineRun,
        clear_first: bool,
    ) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;
        if clear_first {
            let removed = tx.execute("DELETE FROM persons", [])?;
            debug!("Cleared {} previously stored persons", removed);
        }

        let run_id = run.id.to_string();
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_PERSON)?;
            for person in records {
                written += stmt.execute(params![
                    person.person_key,
                    person.name_digest,
                    person.email_digest,
                    person.phone_digest,
                    person.email_provider,
                    person.gender,
                    person.city,
                    person.country,
                    person.age_group.to_string(),
                    run_id,
                ])?;
            }
        }
        insert_run(&tx, run)?;
        tx.commit()?;

        info!("Stored {} persons for run {}", written, run.id);
        Ok(written)
    }

    pub fn count_persons(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn load_persons(&self) -> Result<Vec<AnonymizedPerson>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT person_key, name_digest, email_digest, phone_digest, email_provider,
                    gender, city, country, age_group
             FROM persons ORDER BY person_key",
        )?;
        let persons = stmt
            .query_map([], person_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    /// Most recently started run, if any was recorded
    pub fn latest_run(&self) -> Result<Option<PipelineRun>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, source, started_at, finished_at, fetched, invalid, duplicates, rejected, stored
                 FROM pipeline_runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        [
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                            row.get::<_, i64>(8)?,
                        ],
                    ))
                },
            )
            .optional()?;

        let Some((id, source, started_at, finished_at, counts)) = row else {
            return Ok(None);
        };
        let [fetched, invalid, duplicates, rejected, stored] = counts.map(|c| c as usize);
        Ok(Some(PipelineRun {
            id: Uuid::parse_str(&id).map_err(|e| StorageError::Corrupt(format!("run id '{id}': {e}")))?,
            source,
            started_at: parse_timestamp(&started_at)?,
            finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            fetched,
            invalid,
            duplicates,
            rejected,
            stored,
        }))
    }

    /// The salt kept in the database, generated and stored on first use.
    pub fn load_or_create_salt(&self) -> Result<String, StorageError> {
        if let Some(salt) = self.get_meta(SALT_KEY)? {
            return Ok(salt);
        }
        let salt = generate_salt();
        self.set_meta(SALT_KEY, &salt)?;
        info!("Generated and stored a new anonymization salt");
        Ok(salt)
    }

    /// Remember which salt wrote the stored rows. Returns false (and logs)
    /// when a different salt was used before, since existing keys will no
    /// longer match.
    pub fn check_salt_fingerprint(&self, salt: &str) -> Result<bool, StorageError> {
        let fingerprint = salt_fingerprint(salt);
        let previous = self.get_meta(SALT_FINGERPRINT_KEY)?;
        self.set_meta(SALT_FINGERPRINT_KEY, &fingerprint)?;
        match previous {
            Some(prev) if prev != fingerprint => {
                warn!("Anonymization salt changed since the last run; stored persons will not be matched by key");
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM pipeline_meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO pipeline_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn insert_run(conn: &Connection, run: &PipelineRun) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO pipeline_runs
            (id, source, started_at, finished_at, fetched, invalid, duplicates, rejected, stored)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.id.to_string(),
            run.source,
            timestamp(&run.started_at),
            run.finished_at.as_ref().map(timestamp),
            run.fetched as i64,
            run.invalid as i64,
            run.duplicates as i64,
            run.rejected as i64,
            run.stored as i64,
        ],
    )?;
    Ok(())
}

fn person_from_row(row: &Row<'_>) -> rusqlite::Result<AnonymizedPerson> {
    let age_group: String = row.get(8)?;
    let age_group = age_group
        .parse::<AgeGroup>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, e.into()))?;
    Ok(AnonymizedPerson {
        person_key: row.get(0)?,
        name_digest: row.get(1)?,
        email_digest: row.get(2)?,
        phone_digest: row.get(3)?,
        email_provider: row.get(4)?,
        gender: row.get(5)?,
        city: row.get(6)?,
        country: row.get(7)?,
        age_group,
    })
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{raw}': {e}")))
}
