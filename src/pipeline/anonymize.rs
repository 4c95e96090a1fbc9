//! One-way anonymization of cleaned persons.
//!
//! Identifying fields become salted SHA-256 digests. The same salt and input
//! always produce the same output, so a re-run maps a person onto the same
//! `person_key` and the store can upsert instead of duplicating.

use crate::error::AnonymizeError;
use crate::types::{AgeGroup, AnonymizedPerson, CleanPerson};
use chrono::{Datelike, NaiveDate};
use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 32;

pub struct Anonymizer {
    salt: String,
    as_of: NaiveDate,
}

impl Anonymizer {
    /// `as_of` is the date ages are computed against.
    pub fn new(salt: impl Into<String>, as_of: NaiveDate) -> Result<Self, AnonymizeError> {
        let salt = salt.into();
        if salt.is_empty() {
            return Err(AnonymizeError::EmptySalt);
        }
        Ok(Self { salt, as_of })
    }

    /// Rejects the record instead of letting an identifying field through.
    pub fn anonymize(&self, person: &CleanPerson) -> Result<AnonymizedPerson, AnonymizeError> {
        if person.firstname.is_empty() || person.lastname.is_empty() {
            return Err(AnonymizeError::MissingField("name"));
        }
        let provider = match person.email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => domain,
            _ => return Err(AnonymizeError::MissingField("email domain")),
        };
        if person.address.city.is_empty() {
            return Err(AnonymizeError::MissingField("city"));
        }
        if person.address.country.is_empty() {
            return Err(AnonymizeError::MissingField("country"));
        }
        let age = age_on(person.birthday, self.as_of).ok_or_else(|| AnonymizeError::InvalidField {
            field: "birthday",
            reason: "birthday is after the reference date".into(),
        })?;

        let birthday = person.birthday.to_string();
        Ok(AnonymizedPerson {
            person_key: self.digest(
                "person",
                &[&person.email, &person.firstname, &person.lastname, &birthday],
            ),
            name_digest: self.digest("name", &[&person.firstname, &person.lastname]),
            email_digest: self.digest("email", &[&person.email]),
            phone_digest: person.phone.as_deref().map(|p| self.digest("phone", &[p])),
            email_provider: provider.to_string(),
            gender: person.gender.clone(),
            city: person.address.city.clone(),
            country: person.address.country.clone(),
            age_group: AgeGroup::from_age(age),
        })
    }

    /// Hex SHA-256 over the salt, a per-field tag and length-prefixed parts
    fn digest(&self, tag: &str, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b"|");
        hasher.update(tag.as_bytes());
        for part in parts {
            hasher.update(b"|");
            hasher.update(part.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Full years between `birthday` and `as_of`; `None` if born after `as_of`.
pub fn age_on(birthday: NaiveDate, as_of: NaiveDate) -> Option<u32> {
    if birthday > as_of {
        return None;
    }
    let mut years = as_of.year() - birthday.year();
    if (as_of.month(), as_of.day()) < (birthday.month(), birthday.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Fresh random salt, hex encoded
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short digest identifying a salt without revealing it
pub fn salt_fingerprint(salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"salt-fingerprint|");
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
