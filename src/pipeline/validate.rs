//! Validation and cleaning of raw persons.
//!
//! A raw record either becomes a [`CleanPerson`] or is rejected with a
//! [`ValidationError`]. Cleaning is deterministic for a fixed reference date
//! and idempotent: validating the serialized form of a cleaned person yields
//! the same person.

use crate::constants::{MIN_BIRTH_YEAR, REQUIRED_ADDRESS_FIELDS};
use crate::error::ValidationError;
use crate::types::{Address, CleanPerson, RawPerson};
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of validating a whole batch
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<CleanPerson>,
    /// Index into the batch and the reason it was rejected
    pub invalid: Vec<(usize, ValidationError)>,
}

pub struct Validator {
    today: NaiveDate,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl Validator {
    /// `today` bounds birthdays from above.
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Validate and clean every record; invalid ones are logged and collected.
    pub fn validate_batch(&self, raw: &[RawPerson]) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for (i, record) in raw.iter().enumerate() {
            match self.validate(record) {
                Ok(person) => outcome.valid.push(person),
                Err(e) => {
                    warn!(record = i, error = %e, "Skipping invalid record");
                    outcome.invalid.push((i, e));
                }
            }
        }
        debug!(
            "Validated {} records out of {}",
            outcome.valid.len(),
            raw.len()
        );
        outcome
    }

    pub fn validate(&self, raw: &RawPerson) -> Result<CleanPerson, ValidationError> {
        let obj = raw.as_object().ok_or_else(|| ValidationError::WrongType {
            field: "record".into(),
            expected: "object",
        })?;

        let firstname = capitalize(&required_str(obj, "firstname", "firstname")?);
        let lastname = capitalize(&required_str(obj, "lastname", "lastname")?);

        let email = required_str(obj, "email", "email")?.to_lowercase();
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidFormat {
                field: "email".into(),
                reason: "expected local@domain.tld".into(),
            });
        }

        let birthday = self.birthday(obj)?;
        let address = address(obj)?;

        let phone = optional_str(obj, "phone", "phone")?
            .map(|p| p.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|digits| !digits.is_empty());
        let gender = optional_str(obj, "gender", "gender")?.map(|g| g.to_lowercase());

        Ok(CleanPerson {
            source_id: source_id(obj)?,
            firstname,
            lastname,
            email,
            phone,
            birthday,
            gender,
            address,
            website: optional_str(obj, "website", "website")?,
            image: optional_str(obj, "image", "image")?,
        })
    }

    fn birthday(&self, obj: &Map<String, Value>) -> Result<NaiveDate, ValidationError> {
        let raw = required_str(obj, "birthday", "birthday")?;
        let date = parse_date(&raw).ok_or_else(|| ValidationError::InvalidFormat {
            field: "birthday".into(),
            reason: format!("expected {DATE_FORMAT}"),
        })?;
        if date > self.today {
            return Err(ValidationError::OutOfRange {
                field: "birthday".into(),
                reason: "date is in the future".into(),
            });
        }
        if date < NaiveDate::from_ymd_opt(MIN_BIRTH_YEAR, 1, 1).unwrap_or(NaiveDate::MIN) {
            return Err(ValidationError::OutOfRange {
                field: "birthday".into(),
                reason: format!("date is before {MIN_BIRTH_YEAR}"),
            });
        }
        Ok(date)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// True when every required address part is present and non-blank
pub fn is_valid_address(address: &Value) -> bool {
    address.as_object().is_some_and(|obj| {
        REQUIRED_ADDRESS_FIELDS
            .iter()
            .all(|f| obj.get(*f).and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()))
    })
}

fn address(obj: &Map<String, Value>) -> Result<Address, ValidationError> {
    let addr = match obj.get("address") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("address".into())),
        Some(Value::Object(addr)) => addr,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "address".into(),
                expected: "object",
            })
        }
    };

    Ok(Address {
        street: required_str(addr, "street", "address.street")?,
        street_name: optional_str(addr, "streetName", "address.streetName")?,
        building_number: optional_str(addr, "buildingNumber", "address.buildingNumber")?,
        city: required_str(addr, "city", "address.city")?,
        zipcode: optional_str(addr, "zipcode", "address.zipcode")?,
        country: required_str(addr, "country", "address.country")?,
        country_code: optional_str(addr, "country_code", "address.country_code")?,
    })
}

fn source_id(obj: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    match obj.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(_) => Err(ValidationError::WrongType {
            field: "id".into(),
            expected: "string or integer",
        }),
    }
}

/// A present, non-blank string with whitespace collapsed.
fn required_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, ValidationError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(path.into())),
        Some(Value::String(s)) => {
            let cleaned = collapse_whitespace(s);
            if cleaned.is_empty() {
                Err(ValidationError::MissingField(path.into()))
            } else {
                Ok(cleaned)
            }
        }
        Some(_) => Err(ValidationError::WrongType {
            field: path.into(),
            expected: "string",
        }),
    }
}

/// Blank strings count as absent; numbers are accepted and rendered as text.
fn optional_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<String>, ValidationError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(collapse_whitespace(s)).filter(|s| !s.is_empty())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(ValidationError::WrongType {
            field: path.into(),
            expected: "string",
        }),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-case the first letter and lower-case the rest. A first letter
/// without a single-character upper-case form is kept as-is.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut upper = first.to_uppercase();
    let head = match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => first,
    };
    let mut out = String::with_capacity(s.len());
    out.push(head);
    out.push_str(&chars.as_str().to_lowercase());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn sample() -> Value {
        json!({
            "id": 1,
            "firstname": "  john ",
            "lastname": "DOE",
            "email": " John.Doe@Example.COM ",
            "phone": "+1 (555) 010-2030",
            "birthday": "1990-01-01",
            "gender": "Male",
            "address": {
                "street": "123  Main St",
                "streetName": "Main St",
                "buildingNumber": "123",
                "city": "Anytown",
                "zipcode": "12345",
                "country": "USA",
                "country_code": "US",
                "latitude": 40.1,
                "longitude": -73.2
            },
            "website": "http://example.com",
            "image": "http://placeimg.com/640/480/people"
        })
    }

    #[test]
    fn cleans_a_valid_record() {
        let person = Validator::new(today()).validate(&sample()).unwrap();

        assert_eq!(person.source_id.as_deref(), Some("1"));
        assert_eq!(person.firstname, "John");
        assert_eq!(person.lastname, "Doe");
        assert_eq!(person.email, "john.doe@example.com");
        assert_eq!(person.phone.as_deref(), Some("15550102030"));
        assert_eq!(person.gender.as_deref(), Some("male"));
        assert_eq!(person.birthday, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        assert_eq!(person.address.street, "123 Main St");
        assert_eq!(person.address.city, "Anytown");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let validator = Validator::new(today());
        let once = validator.validate(&sample()).unwrap();
        let reserialized = serde_json::to_value(&once).unwrap();
        let twice = validator.validate(&reserialized).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_each_missing_required_field() {
        let validator = Validator::new(today());
        for field in crate::constants::REQUIRED_FIELDS {
            let mut raw = sample();
            raw.as_object_mut().unwrap().remove(field);
            assert_eq!(
                validator.validate(&raw),
                Err(ValidationError::MissingField(field.to_string())),
                "field {field}"
            );
        }
    }

    #[test]
    fn null_or_blank_counts_as_missing() {
        let validator = Validator::new(today());
        let mut raw = sample();
        raw["email"] = Value::Null;
        assert_eq!(validator.validate(&raw), Err(ValidationError::MissingField("email".into())));

        let mut raw = sample();
        raw["lastname"] = json!("   ");
        assert_eq!(validator.validate(&raw), Err(ValidationError::MissingField("lastname".into())));
    }

    #[test]
    fn rejects_missing_address_parts() {
        let mut raw = sample();
        raw["address"].as_object_mut().unwrap().remove("city");
        assert_eq!(
            Validator::new(today()).validate(&raw),
            Err(ValidationError::MissingField("address.city".into()))
        );
        assert!(!is_valid_address(&raw["address"]));
        assert!(is_valid_address(&sample()["address"]));
    }

    #[test]
    fn rejects_wrong_types() {
        let validator = Validator::new(today());
        let mut raw = sample();
        raw["firstname"] = json!(42);
        assert!(matches!(validator.validate(&raw), Err(ValidationError::WrongType { .. })));

        let mut raw = sample();
        raw["address"] = json!("123 Main St");
        assert!(matches!(validator.validate(&raw), Err(ValidationError::WrongType { .. })));

        assert!(matches!(validator.validate(&json!([1, 2])), Err(ValidationError::WrongType { .. })));
    }

    #[test]
    fn rejects_bad_email_and_dates() {
        let validator = Validator::new(today());
        let mut raw = sample();
        raw["email"] = json!("invalid-email");
        assert!(matches!(validator.validate(&raw), Err(ValidationError::InvalidFormat { .. })));

        let mut raw = sample();
        raw["birthday"] = json!("01/02/1990");
        assert!(matches!(validator.validate(&raw), Err(ValidationError::InvalidFormat { .. })));

        let mut raw = sample();
        raw["birthday"] = json!("2030-01-01");
        assert!(matches!(validator.validate(&raw), Err(ValidationError::OutOfRange { .. })));

        let mut raw = sample();
        raw["birthday"] = json!("1850-01-01");
        assert!(matches!(validator.validate(&raw), Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn email_and_date_helpers() {
        assert!(is_valid_email("test@example.com"));
        assert!(!is_valid_email("invalid-email"));
        assert!(!is_valid_email("a@b"));
        assert!(parse_date("2021-01-01").is_some());
        assert!(parse_date("invalid-date").is_none());
    }

    #[test]
    fn batch_counts_invalid_records() {
        let mut missing_email = sample();
        missing_email.as_object_mut().unwrap().remove("email");
        let outcome = Validator::new(today()).validate_batch(&[sample(), missing_email, sample()]);
        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.invalid.len(), 1);
        assert_eq!(outcome.invalid[0].0, 1);
    }

    #[test]
    fn capitalize_handles_mixed_case() {
        assert_eq!(capitalize("mARY ann"), "Mary ann");
        assert_eq!(capitalize("élodie"), "Élodie");
        assert_eq!(capitalize(&capitalize("ßig")), capitalize("ßig"));
    }
}
