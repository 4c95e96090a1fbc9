use crate::types::{AnonymizedPerson, CleanPerson};
use std::collections::HashSet;

/// Split `records` into first occurrences and repeats. Two persons are
/// duplicates when every cleaned field except the source id matches.
pub fn split_duplicates(records: Vec<CleanPerson>) -> (Vec<CleanPerson>, Vec<CleanPerson>) {
    let mut seen = HashSet::with_capacity(records.len());
    let mut unique = Vec::with_capacity(records.len());
    let mut duplicates = Vec::new();

    for person in records {
        let fingerprint = CleanPerson {
            source_id: None,
            ..person.clone()
        };
        if seen.insert(fingerprint) {
            unique.push(person);
        } else {
            duplicates.push(person);
        }
    }

    (unique, duplicates)
}

/// Keep the first record per `person_key`. Records that agree on the
/// identity fields but differ elsewhere (address, phone) map to one stored
/// row; the later ones are returned as collapsed.
pub fn split_same_key(records: Vec<AnonymizedPerson>) -> (Vec<AnonymizedPerson>, Vec<AnonymizedPerson>) {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .partition(|person| seen.insert(person.person_key.clone()))
}
