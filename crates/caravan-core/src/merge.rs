//! Client merge resolution
//!
//! When two records describe the same person, one survives and absorbs the
//! other. The survivor is chosen deterministically so that merging in either
//! order produces the same record.

use crate::models::Client;

/// Pick which of two clients survives a merge. The earlier `created_at` wins,
/// with the lexicographically smaller id as tie-breaker, so the choice does
/// not depend on argument order.
#[must_use]
pub fn choose_survivor<'a>(a: &'a Client, b: &'a Client) -> (&'a Client, &'a Client) {
    if (a.created_at, a.id.as_str()) <= (b.created_at, b.id.as_str()) {
        (a, b)
    } else {
        (b, a)
    }
}

/// The more complete of two names: non-empty beats empty, more tokens beats
/// fewer, longer beats shorter, and the survivor's name wins a full tie.
#[must_use]
pub fn preferred_name(survivor: &str, duplicate: &str) -> String {
    if survivor.trim().is_empty() {
        return duplicate.to_string();
    }
    if duplicate.trim().is_empty() {
        return survivor.to_string();
    }

    let survivor_tokens = survivor.split_whitespace().count();
    let duplicate_tokens = duplicate.split_whitespace().count();
    if duplicate_tokens > survivor_tokens {
        return duplicate.to_string();
    }
    if survivor_tokens > duplicate_tokens {
        return survivor.to_string();
    }
    if duplicate.len() > survivor.len() {
        duplicate.to_string()
    } else {
        survivor.to_string()
    }
}

/// Fold the duplicate's fields into a copy of the survivor. The survivor's
/// contact fields win when present; the earlier date of birth wins when both
/// are set.
#[must_use]
pub fn merged_fields(survivor: &Client, duplicate: &Client) -> Client {
    let mut merged = survivor.clone();
    merged.name = preferred_name(&survivor.name, &duplicate.name);

    if merged.email.is_none() {
        merged.email.clone_from(&duplicate.email);
    }
    if merged.phone.is_none() {
        merged.phone.clone_from(&duplicate.phone);
        merged
            .normalized_phone
            .clone_from(&duplicate.normalized_phone);
    }
    if let Some(duplicate_dob) = duplicate.dob {
        if merged.dob.is_none_or(|survivor_dob| duplicate_dob < survivor_dob) {
            merged.dob = Some(duplicate_dob);
        }
    }

    merged.updated_at = chrono::Utc::now().timestamp_millis();
    merged
}
