//! Duplicate client detection
//!
//! New client records are scored against existing ones before they are
//! created. An exact email match is a certain duplicate; otherwise the score
//! comes from fuzzy name similarity, which must be corroborated by a matching
//! phone tail or date of birth unless it is high on its own.

use serde::Serialize;

use crate::models::{Client, ClientDraft};
use crate::phone::phone_tail;

/// Minimum score at which a candidate is reported
pub const SCORE_THRESHOLD: f64 = 0.85;

/// Name similarity required when a matching phone tail corroborates
const PHONE_NAME_GATE: f64 = 0.85;

/// Name similarity required on its own, or with a matching date of birth
const NAME_ONLY_GATE: f64 = 0.90;

/// Ceiling for scores not backed by an exact email match
const NON_EMAIL_CAP: f64 = 0.99;

/// An existing client that looks like a duplicate of an incoming draft
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidate {
    pub client: Client,
    /// Match confidence in [0, 1]; 1.0 only for exact email matches
    pub score: f64,
}

/// Canonical form for email comparison: lowercased, with dots stripped from
/// the local part of Gmail addresses (Gmail ignores them)
#[must_use]
pub fn normalized_email(email: &str) -> String {
    let lowered = email.trim().to_lowercase();
    match lowered.rsplit_once('@') {
        Some((local, domain)) if domain == "gmail.com" || domain == "googlemail.com" => {
            format!("{}@{domain}", local.replace('.', ""))
        }
        _ => lowered,
    }
}

/// Token-order-independent name similarity in [0, 1]. Empty names never match.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let sorted_a = sort_tokens(a);
    let sorted_b = sort_tokens(b);
    if sorted_a.is_empty() || sorted_b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&sorted_a, &sorted_b)
}

fn sort_tokens(name: &str) -> String {
    let mut tokens: Vec<String> = name
        .to_lowercase()
        .split_whitespace()
        .map(ToString::to_string)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Score all existing clients against a draft and return those that clear the
/// reporting threshold, best match first
#[must_use]
pub fn find_duplicates(existing: &[Client], draft: &ClientDraft) -> Vec<DuplicateCandidate> {
    let mut candidates: Vec<DuplicateCandidate> = existing
        .iter()
        .filter_map(|client| {
            let score = score_pair(draft, client);
            (score >= SCORE_THRESHOLD).then(|| DuplicateCandidate {
                client: client.clone(),
                score,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.client.id.as_str().cmp(&b.client.id.as_str()))
    });
    candidates
}

fn score_pair(draft: &ClientDraft, existing: &Client) -> f64 {
    if let (Some(draft_email), Some(existing_email)) =
        (draft.email.as_deref(), existing.email.as_deref())
    {
        if !draft_email.trim().is_empty()
            && normalized_email(draft_email) == normalized_email(existing_email)
        {
            return 1.0;
        }
    }

    let name_sim = name_similarity(&draft.name, &existing.name);
    let mut score: f64 = 0.0;

    let tails_match = match (
        draft.phone.as_deref().and_then(phone_tail),
        existing.normalized_phone.as_deref().and_then(phone_tail),
    ) {
        (Some(draft_tail), Some(existing_tail)) => draft_tail == existing_tail,
        _ => false,
    };
    if tails_match && name_sim >= PHONE_NAME_GATE {
        score = score.max(name_sim);
    }

    if name_sim >= NAME_ONLY_GATE {
        score = score.max(name_sim);
    }

    let dob_match = matches!((draft.dob, existing.dob), (Some(a), Some(b)) if a == b);
    if dob_match && name_sim >= NAME_ONLY_GATE {
        score = score.max(name_sim);
    }

    score.min(NON_EMAIL_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn existing(name: &str, email: Option<&str>, phone: Option<&str>) -> Client {
        Client::from_draft(&ClientDraft {
            name: name.to_string(),
            email: email.map(ToString::to_string),
            phone: phone.map(ToString::to_string),
            dob: None,
        })
    }

    fn draft(name: &str, email: Option<&str>, phone: Option<&str>) -> ClientDraft {
        ClientDraft {
            name: name.to_string(),
            email: email.map(ToString::to_string),
            phone: phone.map(ToString::to_string),
            dob: None,
        }
    }

    #[test]
    fn test_normalized_email_case_folds() {
        assert_eq!(normalized_email("Jane.Doe@Corp.COM"), "jane.doe@corp.com");
    }

    #[test]
    fn test_normalized_email_strips_gmail_dots() {
        assert_eq!(normalized_email("Jane.Doe@GMail.com"), "janedoe@gmail.com");
        assert_eq!(
            normalized_email("j.a.n.e@googlemail.com"),
            "jane@googlemail.com"
        );
        // Dots are significant everywhere else
        assert_eq!(normalized_email("jane.doe@corp.com"), "jane.doe@corp.com");
    }

    #[test]
    fn test_name_similarity_ignores_token_order() {
        let forward = name_similarity("Alice Smith", "Smith Alice");
        assert!((forward - 1.0).abs() < f64::EPSILON);
        assert!((name_similarity("", "Alice") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exact_email_is_certain_match() {
        let clients = vec![existing(
            "Completely Different",
            Some("jane.doe@gmail.com"),
            None,
        )];
        let incoming = draft("Jane Doe", Some("JaneDoe@gmail.com"), None);

        let found = find_duplicates(&clients, &incoming);
        assert_eq!(found.len(), 1);
        assert!((found[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_matching_phone_tail_rescues_borderline_name() {
        let clients = vec![existing(
            "Alexandra Smith",
            Some("alexandra@example.com"),
            Some("+1-555-123-4567"),
        )];

        // Similarity ~0.87: below the name-only gate, above the phone gate
        let with_phone = draft("Alexandre Smyth", None, Some("5551234567"));
        let found = find_duplicates(&clients, &with_phone);
        assert_eq!(found.len(), 1);
        assert!(found[0].score >= SCORE_THRESHOLD);
        assert!(found[0].score < 0.90);

        let without_phone = draft("Alexandre Smyth", None, None);
        assert!(find_duplicates(&clients, &without_phone).is_empty());
    }

    #[test]
    fn test_same_phone_different_person_is_not_flagged() {
        let clients = vec![existing("Alice Smith", None, Some("+1-555-123-4567"))];
        let incoming = draft("Bob Jones", None, Some("555-123-4567"));
        assert!(find_duplicates(&clients, &incoming).is_empty());
    }

    #[test]
    fn test_different_emails_same_phone_tail() {
        // Two records for the same person entered with different emails and
        // differently formatted phone numbers
        let clients = vec![existing(
            "Alice Smith",
            Some("alice@example.com"),
            Some("+1-555-123-4567"),
        )];
        let incoming = draft("Alyce Smith", Some("alyce@example.com"), Some("5551234567"));

        let found = find_duplicates(&clients, &incoming);
        assert_eq!(found.len(), 1);
        assert!(found[0].score >= SCORE_THRESHOLD);
        assert!(found[0].score < 1.0, "only email matches score 1.0");
    }

    #[test]
    fn test_identical_name_alone_is_capped_below_one() {
        let clients = vec![existing("Alice Smith", None, None)];
        let incoming = draft("Alice Smith", None, None);

        let found = find_duplicates(&clients, &incoming);
        assert_eq!(found.len(), 1);
        assert!((found[0].score - 0.99).abs() < f64::EPSILON);
    }

    #[test]
    fn test_matching_dob_with_close_name() {
        let dob = NaiveDate::from_ymd_opt(1988, 7, 14);
        let mut client = existing("Alice Smith", None, None);
        client.dob = dob;
        let clients = vec![client];

        let incoming = ClientDraft {
            name: "Alice Smyth".to_string(),
            dob,
            ..ClientDraft::default()
        };
        let found = find_duplicates(&clients, &incoming);
        assert_eq!(found.len(), 1);
        assert!(found[0].score >= 0.90);
    }

    #[test]
    fn test_candidates_sorted_best_first() {
        let clients = vec![
            existing("Alice Smith", None, None),
            existing("Alice Smith", Some("alice@example.com"), None),
        ];
        let incoming = draft("Alice Smith", Some("alice@example.com"), None);

        let found = find_duplicates(&clients, &incoming);
        assert_eq!(found.len(), 2);
        assert!((found[0].score - 1.0).abs() < f64::EPSILON);
        assert!(found[1].score < found[0].score);
    }

    #[test]
    fn test_unrelated_clients_are_not_flagged() {
        let clients = vec![existing("Bob Jones", Some("bob@example.com"), None)];
        let incoming = draft("Alice Smith", Some("alice@example.com"), None);
        assert!(find_duplicates(&clients, &incoming).is_empty());
    }
}
