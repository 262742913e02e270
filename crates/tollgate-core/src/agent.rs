//! Registered worker agents and capability matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::task::Task;

/// A registered worker that pulls tasks to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub is_healthy: bool,
    /// Human-readable printout of the last health check.
    pub health_details: String,
    pub health_check_timestamp: Option<DateTime<Utc>>,
    /// Salted hash of the auth token, never the token itself.
    #[serde(skip_serializing)]
    pub auth_token_hash: String,
}

impl Agent {
    /// Whether this agent offers every capability the task requires.
    ///
    /// Tasks without requirements are never assignable.
    pub fn capable_of_performing(&self, task: &Task) -> bool {
        capable_of_performing(&self.capabilities, &task.required_capabilities)
    }
}

/// True iff `required` is non-empty and a subset of `offered`.
pub fn capable_of_performing(offered: &[String], required: &[String]) -> bool {
    !required.is_empty() && required.iter().all(|needed| offered.contains(needed))
}

/// A freshly issued agent token and the hash to persist for it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Returned to the operator once and then forgotten.
    pub token: String,
    pub hash: String,
}

/// Generate a new random auth token.
pub fn issue_token() -> IssuedToken {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let salt = Uuid::new_v4().simple().to_string();
    let hash = hash_token(&salt, &token);
    IssuedToken { token, hash }
}

/// Check a presented token against a stored `salt$digest` hash.
pub fn verify_token(stored_hash: &str, token: &str) -> bool {
    match stored_hash.split_once('$') {
        Some((salt, _)) => secrets_match(&hash_token(salt, token), stored_hash),
        None => false,
    }
}

/// Compare two secrets in time independent of where they first differ.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    format!("{salt}${}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn caps(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_required_subset_of_offered() {
        assert!(capable_of_performing(
            &caps(&["has-android-device", "linux"]),
            &caps(&["has-android-device"])
        ));
        assert!(capable_of_performing(&caps(&["a", "b"]), &caps(&["b", "a"])));
    }

    #[test]
    fn test_missing_capability_rejected() {
        assert!(!capable_of_performing(
            &caps(&["has-android-device"]),
            &caps(&["has-android-device", "has-ios-device"])
        ));
        assert!(!capable_of_performing(&[], &caps(&["linux"])));
    }

    #[test]
    fn test_empty_requirements_never_assignable() {
        assert!(!capable_of_performing(&caps(&["linux", "mac"]), &[]));
        assert!(!capable_of_performing(&[], &[]));
    }

    #[test]
    fn test_token_verification() {
        let issued = issue_token();
        assert!(verify_token(&issued.hash, &issued.token));
        assert!(!verify_token(&issued.hash, "not-the-token"));
        assert!(!issued.hash.contains(&issued.token));
    }

    #[test]
    fn test_refreshed_token_invalidates_previous() {
        let first = issue_token();
        let second = issue_token();
        assert!(!verify_token(&second.hash, &first.token));
    }

    #[rstest]
    #[case("s3cret", "s3cret", true)]
    #[case("s3cret", "s3creT", false)]
    #[case("s3cret", "s3cret-longer", false)]
    #[case("", "s3cret", false)]
    fn test_secrets_match(#[case] presented: &str, #[case] expected: &str, #[case] matches: bool) {
        assert_eq!(secrets_match(presented, expected), matches);
    }

    #[test]
    fn test_malformed_hash_rejects_everything() {
        assert!(!verify_token("no-separator", "anything"));
    }
}
