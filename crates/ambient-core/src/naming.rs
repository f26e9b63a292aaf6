//! Deterministic object names and name validation.
//!
//! Every object the system creates on behalf of a session or a permission
//! grant has a name derivable from its inputs, so re-running an operation
//! finds the object it created last time instead of creating a second one.

use sha2::{Digest, Sha256};

use crate::errors::ValidationError;

/// Maximum length of a DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;

/// Appended to messages cut at their bound.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Prefix of generated session names.
pub const SESSION_NAME_PREFIX: &str = "agentic-session";

/// Execution unit of a session. The job name becomes a pod label value, so
/// it is held to [`MAX_NAME_LEN`].
pub fn job_name(session: &str) -> String {
    shorten(&format!("{session}-job"))
}

/// Service account, role and role binding of a session's runner.
pub fn runner_identity_name(session: &str) -> String {
    shorten(&format!("ambient-session-{session}"))
}

/// Secret holding the runner token of a session.
pub fn runner_token_secret_name(session: &str) -> String {
    shorten(&format!("ambient-runner-token-{session}"))
}

/// Cluster role backing a project role.
pub fn project_cluster_role(role: &str) -> String {
    format!("ambient-project-{role}")
}

/// Role binding for a permission grant.
pub fn permission_binding_name(role: &str, subject_type: &str, subject: &str) -> String {
    shorten(&format!(
        "ambient-permission-{role}-{subject_type}-{}",
        sanitize_name(subject)
    ))
}

/// Service account backing an access key.
pub fn access_key_account_name(key_name: &str, unix_secs: i64) -> String {
    let base = sanitize_name(key_name);
    let suffix = format!("-{unix_secs}");
    let budget = MAX_NAME_LEN - "ambient-key-".len() - suffix.len();
    let base: String = base.chars().take(budget).collect();
    format!("ambient-key-{}{suffix}", base.trim_end_matches('-'))
}

/// Role binding granting an access key its role.
pub fn access_key_binding_name(account: &str) -> String {
    shorten(&format!("{account}-binding"))
}

/// Generated session name for creation requests without one.
pub fn generated_session_name(unix_millis: i64) -> String {
    format!("{SESSION_NAME_PREFIX}-{unix_millis}")
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs and
/// trim dashes at both ends.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        let _ = out.pop();
    }
    if out.is_empty() {
        out.push('x');
    }
    out
}

/// Fit `name` in [`MAX_NAME_LEN`], replacing the tail with a short sha256
/// digest of the full name when it is too long.
pub fn shorten(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest.iter().take(5).map(|b| format!("{b:02x}")).collect();
    let keep = MAX_NAME_LEN - hash.len() - 1;
    let head: String = name.chars().take(keep).collect();
    format!("{}-{hash}", head.trim_end_matches('-'))
}

/// Check `name` is a DNS-1123 label.
pub fn validate_resource_name(name: &str) -> Result<(), ValidationError> {
    let fail = |reason: &str| {
        Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return fail("must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return fail("must be at most 63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return fail("may contain only lowercase letters, digits and '-'");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return fail("must start and end with an alphanumeric character");
    }
    Ok(())
}

/// Cut `message` to `limit` characters, appending [`TRUNCATION_MARKER`].
pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let head: String = message.chars().take(limit).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

/// Keep the last `limit` characters of `log`, prefixed with
/// [`TRUNCATION_MARKER`] when anything was dropped.
pub fn tail_excerpt(log: &str, limit: usize) -> String {
    let total = log.chars().count();
    if total <= limit {
        return log.to_string();
    }
    let tail: String = log.chars().skip(total - limit).collect();
    format!("{TRUNCATION_MARKER}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn session_derived_names() {
        assert_eq!(job_name("s1"), "s1-job");
        assert_eq!(runner_identity_name("s1"), "ambient-session-s1");
        assert_eq!(runner_token_secret_name("s1"), "ambient-runner-token-s1");
    }

    #[test]
    fn job_name_of_longest_session_is_a_label() {
        let session = format!("s{}", "a".repeat(MAX_NAME_LEN - 1));
        assert!(validate_resource_name(&session).is_ok());
        let job = job_name(&session);
        assert!(validate_resource_name(&job).is_ok(), "{job}");
        assert_eq!(job, job_name(&session));
        assert_ne!(job, job_name(&format!("b{}", "a".repeat(MAX_NAME_LEN - 1))));
    }

    #[test]
    fn permission_binding_for_group() {
        assert_eq!(
            permission_binding_name("edit", "group", "team-x"),
            "ambient-permission-edit-group-team-x"
        );
        assert_eq!(project_cluster_role("edit"), "ambient-project-edit");
    }

    #[test]
    fn permission_binding_sanitizes_subject() {
        assert_eq!(
            permission_binding_name("view", "user", "Alice@Example.com"),
            "ambient-permission-view-user-alice-example-com"
        );
    }

    #[test]
    fn long_names_are_shortened_deterministically() {
        let subject = "a".repeat(100);
        let a = permission_binding_name("admin", "user", &subject);
        let b = permission_binding_name("admin", "user", &subject);
        assert_eq!(a, b);
        assert!(a.len() <= MAX_NAME_LEN);
        assert!(validate_resource_name(&a).is_ok());
    }

    #[test]
    fn distinct_long_names_stay_distinct() {
        let a = permission_binding_name("admin", "user", &format!("{}1", "a".repeat(80)));
        let b = permission_binding_name("admin", "user", &format!("{}2", "a".repeat(80)));
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_name("--Hello__World!!"), "hello-world");
        assert_eq!(sanitize_name("@@@"), "x");
    }

    #[test]
    fn access_key_account_fits() {
        let name = access_key_account_name(&"CI Key ".repeat(20), 1_700_000_000);
        assert!(name.starts_with("ambient-key-ci-key-"));
        assert!(name.ends_with("-1700000000"));
        assert!(validate_resource_name(&name).is_ok());
    }

    #[test]
    fn generated_session_name_format() {
        assert_eq!(
            generated_session_name(1_700_000_000_123),
            "agentic-session-1700000000123"
        );
    }

    #[test]
    fn validate_accepts_dns_labels() {
        assert!(validate_resource_name("my-session-1").is_ok());
    }

    #[test]
    fn validate_rejects_bad_names() {
        for bad in ["", "Upper", "has_underscore", "-lead", "trail-", &"a".repeat(64)] {
            assert_matches!(
                validate_resource_name(bad),
                Err(ValidationError::InvalidName { .. }),
                "{bad}"
            );
        }
    }

    #[test]
    fn truncate_bounds_message() {
        let long = "x".repeat(900);
        let out = truncate_message(&long, 500);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), 500 + TRUNCATION_MARKER.len());
        assert_eq!(truncate_message("short", 500), "short");
    }

    #[test]
    fn tail_excerpt_keeps_end() {
        let log = format!("{}END", "a".repeat(1000));
        let out = tail_excerpt(&log, 500);
        assert!(out.starts_with(TRUNCATION_MARKER));
        assert!(out.ends_with("END"));
        assert_eq!(out.chars().count(), 500 + TRUNCATION_MARKER.len());
        assert_eq!(tail_excerpt("tiny", 500), "tiny");
    }

    proptest! {
        #[test]
        fn sanitized_and_shortened_is_a_label(raw in ".{0,200}") {
            let name = shorten(&sanitize_name(&raw));
            prop_assert!(validate_resource_name(&name).is_ok(), "{name}");
        }

        #[test]
        fn truncation_never_exceeds_bound(msg in ".{0,300}", limit in 1usize..200) {
            let out = truncate_message(&msg, limit);
            prop_assert!(out.chars().count() <= limit + TRUNCATION_MARKER.len());
        }
    }
}
