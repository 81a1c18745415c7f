pub const REDACTED: &str = "[REDACTED]";

/// Headers whose values never reach the audit log.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "cookie",
    "x-auth-token",
    "x-access-token",
    "proxy-authorization",
];

pub fn is_sensitive_header(name: &str, master_key_header: Option<&str>) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
        || master_key_header
            .map(|candidate| name.eq_ignore_ascii_case(candidate))
            .unwrap_or(false)
}

/// Returns the header list with sensitive values replaced by `REDACTED`.
/// Matching is case-insensitive; names are preserved as sent.
pub fn redact_headers(
    headers: Vec<(String, String)>,
    master_key_header: Option<&str>,
) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|(name, value)| {
            if is_sensitive_header(&name, master_key_header) {
                (name, REDACTED.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_all_case_variants() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer sk-1".to_string()),
            ("AUTHORIZATION".to_string(), "Bearer sk-2".to_string()),
            ("x-ApI-kEy".to_string(), "sk-3".to_string()),
            ("Cookie".to_string(), "session=abc".to_string()),
            ("X-Auth-Token".to_string(), "t".to_string()),
            ("x-access-token".to_string(), "t".to_string()),
            ("Proxy-Authorization".to_string(), "basic xyz".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        let redacted = redact_headers(headers, None);
        for (name, value) in &redacted {
            if name.eq_ignore_ascii_case("content-type") {
                assert_eq!(value, "application/json");
            } else {
                assert_eq!(value, REDACTED, "header {name} must be redacted");
            }
        }
    }

    #[test]
    fn redacts_configured_master_key_header() {
        let headers = vec![("X-GoModel-Key".to_string(), "master".to_string())];
        let redacted = redact_headers(headers, Some("x-gomodel-key"));
        assert_eq!(redacted[0].1, REDACTED);
    }
}
