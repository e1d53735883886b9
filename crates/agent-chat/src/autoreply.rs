//! Auto-reply detection for email-driven chats: flag incoming messages
//! whose headers mark them as automated so the agent can avoid replying
//! to a reply.

use std::collections::HashMap;

/// Table-driven classifier. Headers are matched case-sensitively on value
/// exactly as named in the component design; lookups are case-insensitive
/// on the header name itself (as real mail headers are).
pub fn is_auto_reply(headers: &HashMap<String, String>) -> bool {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if let Some(value) = get("Auto-Submitted") {
        if value == "auto-replied" || value == "auto-generated" {
            return true;
        }
    }

    if get("X-Auto-Response-Suppress").is_some() {
        return true;
    }

    if let Some(value) = get("Precedence") {
        if value.eq_ignore_ascii_case("bulk") || value.eq_ignore_ascii_case("junk") || value.eq_ignore_ascii_case("list") {
            return true;
        }
    }

    false
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn auto_submitted_replied_is_flagged() {
        assert!(is_auto_reply(&headers(&[("Auto-Submitted", "auto-replied")])));
    }

    #[test]
    fn auto_submitted_generated_is_flagged() {
        assert!(is_auto_reply(&headers(&[("Auto-Submitted", "auto-generated")])));
    }

    #[test]
    fn auto_submitted_no_is_not_flagged() {
        assert!(!is_auto_reply(&headers(&[("Auto-Submitted", "no")])));
    }

    #[test]
    fn any_auto_response_suppress_value_is_flagged() {
        assert!(is_auto_reply(&headers(&[("X-Auto-Response-Suppress", "All")])));
    }

    #[test]
    fn precedence_bulk_junk_list_are_flagged() {
        for value in ["bulk", "junk", "list"] {
            assert!(is_auto_reply(&headers(&[("Precedence", value)])));
        }
    }

    #[test]
    fn precedence_normal_is_not_flagged() {
        assert!(!is_auto_reply(&headers(&[("Precedence", "normal")])));
    }

    #[test]
    fn no_relevant_headers_is_not_flagged() {
        assert!(!is_auto_reply(&headers(&[("Subject", "hi")])));
    }
}
