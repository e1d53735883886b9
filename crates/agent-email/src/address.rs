//! `local[+sub]@domain` parsing per RFC 5321 length bounds: local part up
//! to 64 octets, domain up to 255, the full address up to 254.

use crate::error::{Error, Result};

const MAX_LOCAL: usize = 64;
const MAX_DOMAIN: usize = 255;
const MAX_ADDRESS: usize = 254;

pub struct ParsedAddress {
    pub local: String,
    pub sub: Option<String>,
    #[allow(dead_code)]
    pub domain: String,
}

pub fn parse_address(address: &str) -> Result<ParsedAddress> {
    if address.is_empty() || address.len() > MAX_ADDRESS {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    let (local_full, domain) = address.split_once('@').ok_or_else(|| Error::InvalidAddress(address.to_string()))?;
    if local_full.is_empty() || local_full.len() > MAX_LOCAL || domain.is_empty() || domain.len() > MAX_DOMAIN {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    if domain.contains('@') {
        return Err(Error::InvalidAddress(address.to_string()));
    }

    let (local, sub) = match local_full.split_once('+') {
        Some((local, sub)) if !sub.is_empty() => (local.to_string(), Some(sub.to_string())),
        _ => (local_full.to_string(), None),
    };
    if local.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }

    Ok(ParsedAddress { local, sub, domain: domain.to_string() })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_address_resolves_local_as_agent_id() {
        let parsed = parse_address("alice@example.com").unwrap();
        assert_eq!(parsed.local, "alice");
        assert!(parsed.sub.is_none());
    }

    #[test]
    fn plus_addressing_splits_agent_name_and_id() {
        let parsed = parse_address("support+ticket-42@example.com").unwrap();
        assert_eq!(parsed.local, "support");
        assert_eq!(parsed.sub.as_deref(), Some("ticket-42"));
    }

    #[test]
    fn rejects_addresses_with_no_at_sign() {
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn rejects_a_local_part_over_64_octets() {
        let local = "a".repeat(65);
        let address = format!("{local}@example.com");
        assert!(parse_address(&address).is_err());
    }

    #[test]
    fn rejects_an_empty_plus_suffix() {
        let parsed = parse_address("alice+@example.com").unwrap();
        assert_eq!(parsed.local, "alice+");
        assert!(parsed.sub.is_none());
    }
}
