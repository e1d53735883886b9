//! HMAC-SHA256 signing/verification for the secure-reply resolver.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result, SecureReplyFailure};

pub const HEADER_AGENT_NAME: &str = "X-Agent-Name";
pub const HEADER_AGENT_ID: &str = "X-Agent-ID";
pub const HEADER_SIG: &str = "X-Agent-Sig";
pub const HEADER_SIG_TS: &str = "X-Agent-Sig-Ts";

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const FUTURE_SKEW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub agent_name: String,
    pub agent_id: String,
    pub signature: String,
    pub timestamp: String,
}

impl SignedHeaders {
    pub fn into_map(self) -> HashMap<String, String> {
        HashMap::from([
            (HEADER_AGENT_NAME.to_string(), self.agent_name),
            (HEADER_AGENT_ID.to_string(), self.agent_id),
            (HEADER_SIG.to_string(), self.signature),
            (HEADER_SIG_TS.to_string(), self.timestamp),
        ])
    }
}

fn payload(agent_name: &str, agent_id: &str, timestamp: &str) -> String {
    format!("{agent_name}:{agent_id}:{timestamp}")
}

fn hmac_hex(secret: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| Error::SigningRejected("HMAC key rejected"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect())
}

fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Produces the four `X-Agent-*` headers a reply flow attaches to outbound
/// mail so a later inbound reply can be attributed back to this agent.
pub fn sign_agent_headers(agent_name: &str, agent_id: &str, secret: &[u8]) -> Result<SignedHeaders> {
    if agent_name.is_empty() || agent_id.is_empty() {
        return Err(Error::SigningRejected("agentName and agentId must be non-empty"));
    }
    if agent_name.contains(':') || agent_id.contains(':') {
        return Err(Error::SigningRejected("agentName and agentId must not contain ':'"));
    }

    let timestamp = now_unix_secs().to_string();
    let signature = hmac_hex(secret, payload(agent_name, agent_id, &timestamp).as_bytes())?;
    Ok(SignedHeaders { agent_name: agent_name.to_string(), agent_id: agent_id.to_string(), signature, timestamp })
}

fn lookup<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

/// Verifies a secure-reply email's `X-Agent-*` headers against `secret`,
/// returning the `(agentName, agentId)` pair on success.
pub fn verify_agent_headers(headers: &HashMap<String, String>, secret: &[u8], max_age: Duration) -> Result<(String, String)> {
    let agent_name = lookup(headers, HEADER_AGENT_NAME);
    let agent_id = lookup(headers, HEADER_AGENT_ID);
    let signature = lookup(headers, HEADER_SIG);
    let timestamp_raw = lookup(headers, HEADER_SIG_TS);

    let (agent_name, agent_id, signature, timestamp_raw) = match (agent_name, agent_id, signature, timestamp_raw) {
        (Some(n), Some(i), Some(s), Some(t)) => (n, i, s, t),
        _ => return Err(Error::SecureReply(SecureReplyFailure::MissingHeaders)),
    };

    let timestamp: u64 = timestamp_raw.parse().map_err(|_| Error::SecureReply(SecureReplyFailure::MalformedTimestamp))?;

    let now = now_unix_secs();
    let age = now.saturating_sub(timestamp);
    if age > max_age.as_secs() {
        return Err(Error::SecureReply(SecureReplyFailure::Expired));
    }
    let future_skew = timestamp.saturating_sub(now);
    if future_skew > FUTURE_SKEW.as_secs() {
        return Err(Error::SecureReply(SecureReplyFailure::Expired));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| Error::SigningRejected("HMAC key rejected"))?;
    mac.update(payload(agent_name, agent_id, timestamp_raw).as_bytes());
    let expected = hex_decode(signature).ok_or(Error::SecureReply(SecureReplyFailure::Invalid))?;
    mac.verify_slice(&expected).map_err(|_| Error::SecureReply(SecureReplyFailure::Invalid))?;

    Ok((agent_name.to_string(), agent_id.to_string()))
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shared-secret";

    #[test]
    fn a_freshly_signed_header_set_verifies() {
        let signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        let map = signed.into_map();
        let (name, id) = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap();
        assert_eq!(name, "support");
        assert_eq!(id, "alice");
    }

    #[test]
    fn signing_rejects_a_colon_in_either_field() {
        assert!(sign_agent_headers("support:team", "alice", SECRET).is_err());
        assert!(sign_agent_headers("support", "ali:ce", SECRET).is_err());
    }

    #[test]
    fn signing_rejects_empty_fields() {
        assert!(sign_agent_headers("", "alice", SECRET).is_err());
    }

    #[test]
    fn verification_rejects_missing_headers() {
        let map = HashMap::new();
        let err = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::MissingHeaders)));
    }

    #[test]
    fn verification_rejects_a_malformed_timestamp() {
        let mut signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        signed.timestamp = "not-a-number".to_string();
        let map = signed.into_map();
        let err = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::MalformedTimestamp)));
    }

    #[test]
    fn verification_rejects_an_expired_timestamp() {
        let mut signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        signed.timestamp = "1".to_string();
        let map = signed.into_map();
        let err = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::Expired)));
    }

    #[test]
    fn verification_rejects_a_timestamp_too_far_in_the_future() {
        let mut signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        let future = now_unix_secs() + 3600;
        signed.timestamp = future.to_string();
        let map = signed.into_map();
        let err = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::Expired)));
    }

    #[test]
    fn verification_rejects_a_tampered_signature() {
        let mut signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        signed.signature = "00".repeat(32);
        let map = signed.into_map();
        let err = verify_agent_headers(&map, SECRET, DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::Invalid)));
    }

    #[test]
    fn verification_rejects_a_different_secret() {
        let signed = sign_agent_headers("support", "alice", SECRET).unwrap();
        let map = signed.into_map();
        let err = verify_agent_headers(&map, b"wrong-secret", DEFAULT_MAX_AGE).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::Invalid)));
    }
}
