use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent_common::AgentKey;

use crate::address::parse_address;
use crate::error::{Error, Result, SecureReplyFailure};
use crate::sign::{self, DEFAULT_MAX_AGE};

/// The minimal shape a resolver needs from an inbound message: the address
/// it was delivered to, and its headers.
pub struct InboundEmail {
    pub to: String,
    pub headers: HashMap<String, String>,
}

pub trait EmailResolver: Send + Sync {
    fn resolve(&self, email: &InboundEmail) -> Result<AgentKey>;
}

/// `local[+sub]@domain`: with `+sub`, `agentName=local, agentId=sub`;
/// without, `agentName=defaultNamespace, agentId=local`.
pub struct AddressBasedResolver {
    pub default_namespace: String,
}

impl EmailResolver for AddressBasedResolver {
    fn resolve(&self, email: &InboundEmail) -> Result<AgentKey> {
        let parsed = parse_address(&email.to)?;
        match parsed.sub {
            Some(sub) => Ok(AgentKey::new(parsed.local, sub)),
            None => Ok(AgentKey::new(self.default_namespace.clone(), parsed.local)),
        }
    }
}

/// Routes every message to the same fixed agent instance.
pub struct CatchAllResolver {
    pub agent_name: String,
    pub agent_id: String,
}

impl EmailResolver for CatchAllResolver {
    fn resolve(&self, _email: &InboundEmail) -> Result<AgentKey> {
        Ok(AgentKey::new(self.agent_name.clone(), self.agent_id.clone()))
    }
}

/// Verifies the `X-Agent-*` headers a prior outbound reply attached, so a
/// later inbound reply can be attributed back to its originating agent
/// without trusting the headers on their own.
pub struct SecureReplyResolver {
    secret: Vec<u8>,
    max_age: Duration,
    on_failure: Option<Arc<dyn Fn(SecureReplyFailure) + Send + Sync>>,
}

impl SecureReplyResolver {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into(), max_age: DEFAULT_MAX_AGE, on_failure: None }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_on_failure(mut self, callback: impl Fn(SecureReplyFailure) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

impl EmailResolver for SecureReplyResolver {
    fn resolve(&self, email: &InboundEmail) -> Result<AgentKey> {
        match sign::verify_agent_headers(&email.headers, &self.secret, self.max_age) {
            Ok((agent_name, agent_id)) => Ok(AgentKey::new(agent_name, agent_id)),
            Err(Error::SecureReply(reason)) => {
                if let Some(callback) = &self.on_failure {
                    callback(reason);
                }
                Err(Error::SecureReply(reason))
            }
            Err(other) => Err(other),
        }
    }
}

/// Permanently removed: headers alone were never a trustworthy identity
/// source. Construction always fails with migration guidance; kept so the
/// removal is discoverable at the call site instead of a silent deletion.
pub struct LegacyHeaderTrustResolver {
    _private: (),
}

impl LegacyHeaderTrustResolver {
    pub fn new() -> Result<Self> {
        Err(Error::LegacyResolverRemoved)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn email(to: &str) -> InboundEmail {
        InboundEmail { to: to.to_string(), headers: HashMap::new() }
    }

    #[test]
    fn address_based_resolver_splits_plus_addressing() {
        let resolver = AddressBasedResolver { default_namespace: "inbox".to_string() };
        let key = resolver.resolve(&email("support+alice@example.com")).unwrap();
        assert_eq!(key.namespace, "support");
        assert_eq!(key.name, "alice");
    }

    #[test]
    fn address_based_resolver_uses_default_namespace_without_plus_addressing() {
        let resolver = AddressBasedResolver { default_namespace: "inbox".to_string() };
        let key = resolver.resolve(&email("alice@example.com")).unwrap();
        assert_eq!(key.namespace, "inbox");
        assert_eq!(key.name, "alice");
    }

    #[test]
    fn catch_all_resolver_ignores_the_message() {
        let resolver = CatchAllResolver { agent_name: "support".to_string(), agent_id: "default".to_string() };
        let key = resolver.resolve(&email("anything@example.com")).unwrap();
        assert_eq!(key.namespace, "support");
        assert_eq!(key.name, "default");
    }

    #[test]
    fn secure_reply_resolver_reports_failure_reasons_via_callback() {
        let reasons: Arc<Mutex<Vec<SecureReplyFailure>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = reasons.clone();
        let resolver = SecureReplyResolver::new(b"secret".to_vec()).with_on_failure(move |reason| captured.lock().unwrap().push(reason));

        let err = resolver.resolve(&email("anything@example.com")).unwrap_err();
        assert!(matches!(err, Error::SecureReply(SecureReplyFailure::MissingHeaders)));
        assert_eq!(reasons.lock().unwrap().as_slice(), [SecureReplyFailure::MissingHeaders]);
    }

    #[test]
    fn secure_reply_resolver_accepts_a_validly_signed_reply() {
        let signed = sign::sign_agent_headers("support", "alice", b"secret").unwrap();
        let resolver = SecureReplyResolver::new(b"secret".to_vec());
        let key = resolver.resolve(&InboundEmail { to: "whatever@example.com".to_string(), headers: signed.into_map() }).unwrap();
        assert_eq!(key.namespace, "support");
        assert_eq!(key.name, "alice");
    }

    #[test]
    fn the_legacy_resolver_cannot_be_constructed() {
        assert!(matches!(LegacyHeaderTrustResolver::new(), Err(Error::LegacyResolverRemoved)));
    }
}
