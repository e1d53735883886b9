//! RFC 7636 PKCE challenge/verifier generation for the authorization code
//! flow, plus the opaque single-use `state` parameter.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

fn random_url_safe_token(byte_len: usize) -> String {
    let mut bytes = Vec::with_capacity(byte_len);
    while bytes.len() < byte_len {
        bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    }
    bytes.truncate(byte_len);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn generate_pkce() -> PkceChallenge {
    let verifier = random_url_safe_token(32);
    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(digest);
    PkceChallenge { verifier, challenge }
}

/// Single-use opaque `state`; the callback handler must reject replay.
pub fn generate_state() -> String {
    random_url_safe_token(24)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_the_sha256_of_the_verifier() {
        let pkce = generate_pkce();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn states_are_not_reused() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
    }
}
