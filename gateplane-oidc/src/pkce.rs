//! PKCE verifier/challenge generation (RFC 7636, S256).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::error::{LoginError, Result};

/// Number of random bytes behind a verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes behind the `state` parameter.
const STATE_BYTES: usize = 16;

/// Challenge method sent alongside the challenge.
pub const CHALLENGE_METHOD: &str = "S256";

/// Verifier and challenge for a single login attempt.
#[derive(Clone)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Generate a pair from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut entropy = [0u8; VERIFIER_BYTES];
        fill_random(&mut entropy)?;
        Ok(Self::from_entropy(entropy))
    }

    /// Build a pair from fixed entropy. Deterministic; meant for tests.
    pub fn from_entropy(entropy: [u8; VERIFIER_BYTES]) -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(entropy);
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// The secret verifier, sent only to the token endpoint.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The derived challenge, sent in the authorization URL.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Whether `verifier` hashes to this pair's challenge.
    pub fn matches(&self, verifier: &str) -> bool {
        compute_challenge(verifier) == self.challenge
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Compute the S256 challenge for a verifier.
pub fn compute_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random `state` value for CSRF protection.
pub fn generate_state() -> Result<String> {
    let mut bytes = [0u8; STATE_BYTES];
    fill_random(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf).map_err(LoginError::RandomSource)
}
