//! PKCE (Proof Key for Code Exchange) primitives.
//!
//! Provides the random material for OAuth 2.0 authorization code flows:
//! - Code verifier generation (43-128 chars from the RFC 7636 safe alphabet)
//! - S256 code challenge derivation using SHA-256
//! - Anti-CSRF state token generation

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Characters allowed in the PKCE verifier (RFC 7636 unreserved chars).
const VERIFIER_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Minimum verifier length per RFC 7636.
pub const MIN_VERIFIER_LENGTH: usize = 43;

/// Maximum verifier length per RFC 7636.
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Verifier length used when none is requested.
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// Length of generated state tokens.
const STATE_LENGTH: usize = 43;

/// Generate a random code verifier of the given length.
///
/// Characters are drawn from the 66-char unreserved alphabet by reducing
/// cryptographically random bytes modulo the alphabet size. 66 does not
/// divide 256, so the first few characters of the alphabet are very
/// slightly favored; at 43+ characters the verifier carries far more
/// entropy than the flow needs, and the bias is accepted.
///
/// Returns `invalid_length` if `length` is outside `[43, 128]`.
pub fn generate_verifier(length: usize) -> Result<String> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(Error::InvalidLength(length));
    }
    Ok(random_from_alphabet(length))
}

/// Compute the S256 code challenge for a verifier.
///
/// SHA-256 hash of the verifier bytes, base64url encoded without
/// padding. Deterministic: equal verifiers yield equal challenges.
#[must_use]
pub fn generate_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate an anti-CSRF state token.
///
/// 43 characters from the same alphabet as verifiers, so the token is
/// URL-safe without further encoding.
#[must_use]
pub fn generate_state() -> String {
    random_from_alphabet(STATE_LENGTH)
}

fn random_from_alphabet(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::rng().fill(&mut bytes[..]);
    bytes
        .iter()
        .map(|b| VERIFIER_CHARS[*b as usize % VERIFIER_CHARS.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~'
    }

    #[test]
    fn test_verifier_lengths() {
        for length in [MIN_VERIFIER_LENGTH, DEFAULT_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH] {
            let verifier = generate_verifier(length).unwrap();
            assert_eq!(verifier.len(), length);
        }
    }

    #[test]
    fn test_verifier_length_out_of_range() {
        for length in [0, 1, 42, 129, 1000] {
            let result = generate_verifier(length);
            assert!(matches!(result, Err(Error::InvalidLength(got)) if got == length));
        }
    }

    #[test]
    fn test_verifier_uses_safe_chars() {
        let verifier = generate_verifier(MAX_VERIFIER_LENGTH).unwrap();
        assert!(
            verifier.chars().all(is_safe_char),
            "Verifier contains invalid characters: {}",
            verifier
        );
    }

    #[test]
    fn test_challenge_matches_rfc_7636_vector() {
        // Appendix B of RFC 7636.
        let challenge = generate_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_challenge_deterministic() {
        let verifier = generate_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        assert_eq!(generate_challenge(&verifier), generate_challenge(&verifier));
    }

    #[test]
    fn test_challenge_url_safe() {
        let verifier = generate_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        let challenge = generate_challenge(&verifier);
        assert!(
            challenge
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "Challenge contains non-URL-safe characters: {}",
            challenge
        );
        assert!(!challenge.contains('='));
    }

    #[test]
    fn test_distinct_verifiers_distinct_challenges() {
        let first = generate_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        let second = generate_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        assert_ne!(first, second);
        assert_ne!(generate_challenge(&first), generate_challenge(&second));
    }

    #[test]
    fn test_state_shape() {
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert!(
            state.chars().all(is_safe_char),
            "State contains invalid characters: {}",
            state
        );
    }

    #[test]
    fn test_state_unique() {
        assert_ne!(generate_state(), generate_state());
    }
}
