/// Group-secret authentication.
///
/// A joining peer proves knowledge of the group secret by sending its
/// SHA-256 digest; the host compares digests as exact strings. Secrets are
/// low-entropy group passwords, not cryptographic keys, so no timing-safe
/// comparison is attempted.
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 digest of a group secret.
pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compare an offered digest against the expected one.
pub fn verify(candidate: &str, expected: &str) -> bool {
    candidate == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("hunter2"), digest("hunter2"));
        assert_ne!(digest("hunter2"), digest("hunter3"));
    }

    #[test]
    fn digest_matches_sha256_vector() {
        assert_eq!(
            digest("abcd"),
            "88d4266fd4e6338d13b845fcf289579d209c897823b9217da3e161936f031589"
        );
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_is_exact_equality() {
        let d = digest("abcd");
        assert!(verify(&d, &d));
        assert!(!verify(&d.to_uppercase(), &d));
        assert!(!verify("", &d));
    }
}
