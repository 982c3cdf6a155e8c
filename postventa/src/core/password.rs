//! Salted SHA-256 password hashes: `sha256$<salt-hex>$<digest-hex>`.
//!
//! Salt generation lives with the caller so hashing stays deterministic here.

use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
pub const SALT_LEN: usize = 16;

pub fn hash_with_salt(password: &str, salt: &[u8; SALT_LEN]) -> String {
    format!(
        "{SCHEME}${}${}",
        hex::encode(salt),
        hex::encode(digest(salt, password))
    )
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(salt_hex), Some(digest_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    constant_time_eq(&digest(&salt, password), &expected)
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; SALT_LEN] = [7; SALT_LEN];

    #[test]
    fn hash_has_three_dollar_separated_parts() {
        let hash = hash_with_salt("secreto", &SALT);
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sha256");
        assert_eq!(parts[1].len(), SALT_LEN * 2);
        assert_eq!(parts[2].len(), 64);
    }

    #[test]
    fn verify_accepts_only_the_original_password() {
        let hash = hash_with_salt("secreto", &SALT);
        assert!(verify("secreto", &hash));
        assert!(!verify("Secreto", &hash));
        assert!(!verify("", &hash));
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        let other = [9; SALT_LEN];
        assert_ne!(hash_with_salt("x", &SALT), hash_with_salt("x", &other));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        for stored in ["", "plain", "md5$00$00", "sha256$zz$00", "sha256$00$00$00"] {
            assert!(!verify("anything", stored), "{stored}");
        }
    }
}
