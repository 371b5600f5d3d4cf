//! Secret generation.
//!
//! All secrets come from the operating system RNG.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Characters used for generated passwords.
///
/// Lowercase letters and digits only, so the values survive unquoted in
/// connection URLs, env files and YAML.
const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated database and cache passwords.
pub const PASSWORD_LEN: usize = 16;

/// Number of random bytes in a session secret (hex encoded, so twice as many characters).
pub const SESSION_SECRET_BYTES: usize = 32;

/// Generate a random password of `len` characters.
#[must_use]
pub fn generate_password(len: usize) -> String {
    (0..len)
        .map(|_| char::from(PASSWORD_CHARSET[OsRng.gen_range(0..PASSWORD_CHARSET.len())]))
        .collect()
}

/// Generate a hex-encoded session secret.
#[must_use]
pub fn generate_session_secret() -> String {
    let mut bytes = [0u8; SESSION_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_use_safe_charset() {
        let pass = generate_password(PASSWORD_LEN);
        assert_eq!(pass.len(), PASSWORD_LEN);
        assert!(pass
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn passwords_differ() {
        assert_ne!(generate_password(PASSWORD_LEN), generate_password(PASSWORD_LEN));
    }

    #[test]
    fn session_secret_is_hex() {
        let secret = generate_session_secret();
        assert_eq!(secret.len(), SESSION_SECRET_BYTES * 2);
        assert!(hex::decode(&secret).is_ok());
    }
}
