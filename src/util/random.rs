use base64::Engine;
use rand::RngCore;

use crate::core::types::{AccessToken, AuthCode, RefreshToken};

use super::hash::Salt;

/// Bytes of entropy behind every code and token we hand out.
const TOKEN_BYTES: usize = 32;

pub trait FromRandom {
    fn from_random() -> Self;
}

impl FromRandom for AuthCode {
    fn from_random() -> Self {
        AuthCode(random_string(TOKEN_BYTES))
    }
}

impl FromRandom for AccessToken {
    fn from_random() -> Self {
        AccessToken(random_string(TOKEN_BYTES))
    }
}

impl FromRandom for RefreshToken {
    fn from_random() -> Self {
        RefreshToken(random_string(TOKEN_BYTES))
    }
}

impl FromRandom for Salt {
    fn from_random() -> Self {
        Salt(random_string(16))
    }
}

fn random_string(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let a = AccessToken::from_random();
        let b = AccessToken::from_random();

        assert_ne!(a, b);
        // 32 bytes -> 43 unpadded base64 characters
        assert_eq!(a.0.len(), 43);
        assert!(a
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
