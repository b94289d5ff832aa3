use std::str::FromStr;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::core::types::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum Transformation {
    #[default]
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl Transformation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl FromStr for Transformation {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct Challenge {
    #[serde(rename = "code_challenge")]
    pub code: String,
    #[serde(rename = "code_challenge_method")]
    #[serde(default)]
    pub method: Transformation,
}

#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
pub struct Verifier {
    #[serde(rename = "code_verifier")]
    pub value: String,
}

impl Challenge {
    /// Checks a verifier presented at the token endpoint against this challenge.
    pub fn verify(&self, verifier: &Verifier) -> bool {
        use subtle::ConstantTimeEq;

        let computed = match self.method {
            Transformation::Plain => verifier.value.clone(),
            Transformation::S256 => {
                let digest = Sha256::digest(verifier.value.as_bytes());
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
            }
        };

        computed.as_bytes().ct_eq(self.code.as_bytes()).into()
    }
}
