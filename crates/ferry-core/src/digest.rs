//! Content digests.
//!
//! A digest identifies content by hash: `sha256:<64 hex chars>`. Any change to
//! the referenced bytes yields a different digest, so digests are always
//! recomputed from bytes and never edited in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::error::{Error, Result};

/// Content-addressed identifier of a manifest, index, config or layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    /// The SHA-256 algorithm identifier.
    pub const SHA256: &'static str = "sha256";

    /// The SHA-512 algorithm identifier.
    pub const SHA512: &'static str = "sha512";

    /// Computes the SHA-256 digest of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferry_core::Digest;
    ///
    /// let digest = Digest::sha256(b"");
    /// assert_eq!(
    ///     digest.to_string(),
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    /// );
    /// ```
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        use sha2::Digest as _;
        Self {
            algorithm: Self::SHA256.to_string(),
            encoded: hex::encode(Sha256::digest(data)),
        }
    }

    /// Parses a digest string of the form `<algorithm>:<hex>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] if the string is malformed or the hex
    /// part has the wrong length for the algorithm.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDigest {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (algorithm, encoded) = value
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' separator"))?;

        if algorithm.is_empty() {
            return Err(invalid("empty algorithm"));
        }
        if encoded.is_empty()
            || !encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("encoded part must be lowercase hex"));
        }

        let expected_len = match algorithm {
            Self::SHA256 => Some(64),
            Self::SHA512 => Some(128),
            _ => None,
        };
        if let Some(len) = expected_len {
            if encoded.len() != len {
                return Err(invalid(&format!("{algorithm} digests have {len} hex chars")));
            }
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }

    /// Returns the algorithm part (e.g. `sha256`).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the hex-encoded hash, without the algorithm prefix.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Recomputes the digest of `data` with this digest's algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDigestAlgorithm`] for algorithms other than
    /// sha256 and sha512.
    pub fn compute_like(&self, data: &[u8]) -> Result<Self> {
        use sha2::Digest as _;
        match self.algorithm.as_str() {
            Self::SHA256 => Ok(Self::sha256(data)),
            Self::SHA512 => Ok(Self {
                algorithm: Self::SHA512.to_string(),
                encoded: hex::encode(Sha512::digest(data)),
            }),
            other => Err(Error::UnsupportedDigestAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }

    /// Returns true if `data` hashes to this digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDigestAlgorithm`] for unknown algorithms.
    pub fn verify(&self, data: &[u8]) -> Result<bool> {
        Ok(self.compute_like(data)? == *self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
