//! # Identity Module
//!
//! Every participant in the custody layer (administrators, vaults, token
//! contracts, payment recipients) is addressed by an [`Identity`], an
//! opaque 20-byte account reference. Identities are comparable and
//! hashable, and cannot be forged: contract identities are derived by the
//! host at creation time from the creator and its creation nonce.
//!
//! The all-zero identity, [`Identity::NULL`], means "unset". It is never a
//! valid destination, token contract, call target, or administrator, and
//! every operation that accepts an identity checks for it up front.
//!
//! ```text
//! external account:  BLAKE3("custody/account" || label)[..20]
//! contract account:  BLAKE3("custody/contract" || creator || nonce_be)[..20]
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identity length in bytes.
pub const IDENTITY_LENGTH: usize = 20;

const ACCOUNT_DOMAIN: &[u8] = b"custody/account";
const CONTRACT_DOMAIN: &[u8] = b"custody/contract";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an identity from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The string is not valid hexadecimal.
    #[error("invalid hex in identity: {0}")]
    InvalidHex(String),

    /// The decoded bytes have the wrong length.
    #[error("invalid identity length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An account reference. Displayed as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identity([u8; IDENTITY_LENGTH]);

impl Identity {
    /// The null identity. Represents "unset".
    pub const NULL: Identity = Identity([0u8; IDENTITY_LENGTH]);

    /// Wraps raw identity bytes.
    pub const fn from_bytes(bytes: [u8; IDENTITY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives a deterministic external-account identity from a label.
    ///
    /// Used for administrators and recipients in tests and scenarios, where
    /// "alice" should always map to the same account.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ACCOUNT_DOMAIN);
        hasher.update(label.as_bytes());
        Self::truncate(hasher.finalize().as_bytes())
    }

    /// Derives the identity of the contract created by `creator` at
    /// creation nonce `nonce`.
    pub fn derive_contract(creator: Identity, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTRACT_DOMAIN);
        hasher.update(&creator.0);
        hasher.update(&nonce.to_be_bytes());
        Self::truncate(hasher.finalize().as_bytes())
    }

    /// Returns `true` for the null identity.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Raw bytes of this identity.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LENGTH] {
        &self.0
    }

    /// `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    fn truncate(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; IDENTITY_LENGTH];
        bytes.copy_from_slice(&digest[..IDENTITY_LENGTH]);
        Self(bytes)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        let array: [u8; IDENTITY_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::InvalidLength {
                    expected: IDENTITY_LENGTH,
                    got: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
