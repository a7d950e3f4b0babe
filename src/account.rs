//! Accounts and their signing keys.
//!
//! Keys are produced by an external generator and handed to localnet through
//! the environment file; this module only parses them and derives addresses.

use crate::error::{Error, Result};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy_primitives::{keccak256, Address};

/// Length of a secp256k1 private key in bytes.
const PRIVATE_KEY_LEN: usize = 32;

/// What an account is used for in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Genesis administrator.
    Admin,
    /// Block-producing validator; one node per validator account.
    Validator,
    /// Validator group owner.
    ValidatorGroup,
    /// Funded account used to generate load.
    Developer,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Admin => "admin",
            Self::Validator => "validator",
            Self::ValidatorGroup => "validator_group",
            Self::Developer => "developer",
        };
        f.write_str(s)
    }
}

/// Parse a hex-encoded secp256k1 private key, with or without `0x`.
///
/// # Errors
///
/// Returns `Error::Crypto` if the string is not 32 bytes of hex or is not a
/// valid scalar.
pub fn parse_private_key(hex_str: &str) -> Result<SigningKey> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes =
        hex::decode(hex_str).map_err(|e| Error::Crypto(format!("Invalid private key hex: {e}")))?;
    if bytes.len() != PRIVATE_KEY_LEN {
        return Err(Error::Crypto(format!(
            "Invalid private key length: expected {PRIVATE_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|e| Error::Crypto(format!("Invalid private key: {e}")))
}

/// An account with its signing key. Immutable once built.
#[derive(Clone)]
pub struct Account {
    address: Address,
    key: SigningKey,
    role: AccountRole,
}

impl Account {
    /// Build an account from its key, deriving the address.
    #[must_use]
    pub fn new(key: SigningKey, role: AccountRole) -> Self {
        Self {
            address: Address::from_private_key(&key),
            key,
            role,
        }
    }

    /// Build an account from a hex private key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if the key cannot be parsed.
    pub fn from_hex(private_key: &str, role: AccountRole) -> Result<Self> {
        Ok(Self::new(parse_private_key(private_key)?, role))
    }

    /// The account address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The account's signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Hex encoding of the private key, without `0x`.
    #[must_use]
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// The account's role.
    #[must_use]
    pub fn role(&self) -> AccountRole {
        self.role
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
