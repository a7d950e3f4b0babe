//! Celo legacy transactions: encoding and EIP-155 signing.
//!
//! Field order (RLP list):
//! `nonce, gas_price, gas, fee_currency, gateway_fee_recipient, gateway_fee,
//! to, value, data` followed by `chain_id, 0, 0` when hashing for signing or
//! `v, r, s` once signed.

use crate::account::{keccak256, Address};
use crate::error::{Error, Result};
use alloy_primitives::{B256, U256};
use alloy_rlp::{BufMut, Encodable, Header};
use alloy_sol_types::SolCall;
use k256::ecdsa::SigningKey;

mod abi {
    alloy_sol_types::sol! {
        function transferWithComment(address to, uint256 value, string comment) external returns (bool);
    }
}

/// Selector of the stable token's `transferWithComment(address,uint256,string)`.
pub const TRANSFER_WITH_COMMENT_SELECTOR: [u8; 4] = abi::transferWithCommentCall::SELECTOR;

/// ABI-encoded call data for `transferWithComment(to, amount, comment)`.
#[must_use]
pub fn transfer_calldata(to: Address, amount: u128, comment: &str) -> Vec<u8> {
    abi::transferWithCommentCall {
        to,
        value: U256::from(amount),
        comment: comment.to_owned(),
    }
    .abi_encode()
}

/// An unsigned Celo legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeloLegacyTx {
    /// Sender nonce.
    pub nonce: u64,
    /// Gas price, denominated in the fee currency.
    pub gas_price: u128,
    /// Gas limit.
    pub gas: u64,
    /// Token paying the fee; `None` pays in the native currency.
    pub fee_currency: Option<Address>,
    /// Gateway fee recipient, unused by load traffic.
    pub gateway_fee_recipient: Option<Address>,
    /// Gateway fee.
    pub gateway_fee: u128,
    /// Call target.
    pub to: Address,
    /// Native value.
    pub value: u128,
    /// Call data.
    pub data: Vec<u8>,
}

/// A signed, encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedTx {
    /// RLP encoding.
    pub raw: Vec<u8>,
    /// Keccak-256 of `raw`.
    pub hash: B256,
}

fn encode_optional_address(addr: Option<&Address>, out: &mut dyn BufMut) {
    match addr {
        Some(a) => a.as_slice().encode(out),
        None => [0u8; 0][..].encode(out),
    }
}

/// Big-endian integer bytes with leading zeros removed, as RLP expects.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

impl CeloLegacyTx {
    fn encode_body(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas.encode(out);
        encode_optional_address(self.fee_currency.as_ref(), out);
        encode_optional_address(self.gateway_fee_recipient.as_ref(), out);
        self.gateway_fee.encode(out);
        self.to.as_slice().encode(out);
        self.value.encode(out);
        self.data[..].encode(out);
    }

    fn wrap_list(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 9);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(payload);
        out
    }

    /// Hash signed under EIP-155 replay protection.
    #[must_use]
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        let mut payload = Vec::new();
        self.encode_body(&mut payload);
        chain_id.encode(&mut payload);
        0u8.encode(&mut payload);
        0u8.encode(&mut payload);
        keccak256(&Self::wrap_list(&payload))
    }

    /// Sign with `key` for `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if signing fails.
    pub fn sign(&self, key: &SigningKey, chain_id: u64) -> Result<SignedTx> {
        let hash = self.signing_hash(chain_id);
        let (sig, recid) = key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| Error::Crypto(format!("Failed to sign transaction: {e}")))?;

        let v = u64::from(recid.to_byte()) + chain_id * 2 + 35;
        let r: [u8; 32] = sig.r().to_bytes().into();
        let s: [u8; 32] = sig.s().to_bytes().into();

        let mut payload = Vec::new();
        self.encode_body(&mut payload);
        v.encode(&mut payload);
        trim_leading_zeros(&r).encode(&mut payload);
        trim_leading_zeros(&s).encode(&mut payload);

        let raw = Self::wrap_list(&payload);
        let hash = keccak256(&raw);
        Ok(SignedTx { raw, hash })
    }
}
