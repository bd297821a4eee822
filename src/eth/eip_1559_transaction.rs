// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! This module contains the logic for EIP-1559 transaction types.
//! Constants are taken from [FIP-0091](https://github.com/filecoin-project/FIPs/blob/020bcb412ee20a2879b4a710337959c51b938d3b/FIPS/fip-0091.md).

use anyhow::{bail, ensure};
use bytes::BytesMut;
use derive_builder::Builder;
use keccak_hash::keccak;
use num_bigint::{BigInt, Sign};
use rlp::RlpStream;

use super::{EthAddress, EthChainId, EthHash};
use crate::shim::crypto::{Signature, SignatureType};

pub const EIP_1559_SIG_LEN: usize = 65;

/// Typed transaction envelope marker for EIP-1559 transactions.
const EIP_1559_TX_TYPE: u8 = 0x02;

#[derive(PartialEq, Debug, Clone, Default, Builder)]
#[builder(setter(into))]
pub struct EthEip1559TxArgs {
    pub chain_id: EthChainId,
    pub nonce: u64,
    pub to: Option<EthAddress>,
    pub value: BigInt,
    pub max_fee_per_gas: BigInt,
    pub max_priority_fee_per_gas: BigInt,
    pub gas_limit: u64,
    pub input: Vec<u8>,
    #[builder(setter(skip))]
    pub v: BigInt,
    #[builder(setter(skip))]
    pub r: BigInt,
    #[builder(setter(skip))]
    pub s: BigInt,
}

impl EthEip1559TxArgs {
    pub fn with_signature(mut self, signature: &Signature) -> anyhow::Result<Self> {
        ensure!(
            signature.signature_type() == SignatureType::Delegated,
            "Signature is not delegated type"
        );

        ensure!(
            signature.bytes().len() == EIP_1559_SIG_LEN,
            "Invalid signature length for EIP1559 transaction: {}",
            signature.bytes().len()
        );

        self.r = BigInt::from_bytes_be(Sign::Plus, signature.bytes().get(..32).expect("infallible"));
        self.s = BigInt::from_bytes_be(
            Sign::Plus,
            signature.bytes().get(32..64).expect("infallible"),
        );
        self.v = BigInt::from_bytes_be(
            Sign::Plus,
            signature
                .bytes()
                .get(64..EIP_1559_SIG_LEN)
                .expect("infallible"),
        );

        Ok(self)
    }

    /// The keccak-256 digest of the signed RLP encoding, i.e. the transaction
    /// hash Ethereum tooling refers to this message by.
    pub fn hash(&self) -> anyhow::Result<EthHash> {
        Ok(EthHash(keccak(self.rlp_signed_message()?)))
    }

    /// RLP representation of the signed transaction, prefixed with the
    /// EIP-1559 type marker.
    pub fn rlp_signed_message(&self) -> anyhow::Result<Vec<u8>> {
        // An item is either an item list or bytes.
        const MSG_ITEMS: usize = 12;

        let mut stream = RlpStream::new_list(MSG_ITEMS);
        stream.append(&format_u64(self.chain_id));
        stream.append(&format_u64(self.nonce));
        stream.append(&format_bigint(&self.max_priority_fee_per_gas)?);
        stream.append(&format_bigint(&self.max_fee_per_gas)?);
        stream.append(&format_u64(self.gas_limit));
        stream.append(&format_address(&self.to));
        stream.append(&format_bigint(&self.value)?);
        stream.append(&self.input);
        let access_list: &[u8] = &[];
        stream.append_list(access_list);

        stream.append(&format_bigint(&self.v)?);
        stream.append(&format_bigint(&self.r)?);
        stream.append(&format_bigint(&self.s)?);

        let mut rlp = stream.out()[..].to_vec();
        let mut bytes: Vec<u8> = vec![EIP_1559_TX_TYPE];
        bytes.append(&mut rlp);
        Ok(bytes)
    }
}

fn format_u64(value: u64) -> BytesMut {
    if value != 0 {
        let i = (value.leading_zeros() / 8) as usize;
        let bytes = value.to_be_bytes();
        // `leading_zeros` for a positive `u64` returns a number in the range [0-63]
        // `i` is in the range [0-7], and `bytes` is an array of size 8
        // therefore, getting the slice from `i` to end should never fail
        bytes.get(i..).expect("failed to get slice").into()
    } else {
        // If all bytes are zero, return an empty slice
        BytesMut::new()
    }
}

fn format_bigint(value: &BigInt) -> anyhow::Result<BytesMut> {
    Ok(match value.sign() {
        Sign::Plus => BytesMut::from_iter(value.to_bytes_be().1.iter()),
        Sign::NoSign => BytesMut::new(),
        Sign::Minus => bail!("can't format a negative number"),
    })
}

fn format_address(value: &Option<EthAddress>) -> BytesMut {
    if let Some(addr) = value {
        addr.0.as_slice().into()
    } else {
        BytesMut::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_eip1559_tx_args() -> EthEip1559TxArgs {
        EthEip1559TxArgsBuilder::default()
            .chain_id(42u64)
            .nonce(1u64)
            .to(Some(EthAddress::default()))
            .value(BigInt::from(100))
            .max_fee_per_gas(BigInt::from(10))
            .max_priority_fee_per_gas(BigInt::from(1))
            .gas_limit(1000u64)
            .input(vec![1, 2, 3])
            .build()
            .unwrap()
    }

    #[test]
    fn valid_eip1559_tx_args_with_signature() {
        let args = create_eip1559_tx_args();
        let mut sig = vec![0u8; EIP_1559_SIG_LEN];
        sig[31] = 7; // r
        sig[63] = 9; // s
        sig[64] = 1; // v
        let args = args
            .with_signature(&Signature::new_delegated(sig))
            .unwrap();
        assert_eq!(args.r, BigInt::from(7));
        assert_eq!(args.s, BigInt::from(9));
        assert_eq!(args.v, BigInt::from(1));
    }

    #[test]
    fn invalid_eip1559_tx_args_not_delegated() {
        let args = create_eip1559_tx_args();
        let signature = Signature::new_secp256k1(vec![0u8; EIP_1559_SIG_LEN]);
        assert!(args.with_signature(&signature).is_err());
    }

    #[test]
    fn invalid_eip1559_tx_args_invalid_signature_len() {
        let args = create_eip1559_tx_args();
        let signature = Signature::new_delegated(vec![0u8; EIP_1559_SIG_LEN - 1]);
        assert!(args.with_signature(&signature).is_err());
    }

    #[test]
    fn hash_is_deterministic_and_input_sensitive() {
        let sig = Signature::new_delegated(vec![0u8; EIP_1559_SIG_LEN]);
        let a = create_eip1559_tx_args().with_signature(&sig).unwrap();
        let b = create_eip1559_tx_args().with_signature(&sig).unwrap();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());

        let mut c = create_eip1559_tx_args();
        c.nonce = 2;
        let c = c.with_signature(&sig).unwrap();
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
    }

    #[test]
    fn rlp_message_carries_type_prefix() {
        let sig = Signature::new_delegated(vec![0u8; EIP_1559_SIG_LEN]);
        let args = create_eip1559_tx_args().with_signature(&sig).unwrap();
        let rlp = args.rlp_signed_message().unwrap();
        assert_eq!(rlp.first(), Some(&EIP_1559_TX_TYPE));
    }
}
