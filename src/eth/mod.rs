// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Conversion of delegated-signature Filecoin messages into their
//! Ethereum-compatible transaction form, as defined in
//! [FIP-0091](https://github.com/filecoin-project/FIPs/blob/020bcb412ee20a2879b4a710337959c51b938d3b/FIPS/fip-0091.md).

mod eip_1559_transaction;

pub use eip_1559_transaction::{EIP_1559_SIG_LEN, EthEip1559TxArgs, EthEip1559TxArgsBuilder};

use anyhow::{bail, ensure};
use cbor4ii::core::{Value, dec::Decode as _, utils::SliceReader};
use keccak_hash::H256;
use std::fmt;
use std::str::FromStr;

use crate::message::SignedMessage;
use crate::shim::{
    address::{Address, ETHEREUM_ACCOUNT_MANAGER_ACTOR, ETHEREUM_ADDRESS_MANAGER_ACTOR_ID, Payload},
    crypto::SignatureType,
    message::Message,
};

pub type EthChainId = u64;

/// Chain id of the Filecoin mainnet EVM runtime.
pub const MAINNET_ETH_CHAIN_ID: EthChainId = 314;

// As per `ref-fvm`, which hardcodes it as well.
#[repr(u64)]
enum EAMMethod {
    CreateExternal = 4,
}

#[repr(u64)]
enum EVMMethod {
    // As per `ref-fvm`:
    // it is very unfortunate but the hasher creates a circular dependency, so we use the raw
    // number.
    // InvokeContract = frc42_dispatch::method_hash!("InvokeEVM"),
    InvokeContract = 3844450837,
}

/// A 32-byte Ethereum transaction or block hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct EthHash(pub H256);

impl From<H256> for EthHash {
    fn from(value: H256) -> Self {
        Self(value)
    }
}

impl fmt::Display for EthHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for EthHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.trim_start_matches("0x");
        let bytes = hex::decode(hex_str)?;
        ensure!(bytes.len() == 32, "invalid hash length: {}", bytes.len());
        Ok(EthHash(H256::from_slice(&bytes)))
    }
}

/// A 20-byte Ethereum account or contract address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct EthAddress(pub [u8; 20]);

impl EthAddress {
    /// Converts a Filecoin address into its Ethereum form: `f4` addresses in
    /// the EAM namespace map directly, `f0` id-addresses get the id-masked
    /// form (`0xff` prefix followed by the big-endian actor id).
    pub fn from_filecoin_address(addr: &Address) -> anyhow::Result<Self> {
        match addr.payload() {
            Payload::ID(id) => {
                let mut bytes = [0u8; 20];
                bytes[0] = 0xff;
                bytes[12..].copy_from_slice(&id.to_be_bytes());
                Ok(EthAddress(bytes))
            }
            Payload::Delegated(delegated)
                if delegated.namespace() == ETHEREUM_ADDRESS_MANAGER_ACTOR_ID
                    && delegated.subaddress().len() == 20 =>
            {
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(delegated.subaddress());
                Ok(EthAddress(bytes))
            }
            _ => bail!("invalid address {addr} for an Ethereum conversion"),
        }
    }
}

/// Ethereum transaction which can be of different types.
/// Only the EIP-1559 form is currently supported for hash derivation; legacy
/// homestead and EIP-155 signatures are rejected.
pub enum EthTx {
    Eip1559(Box<EthEip1559TxArgs>),
}

impl EthTx {
    /// Creates an Ethereum transaction from a signed Filecoin message.
    /// The transaction type is determined based on the signature, as defined in FIP-0091.
    pub fn from_signed_message(
        eth_chain_id: EthChainId,
        msg: &SignedMessage,
    ) -> anyhow::Result<Self> {
        Self::ensure_signed_message_valid(msg)?;
        let (params, to) = get_eth_params_and_recipient(msg.message())?;

        let sig_len = msg.signature().bytes().len();
        if sig_len != EIP_1559_SIG_LEN {
            bail!("unsupported signature length: {sig_len}");
        }

        let args = EthEip1559TxArgsBuilder::default()
            .chain_id(eth_chain_id)
            .nonce(msg.message().sequence)
            .to(to)
            .value(msg.message().value.atto().clone())
            .max_fee_per_gas(msg.message().gas_fee_cap.atto().clone())
            .max_priority_fee_per_gas(msg.message().gas_premium.atto().clone())
            .gas_limit(msg.message().gas_limit)
            .input(params)
            .build()?
            .with_signature(msg.signature())?;
        Ok(EthTx::Eip1559(Box::new(args)))
    }

    /// The Ethereum transaction hash under which this transaction is indexed.
    pub fn eth_hash(&self) -> anyhow::Result<EthHash> {
        match self {
            EthTx::Eip1559(args) => args.hash(),
        }
    }

    /// Validates that the signed Filecoin message is a valid Ethereum transaction.
    /// Note: only basic checks are done. The signature and payload are not verified.
    fn ensure_signed_message_valid(msg: &SignedMessage) -> anyhow::Result<()> {
        ensure!(
            msg.signature().signature_type() == SignatureType::Delegated,
            "Signature is not delegated type"
        );

        ensure!(
            msg.message().version == 0,
            "unsupported msg version: {}",
            msg.message().version
        );

        EthAddress::from_filecoin_address(&msg.message().from)?;

        Ok(())
    }
}

/// Extracts the Ethereum transaction parameters and recipient from a Filecoin message.
fn get_eth_params_and_recipient(msg: &Message) -> anyhow::Result<(Vec<u8>, Option<EthAddress>)> {
    let mut to = None;
    let mut params = vec![];

    ensure!(msg.version == 0, "unsupported msg version: {}", msg.version);

    if !msg.params.bytes().is_empty() {
        let mut reader = SliceReader::new(msg.params.bytes());
        match Value::decode(&mut reader) {
            Ok(Value::Bytes(bytes)) => params = bytes,
            _ => bail!("failed to read params byte array"),
        }
    }

    if msg.to == ETHEREUM_ACCOUNT_MANAGER_ACTOR {
        if msg.method_num != EAMMethod::CreateExternal as u64 {
            bail!("unsupported EAM method");
        }
    } else if msg.method_num == EVMMethod::InvokeContract as u64 {
        let addr = EthAddress::from_filecoin_address(&msg.to)?;
        to = Some(addr);
    } else {
        bail!(
            "invalid methodnum {}: only allowed method is InvokeContract({})",
            msg.method_num,
            EVMMethod::InvokeContract as u64
        );
    }

    Ok((params, to))
}
