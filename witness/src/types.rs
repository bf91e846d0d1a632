//! Block, header and proof types as they travel between the remote node, the
//! pipeline stages and the stored artifacts.

use ethereum_types::{Address, Bloom, H256, H64, U256};
use keccak_hash::keccak;
use rlp::RlpStream;
use rlp_derive::{RlpDecodable, RlpEncodable};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use zk_pig_common::{quantity, Bytes, EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

/// An execution-layer block header.
///
/// Optional fields follow fork activation order; a field is only ever set if
/// all the fields before it are.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: H256,
    #[serde(rename = "sha3Uncles")]
    pub ommers_hash: H256,
    #[serde(rename = "miner")]
    pub beneficiary: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    #[serde(with = "quantity")]
    pub number: u64,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(with = "quantity")]
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub mix_hash: H256,
    pub nonce: H64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<H256>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "quantity::opt"
    )]
    pub blob_gas_used: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "quantity::opt"
    )]
    pub excess_blob_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_hash: Option<H256>,
}

impl Header {
    /// `keccak(rlp(header))`.
    pub fn hash(&self) -> H256 {
        keccak(rlp::encode(self))
    }
}

impl rlp::Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        let optional = [
            self.base_fee_per_gas.is_some(),
            self.withdrawals_root.is_some(),
            self.blob_gas_used.is_some(),
            self.excess_blob_gas.is_some(),
            self.parent_beacon_block_root.is_some(),
            self.requests_hash.is_some(),
        ];
        s.begin_list(15 + optional.iter().filter(|set| **set).count());
        s.append(&self.parent_hash);
        s.append(&self.ommers_hash);
        s.append(&self.beneficiary);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data.0);
        s.append(&self.mix_hash);
        s.append(&self.nonce);
        if let Some(base_fee) = &self.base_fee_per_gas {
            s.append(base_fee);
        }
        if let Some(root) = &self.withdrawals_root {
            s.append(root);
        }
        if let Some(gas) = &self.blob_gas_used {
            s.append(gas);
        }
        if let Some(gas) = &self.excess_blob_gas {
            s.append(gas);
        }
        if let Some(root) = &self.parent_beacon_block_root {
            s.append(root);
        }
        if let Some(hash) = &self.requests_hash {
            s.append(hash);
        }
    }
}

/// A validator withdrawal, credited at the end of the block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[serde(with = "quantity")]
    pub index: u64,
    #[serde(with = "quantity")]
    pub validator_index: u64,
    pub address: Address,
    /// In gwei.
    #[serde(with = "quantity")]
    pub amount: u64,
}

/// A block as consumed by the executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: Header,
    /// EIP-2718 encoded transactions.
    pub transactions: Vec<Bytes>,
    pub uncles: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn hash(&self) -> H256 {
        self.header.hash()
    }
}

/// The value stored in the account trie.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_HASH,
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

impl Account {
    pub fn has_storage(&self) -> bool {
        self.storage_root != EMPTY_TRIE_HASH
    }

    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

/// An `eth_getProof` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProof {
    pub address: Address,
    /// Nodes from the state root down to the account leaf (or to the point
    /// where the key diverges).
    pub account_proof: Vec<Bytes>,
    pub balance: U256,
    pub code_hash: H256,
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub storage_hash: H256,
    #[serde(default)]
    pub storage_proof: Vec<StorageProof>,
}

impl AccountProof {
    /// Whether the claimed fields agree with the account actually found at
    /// the end of the proof.
    ///
    /// Nodes report absent accounts with zero balance and nonce and either a
    /// zero or an empty-value hash for code and storage.
    pub fn claims(&self, found: Option<&Account>) -> bool {
        match found {
            Some(account) => {
                account.nonce == self.nonce
                    && account.balance == self.balance
                    && account.storage_root == self.storage_hash
                    && account.code_hash == self.code_hash
            }
            None => {
                self.nonce == 0
                    && self.balance.is_zero()
                    && (self.code_hash.is_zero() || self.code_hash == EMPTY_CODE_HASH)
                    && (self.storage_hash.is_zero() || self.storage_hash == EMPTY_TRIE_HASH)
            }
        }
    }

    /// Storage root to verify storage proofs against.
    pub fn storage_root(&self) -> H256 {
        match self.storage_hash.is_zero() {
            true => EMPTY_TRIE_HASH,
            false => self.storage_hash,
        }
    }
}

/// One storage slot of an `eth_getProof` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    #[serde(deserialize_with = "padded_h256")]
    pub key: H256,
    pub value: U256,
    pub proof: Vec<Bytes>,
}

/// Nodes echo storage keys back as they were requested, which is not always
/// 32 bytes.
fn padded_h256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<H256, D::Error> {
    let bytes = zk_pig_common::hex_bytes::deserialize(deserializer)?;
    if bytes.len() > 32 {
        return Err(D::Error::custom(format!(
            "storage key is {} bytes long",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(H256(key))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn genesis() -> Header {
        Header {
            parent_hash: H256::zero(),
            ommers_hash: H256(hex!(
                "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
            )),
            beneficiary: Address::zero(),
            state_root: H256(hex!(
                "d7f8974fb5ac78d9ac099b9ad5018bedc2ce0a72dad1827a1709da30580f0544"
            )),
            transactions_root: EMPTY_TRIE_HASH,
            receipts_root: EMPTY_TRIE_HASH,
            logs_bloom: Bloom::zero(),
            difficulty: U256::from(0x4_0000_0000u64),
            number: 0,
            gas_limit: 5000,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes(
                hex!("11bbe8db4e347b4e8c937c1c8370e4b5ed33adb3db69cbdb7a38e1e50b1b82fa").to_vec(),
            ),
            mix_hash: H256::zero(),
            nonce: H64(hex!("0000000000000042")),
            base_fee_per_gas: None,
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
            requests_hash: None,
        }
    }

    #[test]
    fn mainnet_genesis_hash() {
        assert_eq!(
            genesis().hash(),
            H256(hex!(
                "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
            ))
        );
    }

    #[test]
    fn header_json_uses_rpc_names() {
        let json = serde_json::to_value(genesis()).unwrap();
        assert_eq!(json["miner"], "0x0000000000000000000000000000000000000000");
        assert_eq!(json["gasLimit"], "0x1388");
        assert_eq!(json["nonce"], "0x0000000000000042");
        assert!(json.get("baseFeePerGas").is_none());

        let back: Header = serde_json::from_value(json).unwrap();
        assert_eq!(back, genesis());
    }

    #[test]
    fn storage_keys_are_left_padded() {
        let proof: StorageProof =
            serde_json::from_str(r#"{"key":"0x01","value":"0x2a","proof":[]}"#).unwrap();
        assert_eq!(proof.key, H256::from_low_u64_be(1));
        assert_eq!(proof.value, U256::from(42));
    }

    #[test]
    fn absent_account_claims() {
        let proof = AccountProof {
            address: Address::repeat_byte(1),
            account_proof: vec![],
            balance: U256::zero(),
            code_hash: H256::zero(),
            nonce: 0,
            storage_hash: H256::zero(),
            storage_proof: vec![],
        };
        assert!(proof.claims(None));
        assert!(!proof.claims(Some(&Account::default())));
        assert_eq!(proof.storage_root(), EMPTY_TRIE_HASH);
    }

    #[test]
    fn account_rlp_round_trip() {
        let account = Account {
            nonce: 7,
            balance: U256::from(10).pow(18.into()),
            ..Default::default()
        };
        let decoded: Account = rlp::decode(&rlp::encode(&account)).unwrap();
        assert_eq!(decoded, account);
    }
}
