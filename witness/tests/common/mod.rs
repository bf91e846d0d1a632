use std::{collections::BTreeMap, sync::Arc};

use ethereum_types::{Address, H256, U256};
use witness::{
    db::MemoryDb,
    evm::{AccountInfo, AccountUpdate, PostState},
    nodeset::NodeSet,
    state::{StateDatabase as _, TrieState},
    AccountProof,
};
use zk_pig_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn slot(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn account(balance: u64, storage: impl IntoIterator<Item = (u64, u64)>) -> AccountUpdate {
    AccountUpdate {
        info: Some(AccountInfo {
            nonce: 1,
            balance: balance.into(),
            code_hash: EMPTY_CODE_HASH,
        }),
        destructed: false,
        storage: storage
            .into_iter()
            .map(|(k, v)| (slot(k), U256::from(v)))
            .collect(),
    }
}

/// `accounts` accounts, account `i` holding slots `1..=i % 9`.
pub fn world(accounts: u64) -> TrieState {
    let mut state = TrieState::open(Arc::default(), EMPTY_TRIE_HASH).unwrap();
    let mut post = PostState::default();
    for i in 1..=accounts {
        post.accounts
            .insert(address(i), account(i * 10, (1..=i % 9).map(|s| (s, s * i))));
    }
    state.commit(&post).unwrap();
    state
}

/// What `eth_getProof` would answer for every address and its slots.
pub fn proofs(state: &mut TrieState, keys: &BTreeMap<Address, Vec<H256>>) -> Vec<AccountProof> {
    keys.iter()
        .map(|(address, slots)| state.prove(*address, slots).unwrap())
        .collect()
}

/// The slots each update writes.
pub fn written(post: &PostState) -> BTreeMap<Address, Vec<H256>> {
    post.accounts
        .iter()
        .map(|(address, update)| (*address, update.storage.keys().copied().collect()))
        .collect()
}

pub fn open(set: &NodeSet, root: H256) -> TrieState {
    let mut db = MemoryDb::default();
    db.insert_node_set(set);
    TrieState::open(Arc::new(db), root).unwrap()
}
