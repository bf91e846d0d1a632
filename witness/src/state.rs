//! Reading and updating world state backed by partial tries.

use std::{collections::BTreeMap, sync::Arc};

use ethereum_types::{Address, H256, U256};
use mpt_trie::{
    partial_trie::{HashedPartialTrie, Node, PartialTrie as _},
    trie_ops::TrieOpError,
};
use zk_pig_common::{Bytes, EMPTY_TRIE_HASH};

use crate::{
    db::MemoryDb,
    evm::PostState,
    node::NodeError,
    nodeset::ACCOUNT_TRIE_OWNER,
    trie::{self, account_key, storage_key, TrieError},
    types::{Account, AccountProof, Header, StorageProof},
};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("node {hash:x} of trie {owner:x} is missing")]
    MissingTrieNode { owner: H256, hash: H256 },
    #[error("missing code {0:x}")]
    MissingCode(H256),
    #[error("missing header {0:x}")]
    MissingHeader(H256),
    #[error("missing block for state root {0:x}")]
    MissingBlockForStateRoot(H256),
    #[error("invalid node in trie {owner:x}")]
    Node {
        owner: H256,
        #[source]
        source: NodeError,
    },
    #[error("cannot update trie {owner:x}")]
    Trie {
        owner: H256,
        #[source]
        source: TrieOpError,
    },
    #[error("undecodable value in trie {owner:x}")]
    Value {
        owner: H256,
        #[source]
        source: rlp::DecoderError,
    },
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl StateError {
    fn trie(owner: H256, e: TrieError) -> Self {
        match e {
            TrieError::MissingNode(hash) => Self::MissingTrieNode { owner, hash },
            TrieError::Node(source) => Self::Node { owner, source },
            TrieError::Op(source) => Self::Trie { owner, source },
        }
    }
}

/// The state reads an executor needs, plus turning its writes into a root.
pub trait StateDatabase {
    /// `None` for accounts that do not exist.
    fn account(&mut self, address: Address) -> Result<Option<Account>, StateError>;

    /// Zero for unset slots and missing accounts.
    fn storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError>;

    fn code(&mut self, code_hash: H256) -> Result<Vec<u8>, StateError>;

    /// Header of an ancestor, for `BLOCKHASH` and the parent checks.
    fn header(&mut self, hash: H256) -> Result<Header, StateError>;

    /// Applies the writes of a block and returns the resulting state root.
    /// Reads made afterwards see the new state.
    fn commit(&mut self, post: &PostState) -> Result<H256, StateError>;
}

/// World state over tries opened from a [`MemoryDb`].
///
/// Storage tries are opened on first use. Reaching a node the database does
/// not have is an error, never an empty read.
#[derive(Clone, Debug)]
pub struct TrieState {
    db: Arc<MemoryDb>,
    accounts: HashedPartialTrie,
    storage: BTreeMap<Address, HashedPartialTrie>,
}

impl TrieState {
    pub fn open(db: Arc<MemoryDb>, root: H256) -> Result<Self, StateError> {
        let accounts = db.open_trie(root).map_err(|source| StateError::Node {
            owner: ACCOUNT_TRIE_OWNER,
            source,
        })?;
        Ok(Self {
            db,
            accounts,
            storage: BTreeMap::new(),
        })
    }

    /// A state that knows nothing: every read finds nothing and commits start
    /// from empty tries. Its roots are meaningless.
    pub fn placeholder() -> Self {
        Self {
            db: Arc::default(),
            accounts: HashedPartialTrie::new(Node::Empty),
            storage: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> H256 {
        self.accounts.hash()
    }

    fn read_account(&self, address: Address) -> Result<Option<Account>, StateError> {
        trie::get(&self.accounts, account_key(address))
            .map_err(|e| StateError::trie(ACCOUNT_TRIE_OWNER, e))?
            .map(|bytes| rlp::decode(&bytes))
            .transpose()
            .map_err(|source| StateError::Value {
                owner: ACCOUNT_TRIE_OWNER,
                source,
            })
    }

    fn storage_trie(&mut self, address: Address) -> Result<&mut HashedPartialTrie, StateError> {
        if !self.storage.contains_key(&address) {
            let root = self
                .read_account(address)?
                .map_or(EMPTY_TRIE_HASH, |a| a.storage_root);
            let trie = self.db.open_trie(root).map_err(|source| StateError::Node {
                owner: account_key(address),
                source,
            })?;
            self.storage.insert(address, trie);
        }
        Ok(self.storage.entry(address).or_default())
    }

    /// The `eth_getProof` response for `address` and `slots` at the current
    /// root.
    pub fn prove(&mut self, address: Address, slots: &[H256]) -> Result<AccountProof, StateError> {
        let account = self.read_account(address)?;
        let account_proof = trie::prove(&self.accounts, account_key(address))
            .map_err(|e| StateError::trie(ACCOUNT_TRIE_OWNER, e))?;

        let owner = account_key(address);
        let mut storage_proof = Vec::with_capacity(slots.len());
        for slot in slots {
            let value = self.storage(address, *slot)?;
            let trie = self.storage_trie(address)?;
            let proof = trie::prove(trie, storage_key(*slot))
                .map_err(|e| StateError::trie(owner, e))?;
            storage_proof.push(StorageProof {
                key: *slot,
                value,
                proof: proof.into_iter().map(Bytes).collect(),
            });
        }

        Ok(AccountProof {
            address,
            account_proof: account_proof.into_iter().map(Bytes).collect(),
            balance: account.map(|a| a.balance).unwrap_or_default(),
            code_hash: account.map(|a| a.code_hash).unwrap_or_default(),
            nonce: account.map(|a| a.nonce).unwrap_or_default(),
            storage_hash: account.map(|a| a.storage_root).unwrap_or_default(),
            storage_proof,
        })
    }
}

impl StateDatabase for TrieState {
    fn account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        self.read_account(address)
    }

    fn storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError> {
        let owner = account_key(address);
        let trie = self.storage_trie(address)?;
        trie::get(trie, storage_key(slot))
            .map_err(|e| StateError::trie(owner, e))?
            .map(|bytes| rlp::decode(&bytes))
            .transpose()
            .map(Option::unwrap_or_default)
            .map_err(|source| StateError::Value { owner, source })
    }

    fn code(&mut self, code_hash: H256) -> Result<Vec<u8>, StateError> {
        self.db
            .code(&code_hash)
            .map(<[u8]>::to_vec)
            .ok_or(StateError::MissingCode(code_hash))
    }

    fn header(&mut self, hash: H256) -> Result<Header, StateError> {
        self.db
            .header(&hash)
            .cloned()
            .ok_or(StateError::MissingHeader(hash))
    }

    fn commit(&mut self, post: &PostState) -> Result<H256, StateError> {
        for (address, update) in &post.accounts {
            let key = account_key(*address);
            let Some(info) = update.info else {
                trie::delete(&mut self.accounts, key)
                    .map_err(|e| StateError::trie(ACCOUNT_TRIE_OWNER, e))?;
                self.storage.remove(address);
                continue;
            };

            let storage_root = if update.destructed || !update.storage.is_empty() {
                if update.destructed {
                    self.storage
                        .insert(*address, HashedPartialTrie::new(Node::Empty));
                }
                let trie = self.storage_trie(*address)?;
                for (slot, value) in &update.storage {
                    let slot_key = storage_key(*slot);
                    match value.is_zero() {
                        true => trie::delete(trie, slot_key).map(drop),
                        false => trie::insert(trie, slot_key, rlp::encode(value).to_vec()),
                    }
                    .map_err(|e| StateError::trie(key, e))?;
                }
                trie.hash()
            } else {
                self.read_account(*address)?
                    .map_or(EMPTY_TRIE_HASH, |a| a.storage_root)
            };

            let account = Account {
                nonce: info.nonce,
                balance: info.balance,
                storage_root,
                code_hash: info.code_hash,
            };
            trie::insert(&mut self.accounts, key, rlp::encode(&account).to_vec())
                .map_err(|e| StateError::trie(ACCOUNT_TRIE_OWNER, e))?;
        }
        Ok(self.accounts.hash())
    }
}
