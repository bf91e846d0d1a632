//! A [`StateDatabase`] reading from an archive node.

use std::{collections::HashMap, future::Future, sync::Arc};

use anyhow::{ensure, Context as _};
use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use tokio::runtime::Handle;
use witness::{
    evm::{AccountUpdate, PostState},
    proof::verify_proof,
    state::{StateDatabase, StateError, TrieState},
    trie::account_key,
    Account, Header,
};
use zk_pig_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

use crate::rpc::ChainClient;

/// Reads state from a remote node, at the block whose state root it was
/// pointed to.
///
/// The node addresses state by block number, so every root has to be
/// registered with [`RemoteState::mark_block`] before it can be read from.
/// Writes are kept locally and shadow the remote state. Roots returned by
/// [`StateDatabase::commit`] come from tries that only know about the writes:
/// they are not the real post-state roots and must not be checked.
///
/// Every call blocks on `handle`, so this must be used from a thread outside
/// of its runtime, e.g. in [`tokio::task::spawn_blocking`].
#[derive(Debug)]
pub struct RemoteState<C> {
    client: Arc<C>,
    handle: Handle,
    numbers: HashMap<H256, u64>,
    /// Root and number of the block reads are made at.
    base: Option<(H256, u64)>,
    root: H256,
    headers: HashMap<H256, Header>,
    accounts: HashMap<(u64, Address), Option<Account>>,
    storage: HashMap<(u64, Address, H256), U256>,
    codes: HashMap<H256, Vec<u8>>,
    /// An account having each code, to fetch it through.
    code_owners: HashMap<H256, (Address, u64)>,
    writes: HashMap<Address, AccountUpdate>,
    placeholder: TrieState,
}

impl<C: ChainClient> RemoteState<C> {
    pub fn new(client: Arc<C>, handle: Handle) -> Self {
        Self {
            client,
            handle,
            numbers: HashMap::new(),
            base: None,
            root: H256::zero(),
            headers: HashMap::new(),
            accounts: HashMap::new(),
            storage: HashMap::new(),
            codes: HashMap::new(),
            code_owners: HashMap::new(),
            writes: HashMap::new(),
            placeholder: TrieState::placeholder(),
        }
    }

    /// Makes the state of `header` readable by its root, and the header
    /// itself available without a remote call.
    pub fn mark_block(&mut self, header: &Header) {
        self.numbers.insert(header.state_root, header.number);
        self.headers.insert(header.hash(), header.clone());
    }

    /// Reads from now on happen at the state with the given root, on top of
    /// which previous writes still apply.
    pub fn set_root(&mut self, root: H256) -> Result<(), StateError> {
        let number = self
            .numbers
            .get(&root)
            .copied()
            .ok_or(StateError::MissingBlockForStateRoot(root))?;
        self.base = Some((root, number));
        self.root = root;
        Ok(())
    }

    fn base(&self) -> Result<(H256, u64), StateError> {
        self.base.ok_or(StateError::MissingBlockForStateRoot(self.root))
    }

    fn block_on<T>(&self, call: impl Future<Output = anyhow::Result<T>>) -> Result<T, StateError> {
        Ok(self.handle.block_on(call)?)
    }

    fn remote_account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        let (root, number) = self.base()?;
        if let Some(account) = self.accounts.get(&(number, address)) {
            return Ok(*account);
        }

        let proof = self
            .block_on(self.client.get_proof(address, vec![], number))
            .map_err(|e| remote_error(e, || format!("account {address:?} at block {number}")))?;
        let account = verify_account(root, address, &proof)
            .with_context(|| format!("invalid proof for {address:?} at block {number}"))?;

        if let Some(account) = account.filter(Account::has_code) {
            self.code_owners
                .entry(account.code_hash)
                .or_insert((address, number));
        }
        self.accounts.insert((number, address), account);
        Ok(account)
    }

    fn remote_storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError> {
        let (_, number) = self.base()?;
        if let Some(value) = self.storage.get(&(number, address, slot)) {
            return Ok(*value);
        }
        let value = self
            .block_on(self.client.storage_at(address, slot, number))
            .map_err(|e| {
                remote_error(e, || format!("slot {slot:?} of {address:?} at block {number}"))
            })?;
        self.storage.insert((number, address, slot), value);
        Ok(value)
    }
}

fn remote_error(e: StateError, context: impl FnOnce() -> String) -> StateError {
    match e {
        StateError::Remote(e) => StateError::Remote(e.context(context())),
        other => other,
    }
}

/// The account `proof` shows under `root`, after checking the node reports
/// the same.
fn verify_account(
    root: H256,
    address: Address,
    proof: &witness::AccountProof,
) -> anyhow::Result<Option<Account>> {
    ensure!(proof.address == address, "proof is for {:?}", proof.address);
    let path = verify_proof(root, account_key(address), &proof.account_proof)?;
    let account: Option<Account> = path.value.map(|v| rlp::decode(&v)).transpose()?;
    ensure!(
        proof.claims(account.as_ref()),
        "claimed fields do not match the proven account"
    );
    Ok(account)
}

impl<C: ChainClient> StateDatabase for RemoteState<C> {
    fn account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        let Some(update) = self.writes.get(&address) else {
            return self.remote_account(address);
        };
        let (info, destructed) = (update.info, update.destructed);
        let Some(info) = info else {
            return Ok(None);
        };
        // storage roots of written accounts are not tracked
        let storage_root = match destructed {
            true => EMPTY_TRIE_HASH,
            false => self
                .remote_account(address)?
                .map_or(EMPTY_TRIE_HASH, |a| a.storage_root),
        };
        Ok(Some(Account {
            nonce: info.nonce,
            balance: info.balance,
            storage_root,
            code_hash: info.code_hash,
        }))
    }

    fn storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError> {
        if let Some(update) = self.writes.get(&address) {
            if let Some(value) = update.storage.get(&slot) {
                return Ok(*value);
            }
            if update.destructed || update.info.is_none() {
                return Ok(U256::zero());
            }
        }
        self.remote_storage(address, slot)
    }

    fn code(&mut self, code_hash: H256) -> Result<Vec<u8>, StateError> {
        if code_hash == EMPTY_CODE_HASH {
            return Ok(vec![]);
        }
        if let Some(code) = self.codes.get(&code_hash) {
            return Ok(code.clone());
        }
        let (address, number) = self
            .code_owners
            .get(&code_hash)
            .copied()
            .ok_or(StateError::MissingCode(code_hash))?;
        let code = self.block_on(self.client.code_at(address, number))?;
        if keccak(&code) != code_hash {
            return Err(anyhow::anyhow!(
                "code of {address:?} at block {number} does not hash to {code_hash:x}"
            )
            .into());
        }
        self.codes.insert(code_hash, code.clone());
        Ok(code)
    }

    fn header(&mut self, hash: H256) -> Result<Header, StateError> {
        if let Some(header) = self.headers.get(&hash) {
            return Ok(header.clone());
        }
        let header = self
            .block_on(self.client.header_by_hash(hash))
            .map_err(|e| remote_error(e, || format!("header {hash:x}")))?
            .ok_or(StateError::MissingHeader(hash))?;
        self.headers.insert(hash, header.clone());
        Ok(header)
    }

    fn commit(&mut self, post: &PostState) -> Result<H256, StateError> {
        for (address, update) in &post.accounts {
            let entry = self.writes.entry(*address).or_default();
            if update.info.is_none() || update.destructed {
                entry.destructed = true;
                entry.storage.clear();
            }
            entry.info = update.info;
            entry.storage.extend(&update.storage);
        }
        self.root = self.placeholder.commit(post)?;
        Ok(self.root)
    }
}
