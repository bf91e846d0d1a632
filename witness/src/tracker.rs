//! Recording which state an execution reads.

use std::collections::{BTreeMap, BTreeSet};

use ethereum_types::{Address, H256, U256};

use crate::{
    evm::PostState,
    state::{StateDatabase, StateError},
    types::{Account, Header},
};

/// First-read values of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessedAccount {
    /// `None` if the account did not exist when first read.
    pub account: Option<Account>,
    pub storage: BTreeMap<H256, U256>,
}

/// Every account touched under one state root.
pub type Accesses = BTreeMap<Address, AccessedAccount>;

/// Wraps a [`StateDatabase`] and remembers, per state root, the first value
/// seen for every account and slot.
///
/// Later reads go to the wrapped database and may observe writes committed
/// in the meantime, but never replace what was recorded: the tracker
/// describes the state as it was before execution touched it.
///
/// Cloning produces a fully independent tracker.
#[derive(Clone, Debug)]
pub struct AccessTracker<S> {
    inner: S,
    root: H256,
    accesses: BTreeMap<H256, Accesses>,
    codes: BTreeMap<H256, Vec<u8>>,
    headers: BTreeMap<H256, Header>,
}

impl<S: StateDatabase> AccessTracker<S> {
    /// `root` is the state root `inner` currently reads from.
    pub fn new(inner: S, root: H256) -> Self {
        Self {
            inner,
            root,
            accesses: BTreeMap::new(),
            codes: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> H256 {
        self.root
    }

    /// Switches recording to another root, for a wrapped database that was
    /// moved to another state outside of [`StateDatabase::commit`].
    pub fn set_root(&mut self, root: H256) {
        self.root = root;
    }

    /// What was read under `root`.
    pub fn accesses(&self, root: H256) -> Option<&Accesses> {
        self.accesses.get(&root)
    }

    pub fn roots(&self) -> impl Iterator<Item = H256> + '_ {
        self.accesses.keys().copied()
    }

    /// Bytecodes read, by hash.
    pub fn codes(&self) -> &BTreeMap<H256, Vec<u8>> {
        &self.codes
    }

    /// Headers read, by hash.
    pub fn headers(&self) -> &BTreeMap<H256, Header> {
        &self.headers
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn record_account(&mut self, address: Address, account: Option<Account>) {
        self.accesses
            .entry(self.root)
            .or_default()
            .entry(address)
            .or_insert_with(|| AccessedAccount {
                account,
                storage: BTreeMap::new(),
            });
    }

    fn is_recorded(&self, address: Address) -> bool {
        self.accesses
            .get(&self.root)
            .is_some_and(|accesses| accesses.contains_key(&address))
    }
}

impl<S: StateDatabase> StateDatabase for AccessTracker<S> {
    fn account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        let account = self.inner.account(address)?;
        self.record_account(address, account);
        Ok(account)
    }

    fn storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError> {
        if !self.is_recorded(address) {
            let account = self.inner.account(address)?;
            self.record_account(address, account);
        }
        let value = self.inner.storage(address, slot)?;
        self.accesses
            .entry(self.root)
            .or_default()
            .entry(address)
            .or_default()
            .storage
            .entry(slot)
            .or_insert(value);
        Ok(value)
    }

    fn code(&mut self, code_hash: H256) -> Result<Vec<u8>, StateError> {
        let code = self.inner.code(code_hash)?;
        self.codes.entry(code_hash).or_insert_with(|| code.clone());
        Ok(code)
    }

    fn header(&mut self, hash: H256) -> Result<Header, StateError> {
        let header = self.inner.header(hash)?;
        self.headers.entry(hash).or_insert_with(|| header.clone());
        Ok(header)
    }

    fn commit(&mut self, post: &PostState) -> Result<H256, StateError> {
        self.root = self.inner.commit(post)?;
        Ok(self.root)
    }
}

/// Keys that `post` deletes from the state recorded in `pre`: for each
/// address, the slots that go from non-zero to zero. Accounts that stop
/// existing are listed without slots, as their storage goes with them.
pub fn deleted_keys(pre: &Accesses, post: &PostState) -> BTreeMap<Address, BTreeSet<H256>> {
    let mut deleted = BTreeMap::new();
    for (address, update) in &post.accounts {
        let Some(accessed) = pre.get(address) else {
            continue;
        };
        if accessed.account.is_none() {
            continue;
        }
        if update.info.is_none() {
            deleted.insert(*address, BTreeSet::new());
            continue;
        }
        let slots: BTreeSet<H256> = accessed
            .storage
            .iter()
            .filter(|&(slot, value)| {
                let after = update.storage.get(slot).copied();
                !value.is_zero()
                    && match update.destructed {
                        true => after.unwrap_or_default().is_zero(),
                        false => after.is_some_and(|v| v.is_zero()),
                    }
            })
            .map(|(slot, _)| *slot)
            .collect();
        if !slots.is_empty() {
            deleted.insert(*address, slots);
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zk_pig_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

    use super::*;
    use crate::{
        evm::{AccountInfo, AccountUpdate},
        state::TrieState,
    };

    fn address(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn slot(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    fn funded(balance: u64, storage: &[(u64, u64)]) -> AccountUpdate {
        AccountUpdate {
            info: Some(AccountInfo {
                nonce: 0,
                balance: balance.into(),
                code_hash: EMPTY_CODE_HASH,
            }),
            destructed: false,
            storage: storage
                .iter()
                .map(|(k, v)| (slot(*k), U256::from(*v)))
                .collect(),
        }
    }

    fn tracker() -> AccessTracker<TrieState> {
        let mut state = TrieState::open(Arc::default(), EMPTY_TRIE_HASH).unwrap();
        let mut post = PostState::default();
        post.accounts.insert(address(1), funded(10, &[(1, 1), (2, 2)]));
        post.accounts.insert(address(2), funded(20, &[]));
        let root = state.commit(&post).unwrap();
        AccessTracker::new(state, root)
    }

    #[test]
    fn first_read_wins() {
        let mut tracker = tracker();
        let root = tracker.root();
        assert_eq!(tracker.storage(address(1), slot(1)).unwrap(), U256::one());

        let mut post = PostState::default();
        post.accounts.insert(address(1), funded(11, &[(1, 5)]));
        let next = tracker.commit(&post).unwrap();
        assert_ne!(next, root);

        // live reads see the write
        assert_eq!(tracker.storage(address(1), slot(1)).unwrap(), U256::from(5));
        let recorded = &tracker.accesses(root).unwrap()[&address(1)];
        assert_eq!(recorded.storage[&slot(1)], U256::one());
        assert_eq!(recorded.account.unwrap().balance, U256::from(10));
        assert_eq!(tracker.roots().count(), 2);
    }

    #[test]
    fn storage_reads_record_the_account() {
        let mut tracker = tracker();
        tracker.storage(address(3), slot(9)).unwrap();
        let accesses = tracker.accesses(tracker.root()).unwrap();
        assert_eq!(accesses[&address(3)].account, None);
        assert_eq!(accesses[&address(3)].storage[&slot(9)], U256::zero());
    }

    #[test]
    fn clones_are_independent() {
        let mut tracker = tracker();
        tracker.account(address(1)).unwrap();
        let mut fork = tracker.clone();
        fork.storage(address(1), slot(2)).unwrap();
        fork.account(address(2)).unwrap();

        let root = tracker.root();
        assert!(tracker.accesses(root).unwrap()[&address(1)].storage.is_empty());
        assert!(!tracker.accesses(root).unwrap().contains_key(&address(2)));
        assert_eq!(fork.accesses(root).unwrap().len(), 2);
    }

    #[test]
    fn deletions_are_detected() {
        let mut tracker = tracker();
        for n in 1..=3 {
            tracker.storage(address(1), slot(n)).unwrap();
        }
        tracker.account(address(2)).unwrap();
        tracker.account(address(4)).unwrap();
        let pre = tracker.accesses(tracker.root()).unwrap().clone();

        let mut post = PostState::default();
        post.accounts.insert(address(1), funded(10, &[(1, 0), (3, 0)]));
        post.accounts.insert(address(2), AccountUpdate::default());
        post.accounts.insert(address(4), AccountUpdate::default());
        let deleted = deleted_keys(&pre, &post);
        assert_eq!(deleted.len(), 2);
        assert_eq!(deleted[&address(1)], BTreeSet::from([slot(1)]));
        assert!(deleted[&address(2)].is_empty());

        post.accounts.insert(
            address(1),
            AccountUpdate {
                destructed: true,
                ..funded(10, &[(2, 7)])
            },
        );
        assert_eq!(deleted_keys(&pre, &post)[&address(1)], BTreeSet::from([slot(1)]));
    }
}
