#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use witness::{
    evm::{AccountInfo, AccountUpdate, BlockExecutor, ExecuteOptions, PostState},
    replay::{BlockStateDiff, StateDiffExecutor, StateDiffSource},
    state::{StateDatabase, StateError, TrieState},
    types::Withdrawal,
    Account, AccountProof, Block, ChainConfig, ChainRegistry, Header,
};
use zk_pig::{
    generator::Generator,
    rpc::{ChainClient, StateDiffClient},
    store::{ArtifactStore, Headers, MemoryStore},
};
use zk_pig_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

pub const GENESIS_TIME: u64 = 1_700_000_000;

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn slot(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn code(n: u64) -> Vec<u8> {
    vec![0x60, n as u8, 0x60, 0x00, 0x55, 0x00]
}

fn info(nonce: u64, balance: u64, code_hash: H256) -> Option<AccountInfo> {
    Some(AccountInfo {
        nonce,
        balance: balance.into(),
        code_hash,
    })
}

/// Diffs recorded per block number.
#[derive(Clone, Debug, Default)]
pub struct DiffsByNumber(pub BTreeMap<u64, BlockStateDiff>);

impl StateDiffSource for DiffsByNumber {
    fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff> {
        self.0
            .get(&block.number())
            .cloned()
            .with_context(|| format!("no diff for block {}", block.number()))
    }
}

/// A full state together with the headers and codes of the chain, as a node
/// sees it.
struct FullState<'a> {
    state: &'a mut TrieState,
    headers: &'a HashMap<H256, Header>,
    codes: &'a HashMap<H256, Vec<u8>>,
}

impl StateDatabase for FullState<'_> {
    fn account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        self.state.account(address)
    }

    fn storage(&mut self, address: Address, slot: H256) -> Result<U256, StateError> {
        self.state.storage(address, slot)
    }

    fn code(&mut self, code_hash: H256) -> Result<Vec<u8>, StateError> {
        self.codes
            .get(&code_hash)
            .cloned()
            .ok_or(StateError::MissingCode(code_hash))
    }

    fn header(&mut self, hash: H256) -> Result<Header, StateError> {
        self.headers
            .get(&hash)
            .cloned()
            .ok_or(StateError::MissingHeader(hash))
    }

    fn commit(&mut self, post: &PostState) -> Result<H256, StateError> {
        self.state.commit(post)
    }
}

#[derive(Debug)]
struct Inner {
    /// Full state after each block.
    states: Vec<TrieState>,
    blocks: Vec<Block>,
    headers: HashMap<H256, Header>,
    hidden: HashSet<H256>,
    diffs: DiffsByNumber,
    codes: HashMap<H256, Vec<u8>>,
}

/// An archive node serving a chain built in memory.
#[derive(Debug)]
pub struct MockChain {
    chain_id: u64,
    inner: Mutex<Inner>,
}

impl MockChain {
    pub fn new(chain_id: u64, genesis: PostState, codes: Vec<Vec<u8>>) -> Self {
        let mut state = TrieState::placeholder();
        let state_root = state.commit(&genesis).unwrap();
        let header = Header {
            number: 0,
            timestamp: GENESIS_TIME,
            state_root,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(7.into()),
            withdrawals_root: Some(EMPTY_TRIE_HASH),
            ..Default::default()
        };
        let genesis = Block {
            header: header.clone(),
            transactions: vec![],
            uncles: vec![],
            withdrawals: Some(vec![]),
        };
        Self {
            chain_id,
            inner: Mutex::new(Inner {
                states: vec![state],
                blocks: vec![genesis],
                headers: HashMap::from([(header.hash(), header)]),
                hidden: HashSet::new(),
                diffs: DiffsByNumber::default(),
                codes: codes.into_iter().map(|c| (keccak(&c), c)).collect(),
            }),
        }
    }

    /// Forty accounts; account `i` holds slots `1..=i % 9` with values
    /// `s * i`, and every tenth one has code.
    pub fn world() -> Self {
        let mut genesis = PostState::default();
        let mut codes = vec![];
        for i in 1..=40u64 {
            let code_hash = match i % 10 {
                0 => {
                    codes.push(code(i));
                    keccak(code(i))
                }
                _ => EMPTY_CODE_HASH,
            };
            genesis.accounts.insert(
                address(i),
                AccountUpdate {
                    info: info(1, i * 10, code_hash),
                    destructed: false,
                    storage: (1..=i % 9).map(|s| (slot(s), U256::from(s * i))).collect(),
                },
            );
        }
        Self::new(1, genesis, codes)
    }

    /// Applies `diff` on top of the latest block, with the root a node
    /// would compute.
    pub fn push_block(&self, diff: BlockStateDiff, withdrawals: Vec<Withdrawal>) -> Block {
        let mut inner = self.inner.lock().unwrap();
        let parent = inner.blocks.last().unwrap().header.clone();
        let mut block = Block {
            header: Header {
                number: parent.number + 1,
                parent_hash: parent.hash(),
                timestamp: parent.timestamp + 12,
                ..parent.clone()
            },
            transactions: vec![],
            uncles: vec![],
            withdrawals: Some(withdrawals),
        };
        inner.diffs.0.insert(block.number(), diff);

        let mut state = inner.states.last().unwrap().clone();
        let executor = StateDiffExecutor::new(inner.diffs.clone());
        let outcome = executor
            .execute(
                &ChainConfig::mainnet(),
                &block,
                &mut FullState {
                    state: &mut state,
                    headers: &inner.headers,
                    codes: &inner.codes,
                },
                ExecuteOptions { validate: true },
            )
            .unwrap();
        block.header.state_root = outcome.state_root;

        inner.headers.insert(block.hash(), block.header.clone());
        inner.states.push(state);
        inner.blocks.push(block.clone());
        block
    }

    pub fn block(&self, number: u64) -> Block {
        self.inner.lock().unwrap().blocks[number as usize].clone()
    }

    pub fn diffs(&self) -> DiffsByNumber {
        self.inner.lock().unwrap().diffs.clone()
    }

    /// The header of block `number` is no longer served by hash.
    pub fn hide_header(&self, number: u64) {
        let mut inner = self.inner.lock().unwrap();
        let hash = inner.blocks[number as usize].hash();
        inner.hidden.insert(hash);
    }
}

impl ChainClient for MockChain {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.inner.lock().unwrap().blocks.len() as u64 - 1)
    }

    async fn block_by_number(&self, number: Option<u64>) -> anyhow::Result<Block> {
        let inner = self.inner.lock().unwrap();
        let block = match number {
            Some(number) => inner.blocks.get(number as usize),
            None => inner.blocks.last(),
        };
        block.cloned().context("no such block")
    }

    async fn header_by_hash(&self, hash: H256) -> anyhow::Result<Option<Header>> {
        let inner = self.inner.lock().unwrap();
        if inner.hidden.contains(&hash) {
            return Ok(None);
        }
        Ok(inner.headers.get(&hash).cloned())
    }

    async fn get_proof(
        &self,
        address: Address,
        slots: Vec<H256>,
        block: u64,
    ) -> anyhow::Result<AccountProof> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(block as usize).context("no such block")?;
        Ok(state.prove(address, &slots)?)
    }

    async fn storage_at(&self, address: Address, slot: H256, block: u64) -> anyhow::Result<U256> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(block as usize).context("no such block")?;
        Ok(state.storage(address, slot)?)
    }

    async fn code_at(&self, address: Address, block: u64) -> anyhow::Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(block as usize).context("no such block")?;
        let code_hash = state
            .account(address)?
            .map_or(EMPTY_CODE_HASH, |a| a.code_hash);
        Ok(inner.codes.get(&code_hash).cloned().unwrap_or_default())
    }
}

impl StateDiffClient for MockChain {
    async fn state_diff(&self, block: &Block) -> anyhow::Result<BlockStateDiff> {
        self.inner.lock().unwrap().diffs.state_diff(block)
    }
}

/// A block touching the state in every way that matters for witnesses:
/// plain reads, updates, slot deletions with and without trie collapse, an
/// account deletion and a withdrawal.
pub fn mixed_diff() -> BlockStateDiff {
    let mut diff = BlockStateDiff::default();
    diff.reads.insert(address(11), BTreeSet::from([slot(1), slot(2)]));
    diff.reads.insert(address(20), BTreeSet::new());
    diff.reads.insert(address(33), BTreeSet::from([slot(40)]));

    let accounts = &mut diff.post.accounts;
    accounts.insert(
        address(1),
        AccountUpdate {
            info: info(2, 5, EMPTY_CODE_HASH),
            ..Default::default()
        },
    );
    accounts.insert(
        address(7),
        AccountUpdate {
            info: info(1, 75, EMPTY_CODE_HASH),
            destructed: false,
            storage: BTreeMap::from([(slot(1), U256::from(777))]),
        },
    );
    accounts.insert(
        address(2),
        AccountUpdate {
            info: info(1, 20, EMPTY_CODE_HASH),
            destructed: false,
            storage: BTreeMap::from([(slot(1), U256::zero())]),
        },
    );
    accounts.insert(
        address(3),
        AccountUpdate {
            info: info(1, 30, EMPTY_CODE_HASH),
            destructed: false,
            storage: BTreeMap::from([(slot(2), U256::zero())]),
        },
    );
    accounts.insert(address(5), AccountUpdate::default());
    diff
}

pub fn withdrawal() -> Withdrawal {
    Withdrawal {
        index: 0,
        validator_index: 9,
        address: address(9),
        amount: 3,
    }
}

pub fn generator(chain: &Arc<MockChain>, store: MemoryStore) -> Generator<MockChain, MemoryStore> {
    Generator::new(
        chain.clone(),
        ArtifactStore::new(store, Headers::default()),
        Arc::new(ChainRegistry::builtin()),
    )
}
