//! Turning `eth_getProof` responses into the trie nodes of a witness.
//!
//! Every node of a verified proof is recorded under the trie it belongs to
//! (its owner) and the path it sits at. Reading any proven key back from a
//! trie rebuilt from these nodes needs nothing else.
//!
//! Deleting a key is different. When a deletion leaves a branch with a single
//! child, the branch is collapsed into that child, which is then rewritten
//! with a longer key. The child is a sibling of the deleted key and is not on
//! its proof path, so a pre-state trie built from proofs alone only knows it
//! by hash and cannot perform the collapse. [`build_node_set_with_transition`]
//! recovers such siblings from the post-state proof of the deleted key: the
//! node that proof ends on is the collapsed result, and the sibling is that
//! same node with a shorter key, one level deeper. Which shortening is right
//! depends on how many levels collapsed, so all of them are added; the extra
//! nodes are never referenced.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ethereum_types::{Address, H256, U256};
use log::debug;
use zk_pig_common::{Bytes, EMPTY_TRIE_HASH};

use crate::{
    node::encode_short,
    proof::{verify_proof, ProofError, Terminal, VerifiedPath},
    trie::{account_key, storage_key},
    types::{Account, AccountProof, StorageProof},
};

/// Owner of the account trie. Storage tries are owned by the hashed address
/// of their account.
pub const ACCOUNT_TRIE_OWNER: H256 = H256::zero();

#[derive(Debug, thiserror::Error)]
pub enum NodeSetError {
    #[error("invalid account proof for {address:?}")]
    AccountProof {
        address: Address,
        #[source]
        source: ProofError,
    },
    #[error("undecodable account leaf for {address:?}")]
    AccountLeaf {
        address: Address,
        #[source]
        source: rlp::DecoderError,
    },
    #[error("account proof for {address:?} claims values that differ from the proven account")]
    AccountClaim { address: Address },
    #[error("invalid storage proof for {address:?} slot {slot:?}")]
    StorageProof {
        address: Address,
        slot: H256,
        #[source]
        source: ProofError,
    },
    #[error("undecodable storage leaf for {address:?} slot {slot:?}")]
    StorageLeaf {
        address: Address,
        slot: H256,
        #[source]
        source: rlp::DecoderError,
    },
    #[error("storage proof for {address:?} slot {slot:?} claims a value that differs from the proven one")]
    StorageClaim { address: Address, slot: H256 },
    #[error("conflicting nodes at path {path:?} of trie {owner:?}")]
    Conflict { owner: H256, path: Vec<u8> },
}

/// Nodes and proven leaves of a single trie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrieNodes {
    /// Node bytes by path (one nibble per byte).
    pub nodes: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Values proven present, by hashed key.
    pub leaves: BTreeMap<H256, Vec<u8>>,
}

/// Trie nodes partitioned by owner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeSet {
    tries: BTreeMap<H256, TrieNodes>,
}

impl NodeSet {
    /// Records `bytes` at `path` of the `owner` trie. Returns whether the node
    /// was new; a different node already at that path is an error.
    pub fn add_node(
        &mut self,
        owner: H256,
        path: Vec<u8>,
        bytes: Vec<u8>,
    ) -> Result<bool, NodeSetError> {
        let nodes = &mut self.tries.entry(owner).or_default().nodes;
        match nodes.get(&path) {
            Some(existing) if *existing == bytes => Ok(false),
            Some(_) => Err(NodeSetError::Conflict { owner, path }),
            None => {
                nodes.insert(path, bytes);
                Ok(true)
            }
        }
    }

    pub fn contains(&self, owner: H256, path: &[u8]) -> bool {
        self.tries
            .get(&owner)
            .is_some_and(|trie| trie.nodes.contains_key(path))
    }

    pub fn trie(&self, owner: H256) -> Option<&TrieNodes> {
        self.tries.get(&owner)
    }

    pub fn owners(&self) -> impl Iterator<Item = H256> + '_ {
        self.tries.keys().copied()
    }

    /// Union of both sets, failing on conflicting nodes.
    pub fn merge(&mut self, other: NodeSet) -> Result<(), NodeSetError> {
        for (owner, trie) in other.tries {
            for (path, bytes) in trie.nodes {
                self.add_node(owner, path, bytes)?;
            }
            self.tries
                .entry(owner)
                .or_default()
                .leaves
                .extend(trie.leaves);
        }
        Ok(())
    }

    /// Every node, across owners.
    pub fn nodes(&self) -> impl Iterator<Item = (H256, &[u8], &[u8])> {
        self.tries.iter().flat_map(|(owner, trie)| {
            trie.nodes
                .iter()
                .map(move |(path, bytes)| (*owner, path.as_slice(), bytes.as_slice()))
        })
    }

    /// Distinct node encodings, sorted.
    pub fn node_bytes(&self) -> Vec<Bytes> {
        self.nodes()
            .map(|(_, _, bytes)| Bytes::from(bytes))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tries.values().map(|trie| trie.nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add_path(
        &mut self,
        owner: H256,
        key: H256,
        verified: &VerifiedPath,
    ) -> Result<(), NodeSetError> {
        for node in &verified.nodes {
            self.add_node(owner, node.path.clone(), node.bytes.clone())?;
        }
        if let Some(value) = &verified.value {
            self.tries
                .entry(owner)
                .or_default()
                .leaves
                .insert(key, value.clone());
        }
        Ok(())
    }
}

/// Verifies every proof against `state_root` and collects their nodes.
///
/// Storage proofs are verified against the storage root of the proven
/// account, so a proof set can only describe one state.
pub fn build_node_set(
    state_root: H256,
    proofs: &[AccountProof],
) -> Result<NodeSet, NodeSetError> {
    let mut set = NodeSet::default();
    for proof in proofs {
        let (verified, account) = verify_account(state_root, proof)?;
        set.add_path(ACCOUNT_TRIE_OWNER, account_key(proof.address), &verified)?;

        let storage_root = account.map_or(EMPTY_TRIE_HASH, |a| a.storage_root);
        let owner = account_key(proof.address);
        for slot in &proof.storage_proof {
            let verified = verify_storage(storage_root, proof.address, slot)?;
            set.add_path(owner, storage_key(slot.key), &verified)?;
        }
    }
    Ok(set)
}

/// Same as [`build_node_set`] over `pre_proofs`, plus the nodes needed to
/// delete every key that `post_proofs` show absent at `post_root`.
pub fn build_node_set_with_transition(
    pre_root: H256,
    post_root: H256,
    pre_proofs: &[AccountProof],
    post_proofs: &[AccountProof],
) -> Result<NodeSet, NodeSetError> {
    let mut set = build_node_set(pre_root, pre_proofs)?;
    let post_proofs: HashMap<Address, &AccountProof> =
        post_proofs.iter().map(|p| (p.address, p)).collect();

    for pre in pre_proofs {
        let Some(post) = post_proofs.get(&pre.address) else {
            continue;
        };
        let (pre_path, pre_account) = verify_account(pre_root, pre)?;
        let (post_path, post_account) = verify_account(post_root, post)?;
        add_orphans(&mut set, ACCOUNT_TRIE_OWNER, &pre_path, &post_path)?;

        // a deleted account takes its whole storage trie with it
        let (Some(pre_account), Some(post_account)) = (pre_account, post_account) else {
            continue;
        };
        let owner = account_key(pre.address);
        let post_slots: HashMap<H256, &StorageProof> =
            post.storage_proof.iter().map(|s| (s.key, s)).collect();
        for pre_slot in &pre.storage_proof {
            let Some(post_slot) = post_slots.get(&pre_slot.key) else {
                continue;
            };
            let pre_path = verify_storage(pre_account.storage_root, pre.address, pre_slot)?;
            let post_path = verify_storage(post_account.storage_root, pre.address, post_slot)?;
            add_orphans(&mut set, owner, &pre_path, &post_path)?;
        }
    }
    Ok(set)
}

/// Adds every shortening of the short node a deleted key's post-state proof
/// ends on, at the path it would have had before the collapse.
fn add_orphans(
    set: &mut NodeSet,
    owner: H256,
    pre: &VerifiedPath,
    post: &VerifiedPath,
) -> Result<(), NodeSetError> {
    if pre.value.is_none() || post.value.is_some() {
        return Ok(());
    }
    let Some(Terminal::Short {
        path,
        key,
        leaf,
        value,
    }) = &post.terminal
    else {
        return Ok(());
    };

    // extensions cannot have an empty key
    let longest = match leaf {
        true => key.len(),
        false => key.len().saturating_sub(1),
    };
    for split in 1..=longest {
        let orphan = encode_short(&key[split..], *leaf, value);
        // shorter nodes are embedded in their parent
        if orphan.len() < 32 {
            continue;
        }
        let mut orphan_path = path.clone();
        orphan_path.extend_from_slice(&key[..split]);
        if set.contains(owner, &orphan_path) {
            continue;
        }
        debug!("orphan node at {orphan_path:?} of trie {owner:x}");
        set.add_node(owner, orphan_path, orphan)?;
    }
    Ok(())
}

fn verify_account(
    root: H256,
    proof: &AccountProof,
) -> Result<(VerifiedPath, Option<Account>), NodeSetError> {
    let address = proof.address;
    let verified = verify_proof(root, account_key(address), &proof.account_proof)
        .map_err(|source| NodeSetError::AccountProof { address, source })?;
    let account = verified
        .value
        .as_deref()
        .map(rlp::decode::<Account>)
        .transpose()
        .map_err(|source| NodeSetError::AccountLeaf { address, source })?;
    if !proof.claims(account.as_ref()) {
        return Err(NodeSetError::AccountClaim { address });
    }
    Ok((verified, account))
}

fn verify_storage(
    storage_root: H256,
    address: Address,
    proof: &StorageProof,
) -> Result<VerifiedPath, NodeSetError> {
    let slot = proof.key;
    let verified = verify_proof(storage_root, storage_key(slot), &proof.proof).map_err(
        |source| NodeSetError::StorageProof {
            address,
            slot,
            source,
        },
    )?;
    let value = verified
        .value
        .as_deref()
        .map(rlp::decode::<U256>)
        .transpose()
        .map_err(|source| NodeSetError::StorageLeaf {
            address,
            slot,
            source,
        })?
        .unwrap_or_default();
    if value != proof.value {
        return Err(NodeSetError::StorageClaim { address, slot });
    }
    Ok(verified)
}
