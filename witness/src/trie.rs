//! Key derivation and strict traversal of partial tries.
//!
//! [`PartialTrie::get`] treats an unresolved [`Node::Hash`] as "absent",
//! which would turn an incomplete witness into silently wrong reads. Every
//! read in this crate goes through [`get`] instead, which reports the
//! missing node.

use ethereum_types::{Address, H256};
use keccak_hash::keccak;
use mpt_trie::{
    partial_trie::{HashedPartialTrie, Node, PartialTrie},
    trie_ops::TrieOpError,
};

use crate::node::{bytes_to_nibbles, encode_trie_node, from_nibbles, to_nibbles, NodeError};

#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    #[error("trie node {0:x} is not available")]
    MissingNode(H256),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Op(TrieOpError),
}

impl From<TrieOpError> for TrieError {
    fn from(e: TrieOpError) -> Self {
        match e {
            TrieOpError::HashNodeInsertError(hash) | TrieOpError::HashNodeDeleteError(hash) => {
                Self::MissingNode(hash)
            }
            other => Self::Op(other),
        }
    }
}

/// Key of `address` in the account trie.
pub fn account_key(address: Address) -> H256 {
    keccak(address)
}

/// Key of `slot` in a storage trie.
pub fn storage_key(slot: H256) -> H256 {
    keccak(slot)
}

/// Reads `key`, failing if the walk reaches a node that is only known by its
/// hash.
pub fn get(trie: &HashedPartialTrie, key: H256) -> Result<Option<Vec<u8>>, TrieError> {
    let key = bytes_to_nibbles(key.as_bytes());
    let mut node: &HashedPartialTrie = trie;
    let mut rest: &[u8] = &key;
    loop {
        match &**node {
            Node::Empty => return Ok(None),
            Node::Hash(hash) => return Err(TrieError::MissingNode(*hash)),
            Node::Branch { children, value } => match rest.split_first() {
                Some((nibble, tail)) => {
                    node = &children[*nibble as usize];
                    rest = tail;
                }
                None => return Ok((!value.is_empty()).then(|| value.clone())),
            },
            Node::Extension { nibbles, child } => {
                match rest.strip_prefix(from_nibbles(nibbles).as_slice()) {
                    Some(tail) => {
                        node = child;
                        rest = tail;
                    }
                    None => return Ok(None),
                }
            }
            Node::Leaf { nibbles, value } => {
                return Ok((from_nibbles(nibbles) == rest).then(|| value.clone()))
            }
        }
    }
}

pub fn insert(trie: &mut HashedPartialTrie, key: H256, value: Vec<u8>) -> Result<(), TrieError> {
    trie.insert(to_nibbles(&bytes_to_nibbles(key.as_bytes())), value)?;
    Ok(())
}

pub fn delete(trie: &mut HashedPartialTrie, key: H256) -> Result<Option<Vec<u8>>, TrieError> {
    Ok(trie.delete(to_nibbles(&bytes_to_nibbles(key.as_bytes())))?)
}

/// Builds the proof a node would return for `key`: every node on the path
/// that is referenced by hash, root included.
pub fn prove(trie: &HashedPartialTrie, key: H256) -> Result<Vec<Vec<u8>>, TrieError> {
    let key = bytes_to_nibbles(key.as_bytes());
    let mut proof = Vec::new();
    let mut node: &HashedPartialTrie = trie;
    let mut rest: &[u8] = &key;
    loop {
        match &**node {
            Node::Empty => return Ok(proof),
            Node::Hash(hash) => return Err(TrieError::MissingNode(*hash)),
            _ => {}
        }
        let encoded = encode_trie_node(node)?;
        if proof.is_empty() || encoded.len() >= 32 {
            proof.push(encoded);
        }
        match &**node {
            Node::Branch { children, .. } => match rest.split_first() {
                Some((nibble, tail)) => {
                    node = &children[*nibble as usize];
                    rest = tail;
                }
                None => return Ok(proof),
            },
            Node::Extension { nibbles, child } => {
                match rest.strip_prefix(from_nibbles(nibbles).as_slice()) {
                    Some(tail) => {
                        node = child;
                        rest = tail;
                    }
                    None => return Ok(proof),
                }
            }
            _ => return Ok(proof),
        }
    }
}

#[cfg(test)]
mod tests {
    use mpt_trie::partial_trie::WrappedNode;
    use zk_pig_common::EMPTY_TRIE_HASH;

    use super::*;
    use crate::proof::verify_proof;

    fn sample() -> HashedPartialTrie {
        let mut trie = HashedPartialTrie::new(Node::Empty);
        for i in 0u64..64 {
            insert(&mut trie, H256::from_low_u64_be(i), vec![i as u8 + 1; 3]).unwrap();
        }
        trie
    }

    #[test]
    fn proofs_verify() {
        let trie = sample();
        for i in 0u64..70 {
            let key = H256::from_low_u64_be(i);
            let proof = prove(&trie, key).unwrap();
            let verified = verify_proof(trie.hash(), key, &proof).unwrap();
            assert_eq!(verified.value, get(&trie, key).unwrap());
            assert_eq!(verified.value.is_some(), i < 64);
            assert_eq!(verified.terminal.is_some(), i >= 64);
            assert_eq!(verified.nodes.first().map(|n| n.path.len()), Some(0));
        }
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let trie = sample();
        let key = H256::from_low_u64_be(3);
        let mut proof = prove(&trie, key).unwrap();
        let last = proof.len() - 1;
        proof.remove(last);
        assert!(verify_proof(trie.hash(), key, &proof).is_err());

        let proof = prove(&trie, key).unwrap();
        assert!(verify_proof(H256::repeat_byte(7), key, &proof).is_err());
    }

    #[test]
    fn empty_trie() {
        let trie = HashedPartialTrie::new(Node::Empty);
        assert_eq!(trie.hash(), EMPTY_TRIE_HASH);
        assert!(prove(&trie, H256::zero()).unwrap().is_empty());
        let verified = verify_proof::<Vec<u8>>(EMPTY_TRIE_HASH, H256::zero(), &[]).unwrap();
        assert_eq!(verified.value, None);
    }

    #[test]
    fn strict_get_reports_hash_nodes() {
        let hidden = H256::repeat_byte(0xab);
        let mut children: [WrappedNode<HashedPartialTrie>; 16] =
            std::array::from_fn(|_| Node::Empty.into());
        children[1] = Node::Hash(hidden).into();
        let trie = HashedPartialTrie::new(Node::Branch {
            children,
            value: vec![],
        });

        let mut key = [0u8; 32];
        key[0] = 0x10;
        assert!(matches!(get(&trie, H256(key)), Err(TrieError::MissingNode(h)) if h == hidden));
        key[0] = 0x20;
        assert_eq!(get(&trie, H256(key)).unwrap(), None);
        // the default lookup cannot tell the difference
        key[0] = 0x10;
        assert_eq!(trie.get(to_nibbles(&bytes_to_nibbles(&key))), None);
    }
}
