//! Content-addressed storage of trie nodes, bytecodes and headers.

use std::collections::HashMap;

use ethereum_types::H256;
use keccak_hash::keccak;
use mpt_trie::partial_trie::{HashedPartialTrie, Node, PartialTrie as _, WrappedNode};
use zk_pig_common::{EMPTY_CODE_HASH, EMPTY_TRIE_HASH};

use crate::{
    input::Witness,
    node::{to_nibbles, ChildRef, NodeError, RawNode, ShortValue},
    nodeset::NodeSet,
    types::Header,
};

/// In-memory node database a partial trie can be opened from.
///
/// Nothing is ever removed: nodes are keyed by their hash, so different
/// states share whatever nodes they have in common.
#[derive(Clone, Debug, Default)]
pub struct MemoryDb {
    nodes: HashMap<H256, Vec<u8>>,
    codes: HashMap<H256, Vec<u8>>,
    headers: HashMap<H256, Header>,
}

impl MemoryDb {
    /// Loads everything a prover input carries. No other source is consulted
    /// when executing from the result.
    pub fn from_witness(witness: &Witness) -> Self {
        let mut db = Self::default();
        for node in &witness.state {
            db.insert_node(node.to_vec());
        }
        for code in &witness.codes {
            db.insert_code(code.to_vec());
        }
        for header in &witness.ancestors {
            db.insert_header(header.clone());
        }
        db
    }

    pub fn insert_node(&mut self, bytes: Vec<u8>) -> H256 {
        let hash = keccak(&bytes);
        self.nodes.insert(hash, bytes);
        hash
    }

    pub fn insert_node_set(&mut self, set: &NodeSet) {
        for (_, _, bytes) in set.nodes() {
            self.insert_node(bytes.to_vec());
        }
    }

    pub fn insert_code(&mut self, code: Vec<u8>) -> H256 {
        let hash = keccak(&code);
        self.codes.insert(hash, code);
        hash
    }

    pub fn insert_header(&mut self, header: Header) -> H256 {
        let hash = header.hash();
        self.headers.insert(hash, header);
        hash
    }

    pub fn node(&self, hash: &H256) -> Option<&[u8]> {
        self.nodes.get(hash).map(Vec::as_slice)
    }

    pub fn code(&self, hash: &H256) -> Option<&[u8]> {
        if *hash == EMPTY_CODE_HASH {
            return Some(&[]);
        }
        self.codes.get(hash).map(Vec::as_slice)
    }

    pub fn header(&self, hash: &H256) -> Option<&Header> {
        self.headers.get(hash)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rebuilds as much of the trie under `root` as the stored nodes allow.
    /// Children that are not stored are left as [`Node::Hash`], so the result
    /// always hashes to `root`.
    pub fn open_trie(&self, root: H256) -> Result<HashedPartialTrie, NodeError> {
        if root == EMPTY_TRIE_HASH {
            return Ok(HashedPartialTrie::new(Node::Empty));
        }
        Ok(HashedPartialTrie::new(self.resolve(ChildRef::Hash(root))?))
    }

    fn resolve(&self, child: ChildRef) -> Result<Node<HashedPartialTrie>, NodeError> {
        let bytes = match child {
            ChildRef::Empty => return Ok(Node::Empty),
            ChildRef::Hash(hash) => match self.nodes.get(&hash) {
                Some(bytes) => bytes.clone(),
                None => return Ok(Node::Hash(hash)),
            },
            ChildRef::Inline(bytes) => bytes,
        };
        Ok(match RawNode::decode(&bytes)? {
            RawNode::Branch { children, value } => {
                let mut resolved: [WrappedNode<HashedPartialTrie>; 16] =
                    std::array::from_fn(|_| Node::Empty.into());
                for (slot, child) in resolved.iter_mut().zip(*children) {
                    *slot = self.resolve(child)?.into();
                }
                Node::Branch {
                    children: resolved,
                    value,
                }
            }
            RawNode::Short { key, leaf, value } => match RawNode::short_value(leaf, &value)? {
                ShortValue::Leaf(value) => Node::Leaf {
                    nibbles: to_nibbles(&key),
                    value,
                },
                ShortValue::Child(child) => Node::Extension {
                    nibbles: to_nibbles(&key),
                    child: self.resolve(child)?.into(),
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie;

    #[test]
    fn partial_trie_keeps_its_root() {
        let mut full = HashedPartialTrie::new(Node::Empty);
        for i in 0u64..200 {
            trie::insert(&mut full, keccak(H256::from_low_u64_be(i)), vec![1; 33]).unwrap();
        }

        let key = keccak(H256::from_low_u64_be(7));
        let mut db = MemoryDb::default();
        for node in trie::prove(&full, key).unwrap() {
            db.insert_node(node);
        }
        let partial = db.open_trie(full.hash()).unwrap();
        assert_eq!(partial.hash(), full.hash());
        assert_eq!(trie::get(&partial, key).unwrap(), Some(vec![1; 33]));

        let other = (8u64..)
            .map(|i| keccak(H256::from_low_u64_be(i)))
            .find(|other| other[0] >> 4 != key[0] >> 4)
            .unwrap();
        assert!(matches!(
            trie::get(&partial, other),
            Err(trie::TrieError::MissingNode(_))
        ));
    }

    #[test]
    fn empty_code_is_always_known() {
        let db = MemoryDb::default();
        assert_eq!(db.code(&EMPTY_CODE_HASH), Some(&[][..]));
        assert_eq!(db.code(&H256::repeat_byte(1)), None);
        assert_eq!(db.open_trie(EMPTY_TRIE_HASH).unwrap().hash(), EMPTY_TRIE_HASH);
    }
}
