//! Walking a Merkle proof from a root to a key.

use std::{borrow::Cow, collections::HashMap};

use ethereum_types::H256;
use keccak_hash::keccak;
use zk_pig_common::EMPTY_TRIE_HASH;

use crate::node::{bytes_to_nibbles, ChildRef, NodeError, RawNode, ShortValue};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof is missing node {0:x}")]
    MissingNode(H256),
    #[error("invalid node at path {path:?}: {source}")]
    InvalidNode {
        path: Vec<u8>,
        #[source]
        source: NodeError,
    },
}

/// A node met on the way down, stored under the path it sits at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofNode {
    pub path: Vec<u8>,
    pub bytes: Vec<u8>,
}

/// The last node visited when the key turned out to be absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal {
    Branch,
    /// A leaf or extension node whose key diverges from the looked up key.
    Short {
        path: Vec<u8>,
        key: Vec<u8>,
        leaf: bool,
        value: Vec<u8>,
    },
}

/// Outcome of verifying a proof for a single key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedPath {
    /// Value stored under the key, `None` if the proof shows it is absent.
    pub value: Option<Vec<u8>>,
    /// Hash-referenced nodes visited, root first. Embedded nodes live inside
    /// their parent and are not listed.
    pub nodes: Vec<ProofNode>,
    /// Set when the key is absent from a non-empty trie.
    pub terminal: Option<Terminal>,
}

/// Verifies `proof` against `root` for `key` (already hashed), following hash
/// references through the supplied nodes only.
///
/// Extra nodes in `proof` are ignored. A proof that ends before the key is
/// resolved is an error, never an absence.
pub fn verify_proof<B: AsRef<[u8]>>(
    root: H256,
    key: H256,
    proof: &[B],
) -> Result<VerifiedPath, ProofError> {
    if root == EMPTY_TRIE_HASH {
        return Ok(VerifiedPath::default());
    }
    let by_hash: HashMap<H256, &[u8]> = proof
        .iter()
        .map(|node| (keccak(node.as_ref()), node.as_ref()))
        .collect();
    let key = bytes_to_nibbles(key.as_bytes());

    let mut verified = VerifiedPath::default();
    let mut path = Vec::with_capacity(key.len());
    let mut next = ChildRef::Hash(root);
    loop {
        let bytes: Cow<[u8]> = match next {
            ChildRef::Empty => return Ok(verified),
            ChildRef::Hash(hash) => {
                let bytes = *by_hash.get(&hash).ok_or(ProofError::MissingNode(hash))?;
                verified.nodes.push(ProofNode {
                    path: path.clone(),
                    bytes: bytes.to_vec(),
                });
                Cow::Borrowed(bytes)
            }
            ChildRef::Inline(bytes) => Cow::Owned(bytes),
        };
        match RawNode::decode(&bytes).map_err(|e| invalid(&path, e))? {
            RawNode::Branch { children, value } => {
                let Some(&nibble) = key.get(path.len()) else {
                    verified.value = (!value.is_empty()).then_some(value);
                    return Ok(verified);
                };
                next = children[nibble as usize].clone();
                if next == ChildRef::Empty {
                    verified.terminal = Some(Terminal::Branch);
                    return Ok(verified);
                }
                path.push(nibble);
            }
            RawNode::Short {
                key: short,
                leaf,
                value,
            } => {
                let rest = &key[path.len()..];
                let matches = match leaf {
                    true => rest == short.as_slice(),
                    false => rest.starts_with(&short),
                };
                if !matches {
                    verified.terminal = Some(Terminal::Short {
                        path,
                        key: short,
                        leaf,
                        value,
                    });
                    return Ok(verified);
                }
                match RawNode::short_value(leaf, &value).map_err(|e| invalid(&path, e))? {
                    ShortValue::Leaf(value) => {
                        verified.value = Some(value);
                        return Ok(verified);
                    }
                    ShortValue::Child(child) => {
                        path.extend(short);
                        next = child;
                    }
                }
            }
        }
    }
}

fn invalid(path: &[u8], source: NodeError) -> ProofError {
    ProofError::InvalidNode {
        path: path.to_vec(),
        source,
    }
}
