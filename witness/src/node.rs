//! Raw Merkle Patricia trie node codec.
//!
//! Paths are handled as one nibble per byte (`Vec<u8>` of values `0..16`)
//! throughout this crate, which keeps prefix arithmetic on proof paths
//! trivial. [`Nibbles`] from `mpt_trie` is only used at the boundary with
//! [`HashedPartialTrie`].

use ethereum_types::H256;
use keccak_hash::keccak;
use mpt_trie::{
    nibbles::Nibbles,
    partial_trie::{HashedPartialTrie, Node},
};
use rlp::{Rlp, RlpStream};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("invalid node rlp: {0}")]
    Rlp(#[from] rlp::DecoderError),
    #[error("trie node has {0} items")]
    ItemCount(usize),
    #[error("invalid hex-prefix encoded path")]
    HexPrefix,
    #[error("invalid child reference")]
    ChildRef,
    #[error("cannot encode a node that is only known by its hash {0:x}")]
    Unresolved(H256),
}

/// How a branch or extension refers to a child.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChildRef {
    #[default]
    Empty,
    /// Child whose encoding is at least 32 bytes long.
    Hash(H256),
    /// Child whose encoding is embedded in the parent.
    Inline(Vec<u8>),
}

impl ChildRef {
    fn decode(item: &Rlp) -> Result<Self, NodeError> {
        if item.is_list() {
            return Ok(Self::Inline(item.as_raw().to_vec()));
        }
        let data = item.data()?;
        match data.len() {
            0 => Ok(Self::Empty),
            32 => Ok(Self::Hash(H256::from_slice(data))),
            _ => Err(NodeError::ChildRef),
        }
    }
}

/// A decoded node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawNode {
    Branch {
        children: Box<[ChildRef; 16]>,
        value: Vec<u8>,
    },
    /// Leaf or extension node.
    Short {
        key: Vec<u8>,
        leaf: bool,
        /// The second list item exactly as encoded: a string for leaves, a
        /// hash or an embedded node for extensions.
        value: Vec<u8>,
    },
}

impl RawNode {
    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let rlp = Rlp::new(bytes);
        match rlp.item_count()? {
            17 => {
                let mut children: [ChildRef; 16] = Default::default();
                for (i, child) in children.iter_mut().enumerate() {
                    *child = ChildRef::decode(&rlp.at(i)?)?;
                }
                Ok(Self::Branch {
                    children: Box::new(children),
                    value: rlp.at(16)?.data()?.to_vec(),
                })
            }
            2 => {
                let (key, leaf) = decode_hex_prefix(rlp.at(0)?.data()?)?;
                Ok(Self::Short {
                    key,
                    leaf,
                    value: rlp.at(1)?.as_raw().to_vec(),
                })
            }
            n => Err(NodeError::ItemCount(n)),
        }
    }

    /// The leaf payload, or the child an extension points to.
    pub fn short_value(leaf: bool, value: &[u8]) -> Result<ShortValue, NodeError> {
        let item = Rlp::new(value);
        match leaf {
            true => Ok(ShortValue::Leaf(item.data()?.to_vec())),
            false => match ChildRef::decode(&item)? {
                ChildRef::Empty => Err(NodeError::ChildRef),
                child => Ok(ShortValue::Child(child)),
            },
        }
    }
}

/// What the value item of a short node holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShortValue {
    Leaf(Vec<u8>),
    Child(ChildRef),
}

/// Encodes a leaf or extension node from its parts.
pub fn encode_short(key: &[u8], leaf: bool, value: &[u8]) -> Vec<u8> {
    let mut s = RlpStream::new_list(2);
    s.append(&encode_hex_prefix(key, leaf));
    s.append_raw(value, 1);
    s.out().to_vec()
}

pub fn encode_hex_prefix(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let odd = nibbles.len() % 2 == 1;
    let flag = (u8::from(leaf) << 1 | u8::from(odd)) << 4;
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = match odd {
        true => {
            out.push(flag | nibbles[0]);
            &nibbles[1..]
        }
        false => {
            out.push(flag);
            nibbles
        }
    };
    out.extend(rest.chunks(2).map(|pair| pair[0] << 4 | pair[1]));
    out
}

pub fn decode_hex_prefix(bytes: &[u8]) -> Result<(Vec<u8>, bool), NodeError> {
    let (first, rest) = bytes.split_first().ok_or(NodeError::HexPrefix)?;
    let flag = first >> 4;
    if flag > 3 || (flag & 1 == 0 && first & 0x0f != 0) {
        return Err(NodeError::HexPrefix);
    }
    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if flag & 1 == 1 {
        nibbles.push(first & 0x0f);
    }
    for byte in rest {
        nibbles.extend([byte >> 4, byte & 0x0f]);
    }
    Ok((nibbles, flag & 2 == 2))
}

pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

pub fn to_nibbles(path: &[u8]) -> Nibbles {
    let mut nibbles = Nibbles::default();
    for nibble in path {
        nibbles.push_nibble_back(*nibble);
    }
    nibbles
}

pub fn from_nibbles(nibbles: &Nibbles) -> Vec<u8> {
    (0..nibbles.count).map(|i| nibbles.get_nibble(i)).collect()
}

/// Canonical encoding of a resolved node of a [`HashedPartialTrie`].
pub fn encode_trie_node(node: &HashedPartialTrie) -> Result<Vec<u8>, NodeError> {
    match &**node {
        Node::Empty => Ok(rlp::NULL_RLP.to_vec()),
        Node::Hash(hash) => Err(NodeError::Unresolved(*hash)),
        Node::Branch { children, value } => {
            let mut s = RlpStream::new_list(17);
            for child in children.iter() {
                append_child(&mut s, child)?;
            }
            s.append(value);
            Ok(s.out().to_vec())
        }
        Node::Extension { nibbles, child } => {
            let mut s = RlpStream::new_list(2);
            s.append(&encode_hex_prefix(&from_nibbles(nibbles), false));
            append_child(&mut s, child)?;
            Ok(s.out().to_vec())
        }
        Node::Leaf { nibbles, value } => {
            let mut s = RlpStream::new_list(2);
            s.append(&encode_hex_prefix(&from_nibbles(nibbles), true));
            s.append(value);
            Ok(s.out().to_vec())
        }
    }
}

fn append_child(s: &mut RlpStream, child: &HashedPartialTrie) -> Result<(), NodeError> {
    match &**child {
        Node::Empty => {
            s.append_empty_data();
        }
        Node::Hash(hash) => {
            s.append(hash);
        }
        _ => {
            let encoded = encode_trie_node(child)?;
            match encoded.len() < 32 {
                true => s.append_raw(&encoded, 1),
                false => s.append(&keccak(&encoded)),
            };
        }
    }
    Ok(())
}

/// The hash a node is referenced by, if it is long enough to be referenced by
/// hash at all.
pub fn node_ref_hash(encoded: &[u8]) -> Option<H256> {
    (encoded.len() >= 32).then(|| keccak(encoded))
}
