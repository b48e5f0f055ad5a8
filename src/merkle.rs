// src/merkle.rs
//! Keccak Merkle tree with sorted-pair hashing, committing to a session key's
//! permissions.
use ethers::types::H256;
use ethers::utils::keccak256;

use crate::codec::encode_permission;
use crate::permission::Permission;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `layers[0]` holds the leaves, the last layer holds the root alone.
    layers: Vec<Vec<H256>>,
    sentinel: bool,
}

impl MerkleTree {
    /// Tree over already-hashed leaves. An odd node is carried up unhashed.
    pub fn new(leaves: Vec<H256>) -> Self {
        if leaves.is_empty() {
            return Self::sentinel();
        }

        let mut layers = vec![leaves];
        while let Some(layer) = layers.last().filter(|layer| layer.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            layers.push(next);
        }

        Self {
            layers,
            sentinel: false,
        }
    }

    /// Single zero leaf: the session key may make any call and no proof is
    /// attached.
    pub fn sentinel() -> Self {
        Self {
            layers: vec![vec![H256::zero()]],
            sentinel: true,
        }
    }

    /// Commits to `permissions`. An empty set gives the sentinel tree; a single
    /// permission is duplicated so the tree has two leaves.
    pub fn from_permissions(permissions: &[Permission]) -> Self {
        let mut leaves: Vec<H256> = permissions.iter().map(permission_leaf).collect();
        match leaves.len() {
            0 => Self::sentinel(),
            1 => {
                leaves.push(leaves[0]);
                Self::new(leaves)
            }
            _ => Self::new(leaves),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    pub fn root(&self) -> H256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaves(&self) -> &[H256] {
        &self.layers[0]
    }

    /// Sibling path from `leaf` to the root, or `None` if `leaf` is not in the
    /// tree. Uses the first occurrence of a duplicated leaf.
    pub fn proof(&self, leaf: &H256) -> Option<Vec<H256>> {
        let mut index = self.leaves().iter().position(|candidate| candidate == leaf)?;
        let mut proof = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            if let Some(sibling) = layer.get(index ^ 1) {
                proof.push(*sibling);
            }
            index /= 2;
        }
        Some(proof)
    }
}

/// Leaf of a permission: keccak of its canonical encoding.
pub fn permission_leaf(permission: &Permission) -> H256 {
    keccak256(encode_permission(permission)).into()
}

pub fn verify(proof: &[H256], leaf: H256, root: H256) -> bool {
    proof
        .iter()
        .fold(leaf, |node, sibling| hash_pair(&node, sibling))
        == root
}

fn hash_pair(a: &H256, b: &H256) -> H256 {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(first.as_bytes());
    buf[32..].copy_from_slice(second.as_bytes());
    keccak256(buf).into()
}
