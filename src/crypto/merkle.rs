// This file is part of TRINCI.
//
// Copyright (C) 2021 Affidaty Spa.
//
// TRINCI is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// TRINCI is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with TRINCI. If not, see <https://www.gnu.org/licenses/>.

//! Binary Merkle tree over 32 bytes hashes.
//!
//! Adjacent elements are paired left to right and each pair is hashed as the
//! concatenation of the two children. When a level has an odd number of
//! elements the last one is carried to the next level unhashed.

use crate::{
    crypto::hash::{Hash, HashAlgorithm},
    Error, ErrorKind, Result,
};

/// Side of the sibling in a proof step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dir {
    Left,
    Right,
}

/// Merkle proof step.
/// A `None` value marks a level where the running hash is carried unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    pub dir: Dir,
    pub value: Option<Hash>,
}

fn next_level(alg: HashAlgorithm, level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| match pair.len() {
            2 => alg.digest_pair(&pair[0], &pair[1]),
            _ => pair[0],
        })
        .collect()
}

/// Merkle root of `hashes`, `None` for an empty list.
pub fn merkle_root(alg: HashAlgorithm, hashes: &[Hash]) -> Option<Hash> {
    let mut level = match hashes.len() {
        0 => return None,
        1 => return Some(hashes[0]),
        _ => next_level(alg, hashes),
    };
    while level.len() > 1 {
        level = next_level(alg, &level);
    }
    level.first().copied()
}

/// Merkle proof for the element at `index`, from the leaf level upwards.
pub fn merkle_proof(alg: HashAlgorithm, hashes: &[Hash], index: usize) -> Result<Vec<MerkleNode>> {
    if index >= hashes.len() {
        return Err(Error::new_ext(
            ErrorKind::InvalidIndex,
            format!("index {} out of {}", index, hashes.len()),
        ));
    }
    let mut proof = vec![];
    let mut level = hashes.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        let node = if idx % 2 == 1 {
            MerkleNode {
                dir: Dir::Left,
                value: Some(level[idx - 1]),
            }
        } else if idx + 1 < level.len() {
            MerkleNode {
                dir: Dir::Right,
                value: Some(level[idx + 1]),
            }
        } else {
            MerkleNode {
                dir: Dir::Right,
                value: None,
            }
        };
        proof.push(node);
        level = next_level(alg, &level);
        idx /= 2;
    }
    Ok(proof)
}

/// Root obtained by walking `proof` starting from `leaf`.
pub fn merkle_root_from_proof(alg: HashAlgorithm, leaf: &Hash, proof: &[MerkleNode]) -> Hash {
    proof.iter().fold(*leaf, |acc, node| match (node.dir, node.value) {
        (_, None) => acc,
        (Dir::Left, Some(sibling)) => alg.digest_pair(&sibling, &acc),
        (Dir::Right, Some(sibling)) => alg.digest_pair(&acc, &sibling),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALG: HashAlgorithm = HashAlgorithm::Keccak256;

    fn create_test_leaves(count: usize) -> Vec<Hash> {
        (0..count).map(|i| ALG.digest(&[i as u8])).collect()
    }

    #[test]
    fn empty_and_single_root() {
        let leaves = create_test_leaves(1);

        assert_eq!(merkle_root(ALG, &[]), None);
        assert_eq!(merkle_root(ALG, &leaves), Some(leaves[0]));
        assert!(merkle_proof(ALG, &leaves, 0).unwrap().is_empty());
    }

    #[test]
    fn odd_element_is_carried() {
        let l = create_test_leaves(3);

        let root = merkle_root(ALG, &l).unwrap();

        let expected = ALG.digest_pair(&ALG.digest_pair(&l[0], &l[1]), &l[2]);
        assert_eq!(root, expected);
    }

    #[test]
    fn five_elements_root() {
        let l = create_test_leaves(5);

        let root = merkle_root(ALG, &l).unwrap();

        let h01 = ALG.digest_pair(&l[0], &l[1]);
        let h23 = ALG.digest_pair(&l[2], &l[3]);
        let expected = ALG.digest_pair(&ALG.digest_pair(&h01, &h23), &l[4]);
        assert_eq!(root, expected);
    }

    #[test]
    fn proof_of_carried_element() {
        let l = create_test_leaves(3);

        let proof = merkle_proof(ALG, &l, 2).unwrap();

        assert_eq!(
            proof,
            vec![
                MerkleNode {
                    dir: Dir::Right,
                    value: None
                },
                MerkleNode {
                    dir: Dir::Left,
                    value: Some(ALG.digest_pair(&l[0], &l[1]))
                },
            ]
        );
    }

    #[test]
    fn proofs_recover_root() {
        for alg in [HashAlgorithm::Keccak256, HashAlgorithm::Sha3_256] {
            for count in 1..=17 {
                let leaves: Vec<Hash> = (0..count).map(|i| alg.digest(&[i as u8])).collect();
                let root = merkle_root(alg, &leaves).unwrap();
                for (idx, leaf) in leaves.iter().enumerate() {
                    let proof = merkle_proof(alg, &leaves, idx).unwrap();
                    assert_eq!(merkle_root_from_proof(alg, leaf, &proof), root);
                }
            }
        }
    }

    #[test]
    fn proof_out_of_range() {
        let leaves = create_test_leaves(4);

        let err = merkle_proof(ALG, &leaves, 4).unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidIndex);
    }
}
