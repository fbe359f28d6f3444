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

//! Network type modules.
//!
//! A network type module bundles the cryptographic regime shared by all the
//! networks of a type: hash function, Merkle commitments, signature
//! algorithm, address derivation and validator set (proof context)
//! construction. Modules are looked up by their short UID in a process wide
//! registry populated at start with the built-in `eth` and `icon` modules.

use crate::{
    base::RwLock,
    crypto::{merkle, Hash, HashAlgorithm, MerkleNode},
    db::BucketId,
    Error, ErrorKind, Result,
};
use std::{collections::HashMap, fmt::Debug, sync::Arc};

pub mod decision;
pub mod eth;
pub mod icon;
pub mod proof;
pub mod secp256k1;

pub use decision::Decision;
pub use proof::{Proof, ProofContext, ProofPart};

/// Network type module.
pub trait Module: Send + Sync + Debug {
    /// Short textual identifier, e.g. `"eth"`.
    fn uid(&self) -> &'static str;

    /// Hash function of the type.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Signature algorithm identifier, e.g. `"ecdsa/secp256k1"`.
    fn dsa(&self) -> &'static str;

    /// Canonical address of the owner of `public_key`.
    fn address_from_public_key(&self, public_key: &[u8]) -> Result<Vec<u8>>;

    /// Proof context from a list of validator public keys or addresses.
    fn new_proof_context(&self, keys: &[Vec<u8>]) -> Result<Arc<dyn ProofContext>>;

    /// Proof context from its serialized form.
    fn new_proof_context_from_bytes(&self, bytes: &[u8]) -> Result<Arc<dyn ProofContext>>;

    fn hash(&self, data: &[u8]) -> Hash {
        self.hash_algorithm().digest(data)
    }

    fn merkle_root(&self, hashes: &[Hash]) -> Option<Hash> {
        merkle::merkle_root(self.hash_algorithm(), hashes)
    }

    fn merkle_proof(&self, hashes: &[Hash], index: usize) -> Result<Vec<MerkleNode>> {
        merkle::merkle_proof(self.hash_algorithm(), hashes, index)
    }

    /// Bucket holding the message bodies keyed by message hash.
    fn bytes_by_hash_bucket(&self) -> BucketId {
        BucketId::TypedBytesByHash(self.uid())
    }

    /// Bucket holding the message hash lists keyed by Merkle root.
    fn list_by_merkle_root_bucket(&self) -> BucketId {
        BucketId::ListByMerkleRoot(self.uid())
    }
}

lazy_static::lazy_static! {
    static ref REGISTRY: RwLock<HashMap<&'static str, &'static dyn Module>> = {
        let mut map: HashMap<&'static str, &'static dyn Module> = HashMap::new();
        map.insert(eth::UID, &eth::ETH);
        map.insert(icon::UID, &icon::ICON);
        RwLock::new(map)
    };
}

/// Module registered under `uid`.
pub fn for_uid(uid: &str) -> Result<&'static dyn Module> {
    REGISTRY
        .read()
        .get(uid)
        .copied()
        .ok_or_else(|| Error::new_ext(ErrorKind::ModuleNotFound, uid.to_string()))
}

/// Register an additional module.
/// A module already registered under the same UID is replaced.
pub fn register(module: &'static dyn Module) {
    debug!("registering network type module '{}'", module.uid());
    REGISTRY.write().insert(module.uid(), module);
}

/// UIDs of all the registered modules, sorted.
pub fn uids() -> Vec<&'static str> {
    let mut uids: Vec<_> = REGISTRY.read().keys().copied().collect();
    uids.sort_unstable();
    uids
}
