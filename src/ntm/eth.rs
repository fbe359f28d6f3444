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

//! Ethereum compatible network type: keccak-256 and ECDSA over secp256k1.

use crate::{
    crypto::{secp256k1::PublicKey, HashAlgorithm},
    ntm::{secp256k1::Secp256k1ProofContext, Module, ProofContext},
    Result,
};
use std::sync::Arc;

/// Module UID.
pub const UID: &str = "eth";

#[derive(Debug)]
pub struct EthModule;

/// Module instance.
pub static ETH: EthModule = EthModule;

impl Module for EthModule {
    fn uid(&self) -> &'static str {
        UID
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Keccak256
    }

    fn dsa(&self) -> &'static str {
        crate::crypto::secp256k1::DSA
    }

    /// Last 20 bytes of the keccak-256 of the uncompressed key, prefix excluded.
    fn address_from_public_key(&self, public_key: &[u8]) -> Result<Vec<u8>> {
        let key = PublicKey::from_bytes(public_key)?.to_uncompressed();
        let hash = HashAlgorithm::Keccak256.digest(&key[1..]);
        Ok(hash.as_bytes()[12..].to_vec())
    }

    fn new_proof_context(&self, keys: &[Vec<u8>]) -> Result<Arc<dyn ProofContext>> {
        Ok(Arc::new(Secp256k1ProofContext::new(&ETH, keys)?))
    }

    fn new_proof_context_from_bytes(&self, bytes: &[u8]) -> Result<Arc<dyn ProofContext>> {
        Ok(Arc::new(Secp256k1ProofContext::from_bytes(&ETH, bytes)?))
    }
}
