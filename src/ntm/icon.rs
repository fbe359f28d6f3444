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

//! ICON network type: sha3-256 and ECDSA over secp256k1.

use crate::{
    crypto::{secp256k1::PublicKey, HashAlgorithm, HASH_LEN},
    ntm::{secp256k1::Secp256k1ProofContext, Module, ProofContext},
    Result,
};
use std::sync::Arc;

/// Module UID.
pub const UID: &str = "icon";

/// Account address length: one prefix byte followed by the 20 bytes ID.
const ACCOUNT_ADDRESS_LEN: usize = 21;

/// Prefix of externally owned account addresses.
const EOA_PREFIX: u8 = 0x00;

#[derive(Debug)]
pub struct IconModule;

/// Module instance.
pub static ICON: IconModule = IconModule;

/// Externally owned account address of the owner of `public_key`.
pub fn account_address(public_key: &[u8]) -> Result<[u8; ACCOUNT_ADDRESS_LEN]> {
    let key = PublicKey::from_bytes(public_key)?.to_uncompressed();
    let hash = HashAlgorithm::Sha3_256.digest(&key[1..]);
    let mut address = [0u8; ACCOUNT_ADDRESS_LEN];
    address[0] = EOA_PREFIX;
    address[1..].copy_from_slice(&hash.as_bytes()[HASH_LEN - (ACCOUNT_ADDRESS_LEN - 1)..]);
    Ok(address)
}

impl Module for IconModule {
    fn uid(&self) -> &'static str {
        UID
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha3_256
    }

    fn dsa(&self) -> &'static str {
        crate::crypto::secp256k1::DSA
    }

    /// ID part (prefix excluded) of the account address.
    fn address_from_public_key(&self, public_key: &[u8]) -> Result<Vec<u8>> {
        let address = account_address(public_key)?;
        Ok(address[1..].to_vec())
    }

    fn new_proof_context(&self, keys: &[Vec<u8>]) -> Result<Arc<dyn ProofContext>> {
        Ok(Arc::new(Secp256k1ProofContext::new(&ICON, keys)?))
    }

    fn new_proof_context_from_bytes(&self, bytes: &[u8]) -> Result<Arc<dyn ProofContext>> {
        Ok(Arc::new(Secp256k1ProofContext::from_bytes(&ICON, bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::secp256k1::tests::create_test_keypair, ntm::eth::ETH};

    #[test]
    fn address_is_sha3_based() {
        let public = create_test_keypair(0).public_key().to_uncompressed();

        let address = ICON.address_from_public_key(&public).unwrap();

        let hash = HashAlgorithm::Sha3_256.digest(&public[1..]);
        assert_eq!(address, hash.as_bytes()[12..].to_vec());
        assert_ne!(address, ETH.address_from_public_key(&public).unwrap());
    }

    #[test]
    fn account_address_prefix() {
        let public = create_test_keypair(0).public_key().to_uncompressed();

        let address = account_address(&public).unwrap();

        assert_eq!(address[0], EOA_PREFIX);
        assert_eq!(address[1..].to_vec(), ICON.address_from_public_key(&public).unwrap());
    }

    #[test]
    fn bad_public_key() {
        assert!(ICON.address_from_public_key(&[0x04; 10]).is_err());
    }
}
