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

//! Proof context shared by the secp256k1 based network types.
//!
//! The validator set is an ordered list of 20 bytes addresses, serialized as
//! a list of byte strings. A proof part is valid when the public key
//! recovered from its signature maps to the address in its slot.

use crate::{
    base::serialize::{rmp_deserialize, rmp_serialize},
    crypto::{secp256k1::PublicKey, Hash, WalletProvider},
    ntm::{Module, ProofContext, ProofPart},
    Error, ErrorKind, Result,
};
use serde_bytes::ByteBuf;
use std::collections::HashMap;

/// Validator address length.
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug)]
pub struct Secp256k1ProofContext {
    module: &'static dyn Module,
    validators: Vec<Vec<u8>>,
    indexes: HashMap<Vec<u8>, usize>,
    bytes: Vec<u8>,
    hash: Hash,
}

impl Secp256k1ProofContext {
    /// Context from validator keys. A key of address length is taken as an
    /// address, any other key as an encoded public key.
    pub fn new(module: &'static dyn Module, keys: &[Vec<u8>]) -> Result<Self> {
        let validators = keys
            .iter()
            .map(|key| match key.len() {
                ADDRESS_LEN => Ok(key.clone()),
                _ => module.address_from_public_key(key),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_addresses(module, validators)
    }

    /// Context from its serialized form.
    /// Only the canonical encoding is accepted.
    pub fn from_bytes(module: &'static dyn Module, bytes: &[u8]) -> Result<Self> {
        let list: Vec<ByteBuf> = rmp_deserialize(bytes)?;
        let validators: Vec<Vec<u8>> = list.into_iter().map(ByteBuf::into_vec).collect();
        if let Some(address) = validators.iter().find(|a| a.len() != ADDRESS_LEN) {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("bad validator address: {}", hex::encode(address)),
            ));
        }
        let ctx = Self::from_addresses(module, validators)?;
        if ctx.bytes != bytes {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                "non canonical proof context encoding",
            ));
        }
        Ok(ctx)
    }

    fn from_addresses(module: &'static dyn Module, validators: Vec<Vec<u8>>) -> Result<Self> {
        let mut indexes = HashMap::with_capacity(validators.len());
        for (index, address) in validators.iter().enumerate() {
            if indexes.insert(address.clone(), index).is_some() {
                return Err(Error::new_ext(
                    ErrorKind::MalformedData,
                    format!("duplicated validator: {}", hex::encode(address)),
                ));
            }
        }
        let list: Vec<&serde_bytes::Bytes> = validators
            .iter()
            .map(|a| serde_bytes::Bytes::new(a))
            .collect();
        let bytes = rmp_serialize(&list)?;
        let hash = module.hash(&bytes);
        Ok(Secp256k1ProofContext {
            module,
            validators,
            indexes,
            bytes,
            hash,
        })
    }

    /// Validator addresses, in slot order.
    pub fn validators(&self) -> &[Vec<u8>] {
        &self.validators
    }

    pub fn index_of(&self, address: &[u8]) -> Option<usize> {
        self.indexes.get(address).copied()
    }
}

impl ProofContext for Secp256k1ProofContext {
    fn module(&self) -> &'static dyn Module {
        self.module
    }

    fn hash(&self) -> Hash {
        self.hash
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn validator_count(&self) -> usize {
        self.validators.len()
    }

    fn new_proof_part(&self, decision_hash: &Hash, provider: &dyn WalletProvider) -> Result<ProofPart> {
        let wallet = provider
            .wallet_for(self.module.uid())
            .or_else(|| provider.wallet_for(self.dsa()))
            .ok_or_else(|| {
                Error::new_ext(
                    ErrorKind::ResourceNotFound,
                    format!("no wallet for '{}'", self.module.uid()),
                )
            })?;
        let address = self.module.address_from_public_key(&wallet.public_key())?;
        let index = self.index_of(&address).ok_or_else(|| {
            Error::new_ext(ErrorKind::NotAValidator, hex::encode(&address))
        })?;
        let signature = wallet.sign(decision_hash.as_bytes())?;
        Ok(ProofPart { index, signature })
    }

    fn verify_part(&self, decision_hash: &Hash, part: &ProofPart) -> Result<usize> {
        let expected = self.validators.get(part.index).ok_or_else(|| {
            Error::new_ext(
                ErrorKind::InvalidProofPart,
                format!("slot {} out of {}", part.index, self.validators.len()),
            )
        })?;
        let public = PublicKey::recover(decision_hash.as_bytes(), &part.signature)
            .map_err(|err| Error::new_ext(ErrorKind::InvalidProofPart, err.to_string_full()))?;
        let address = self.module.address_from_public_key(&public.to_uncompressed())?;
        if &address != expected {
            return Err(Error::new_ext(
                ErrorKind::InvalidProofPart,
                format!("slot {} signed by {}", part.index, hex::encode(address)),
            ));
        }
        Ok(part.index)
    }
}
