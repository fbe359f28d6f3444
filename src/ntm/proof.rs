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

//! Proof contexts, proofs and proof parts.
//!
//! A proof context is the validator set of a network type at some point of
//! its history. A proof is a vector with one (possibly missing) signature
//! slot per validator; a proof part is a single signature together with the
//! index of its signer in the validator set.

use crate::{
    base::serialize::{int64, rmp_deserialize, rmp_serialize},
    crypto::{Hash, WalletProvider},
    ntm::{Decision, Module},
    Error, ErrorKind, Result,
};
use serde_bytes::ByteBuf;
use std::{collections::HashSet, fmt::Debug};

/// Validator set of a network type.
pub trait ProofContext: Send + Sync + Debug {
    /// Network type module owning the context.
    fn module(&self) -> &'static dyn Module;

    /// Hash of the serialized context, computed with the module hash.
    fn hash(&self) -> Hash;

    /// Serialized context.
    fn bytes(&self) -> &[u8];

    /// Number of validators.
    fn validator_count(&self) -> usize;

    /// Proof part signed with the local wallet for this network type.
    /// Fails with `NotAValidator` if the wallet owner is not in the set.
    fn new_proof_part(&self, decision_hash: &Hash, provider: &dyn WalletProvider) -> Result<ProofPart>;

    /// Checks a single part and returns the index of the signer.
    /// Fails with `InvalidProofPart`.
    fn verify_part(&self, decision_hash: &Hash, part: &ProofPart) -> Result<usize>;

    fn dsa(&self) -> &'static str {
        self.module().dsa()
    }

    fn new_decision(
        &self,
        src_network_uid: &[u8],
        ntid: i64,
        height: i64,
        round: i32,
        nts_hash: &Hash,
    ) -> Result<Decision> {
        Decision::new(self.module(), src_network_uid, ntid, height, round, nts_hash)
    }

    /// Empty proof with one slot per validator.
    fn new_proof(&self) -> Proof {
        Proof::new(self.validator_count())
    }

    fn new_proof_from_bytes(&self, bytes: &[u8]) -> Result<Proof> {
        let proof = Proof::from_bytes(bytes)?;
        if proof.len() != self.validator_count() {
            return Err(Error::new_ext(
                ErrorKind::ProofDecodeError,
                format!("{} slots for {} validators", proof.len(), self.validator_count()),
            ));
        }
        Ok(proof)
    }

    fn new_proof_part_from_bytes(&self, bytes: &[u8]) -> Result<ProofPart> {
        ProofPart::from_bytes(bytes)
    }

    /// Checks that strictly more than two thirds of the validators signed
    /// `decision_hash`. Missing slots are skipped, any invalid signature fails
    /// the whole proof.
    fn verify(&self, decision_hash: &Hash, proof: &Proof) -> Result<()> {
        let count = self.validator_count();
        let mut signers = HashSet::new();
        for (index, signature) in proof.signatures.iter().enumerate() {
            let signature = match signature {
                Some(signature) => signature,
                None => continue,
            };
            let part = ProofPart {
                index,
                signature: signature.clone(),
            };
            let signer = self.verify_part(decision_hash, &part)?;
            if !signers.insert(signer) {
                return Err(Error::new_ext(
                    ErrorKind::DuplicateIndex,
                    format!("signer {} found twice", signer),
                ));
            }
        }
        if signers.len() <= 2 * count / 3 {
            debug!(
                "proof rejected: {} valid signatures out of {} validators",
                signers.len(),
                count
            );
            return Err(Error::new_ext(
                ErrorKind::InsufficientSignatures,
                format!("{}/{}", signers.len(), count),
            ));
        }
        Ok(())
    }
}

/// Single validator signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofPart {
    /// Signer index in the validator set.
    pub index: usize,
    /// Signature of the decision hash.
    pub signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ProofPartFormat(
    #[serde(with = "int64")] i64,
    #[serde(with = "serde_bytes")] Vec<u8>,
);

impl ProofPart {
    /// Serialized as `[index, signature]`.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let index = i64::try_from(self.index)
            .map_err(|err| Error::new_ext(ErrorKind::InvalidIndex, err))?;
        rmp_serialize(&ProofPartFormat(index, self.signature.clone()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ProofPart> {
        let ProofPartFormat(index, signature) = rmp_deserialize(bytes)
            .map_err(|err| Error::new_ext(ErrorKind::ProofDecodeError, err))?;
        let index = usize::try_from(index)
            .map_err(|err| Error::new_ext(ErrorKind::ProofDecodeError, err))?;
        Ok(ProofPart { index, signature })
    }
}

/// Collection of signatures, one slot per validator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Proof {
    signatures: Vec<Option<Vec<u8>>>,
}

impl Proof {
    /// Proof without signatures.
    pub fn new(slots: usize) -> Self {
        Proof {
            signatures: vec![None; slots],
        }
    }

    /// Deserialize a proof encoded as a list of nullable signatures.
    pub fn from_bytes(bytes: &[u8]) -> Result<Proof> {
        let slots: Vec<Option<ByteBuf>> = rmp_deserialize(bytes)
            .map_err(|err| Error::new_ext(ErrorKind::ProofDecodeError, err))?;
        Ok(Proof {
            signatures: slots.into_iter().map(|s| s.map(ByteBuf::into_vec)).collect(),
        })
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        let slots: Vec<Option<&serde_bytes::Bytes>> = self
            .signatures
            .iter()
            .map(|s| s.as_deref().map(serde_bytes::Bytes::new))
            .collect();
        rmp_serialize(&slots)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Number of filled slots.
    pub fn signed_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    pub fn signature_at(&self, index: usize) -> Option<&[u8]> {
        self.signatures.get(index).and_then(|s| s.as_deref())
    }

    /// Part stored in slot `index`, if any.
    pub fn part_at(&self, index: usize) -> Option<ProofPart> {
        self.signature_at(index).map(|signature| ProofPart {
            index,
            signature: signature.to_vec(),
        })
    }

    /// Store a part in its slot.
    pub fn add(&mut self, part: ProofPart) -> Result<()> {
        let slot = self.signatures.get_mut(part.index).ok_or_else(|| {
            Error::new_ext(ErrorKind::InvalidIndex, format!("slot {}", part.index))
        })?;
        if slot.is_some() {
            return Err(Error::new_ext(
                ErrorKind::DuplicateIndex,
                format!("slot {} already signed", part.index),
            ));
        }
        *slot = Some(part.signature);
        Ok(())
    }
}
